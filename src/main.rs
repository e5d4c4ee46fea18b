fn main() {
    if let Err(err) = visitor_intake::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
