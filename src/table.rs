//! Plain-text table rendering for preview output.

use std::borrow::Cow;
use std::fmt::Write as _;

// Sample cells can hold arbitrary export data; keep the table readable.
const MAX_CELL_WIDTH: usize = 40;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers
        .iter()
        .map(|h| cell_text(h).chars().count().max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(cell_text(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", separator.join("  "));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        if idx >= widths.len() {
            break;
        }
        let mut cell = cell_text(value).into_owned();
        let padding = widths[idx].saturating_sub(cell.chars().count());
        if padding > 0 {
            cell.push_str(&" ".repeat(padding));
        }
        cells.push(cell);
    }
    let mut line = cells.join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn cell_text(value: &str) -> Cow<'_, str> {
    let needs_sanitize = value.contains(['\n', '\r', '\t']);
    let too_wide = value.chars().count() > MAX_CELL_WIDTH;
    if !needs_sanitize && !too_wide {
        return Cow::Borrowed(value);
    }
    let mut cleaned = String::with_capacity(value.len().min(MAX_CELL_WIDTH + 1));
    for ch in value.chars().take(MAX_CELL_WIDTH) {
        match ch {
            '\n' | '\r' | '\t' => cleaned.push(' '),
            other => cleaned.push(other),
        }
    }
    if too_wide {
        cleaned.push('…');
    }
    Cow::Owned(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_aligned_rows_with_separator() {
        let headers = vec!["Name".to_string(), "Email".to_string()];
        let rows = vec![vec!["Jane Doe".to_string(), "jane@x.com".to_string()]];
        let rendered = render_table(&headers, &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Name"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].contains("jane@x.com"));
    }

    #[test]
    fn long_cells_are_truncated_with_ellipsis() {
        let wide = "x".repeat(MAX_CELL_WIDTH + 10);
        let rendered = render_table(&["Col".to_string()], &[vec![wide]]);
        assert!(rendered.contains('…'));
    }
}
