use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Aligned report table for the human-readable verbs. Columns are
/// left-aligned two spaces apart; the last column is never padded, so
/// long drift hashes and error strings do not drag trailing whitespace.
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print!("{}", render_table(headers, &rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();

    let mut out = String::new();
    out.push_str(&render_row(&widths, headers));
    out.push('\n');
    let rule_cells: Vec<&str> = rule.iter().map(String::as_str).collect();
    out.push_str(&render_row(&widths, &rule_cells));
    out.push('\n');
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&render_row(&widths, &cells));
        out.push('\n');
    }
    out
}

fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (cell, width) in row.iter().zip(widths.iter_mut()) {
            *width = (*width).max(cell.len());
        }
    }
    widths
}

fn render_row(widths: &[usize], cells: &[&str]) -> String {
    let mut parts = Vec::with_capacity(cells.len());
    for (i, cell) in cells.iter().enumerate() {
        if i + 1 == cells.len() {
            parts.push((*cell).to_string());
        } else {
            let width = widths.get(i).copied().unwrap_or(cell.len());
            parts.push(format!("{cell:<width$}"));
        }
    }
    parts.join("  ")
}
