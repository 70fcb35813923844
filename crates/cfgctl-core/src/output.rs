//! Per-command output rendering

use crate::table::{Table, TableStyle};

/// Collapse a command's output onto one line
///
/// One trailing newline is dropped, then `\` becomes `\\` and each newline
/// becomes the two characters `\n`.
pub fn escape_oneline(output: &str) -> String {
    let body = output.strip_suffix('\n').unwrap_or(output);
    let mut line = String::with_capacity(body.len() + 1);
    for c in body.chars() {
        match c {
            '\\' => line.push_str("\\\\"),
            '\n' => line.push_str("\\n"),
            c => line.push(c),
        }
    }
    line.push('\n');
    line
}

/// Render one command's result: a table wins, then oneline, then raw text
pub fn render_command(
    output: &str,
    table: Option<&Table>,
    style: TableStyle,
    oneline: bool,
) -> String {
    match table {
        Some(table) => table.format(style),
        None if oneline => escape_oneline(output),
        None => output.to_string(),
    }
}
