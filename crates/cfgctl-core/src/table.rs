//! Result tables and their output formats

use crate::errors::{CtlError, ExError};
use serde_json::json;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Table,
    List,
    Csv,
    Json,
}

impl FromStr for TableFormat {
    type Err = ExError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(TableFormat::Table),
            "list" => Ok(TableFormat::List),
            "csv" => Ok(TableFormat::Csv),
            "json" => Ok(TableFormat::Json),
            other => Err(CtlError::InvalidFormat {
                value: other.to_string(),
            }
            .into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStyle {
    pub format: TableFormat,
    pub headings: bool,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            format: TableFormat::Table,
            headings: true,
        }
    }
}

/// Tabular result of a command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Table {
    headings: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<I, S>(headings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headings: headings.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; missing cells are padded with empty strings
    pub fn add_row(&mut self, mut cells: Vec<String>) {
        cells.resize(self.headings.len().max(cells.len()), String::new());
        self.rows.push(cells);
    }

    pub fn headings(&self) -> &[String] {
        &self.headings
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn format(&self, style: TableStyle) -> String {
        match style.format {
            TableFormat::Table => self.format_table(style.headings),
            TableFormat::List => self.format_list(style.headings),
            TableFormat::Csv => self.format_csv(style.headings),
            TableFormat::Json => self.format_json(style.headings),
        }
    }

    fn widths(&self, headings: bool) -> Vec<usize> {
        let mut widths = vec![0; self.headings.len()];
        if headings {
            for (w, h) in widths.iter_mut().zip(&self.headings) {
                *w = h.chars().count();
            }
        }
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        widths
    }

    fn format_table(&self, headings: bool) -> String {
        let widths = self.widths(headings);
        let mut out = String::new();
        let line = |cells: &[String], out: &mut String| {
            let last = cells.len().saturating_sub(1);
            for (i, cell) in cells.iter().enumerate() {
                if i == last {
                    out.push_str(cell);
                } else {
                    let width = widths.get(i).copied().unwrap_or(0);
                    out.push_str(&format!("{:<width$} ", cell, width = width));
                }
            }
            out.push('\n');
        };
        if headings {
            line(&self.headings, &mut out);
            let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
            line(&rule, &mut out);
        }
        for row in &self.rows {
            line(row, &mut out);
        }
        out
    }

    fn format_list(&self, headings: bool) -> String {
        let width = self
            .headings
            .iter()
            .map(|h| h.chars().count())
            .max()
            .unwrap_or(0);
        let mut out = String::new();
        for (n, row) in self.rows.iter().enumerate() {
            if n > 0 {
                out.push('\n');
            }
            for (heading, cell) in self.headings.iter().zip(row) {
                if headings {
                    out.push_str(&format!("{:<width$}: ", heading, width = width));
                }
                out.push_str(cell);
                out.push('\n');
            }
        }
        out
    }

    fn format_csv(&self, headings: bool) -> String {
        fn field(cell: &str) -> String {
            if cell.contains([',', '"', '\n']) {
                format!("\"{}\"", cell.replace('"', "\"\""))
            } else {
                cell.to_string()
            }
        }
        let mut out = String::new();
        let rows = headings
            .then_some(&self.headings)
            .into_iter()
            .chain(self.rows.iter());
        for row in rows {
            let cells: Vec<String> = row.iter().map(|c| field(c)).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    fn format_json(&self, headings: bool) -> String {
        let value = if headings {
            json!({ "headings": self.headings, "data": self.rows })
        } else {
            json!({ "data": self.rows })
        };
        format!("{}\n", value)
    }
}
