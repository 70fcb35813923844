//! Column values
//!
//! A [`Datum`] is the value of one column of one row. Command-line text is
//! parsed against the column's schema; references are resolved by the
//! caller because only it knows about symbols and record names.

use crate::schema::{AtomType, ColumnKind, ColumnSchema};
use cfgctl_core::errors::{CtlError, ExError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Atom {
    Integer(i64),
    Boolean(bool),
    String(String),
    Uuid(Uuid),
}

impl Atom {
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Atom::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Atom::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Atom::String(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a non-reference atom
    ///
    /// # Errors
    ///
    /// Text that does not fit the type, or a reference type.
    pub fn parse_plain(atom: &AtomType, column: &str, text: &str) -> Result<Atom> {
        let invalid = |reason: String| -> ExError {
            CtlError::InvalidValue {
                column: column.to_string(),
                reason,
            }
            .into()
        };
        match atom {
            AtomType::Integer => text
                .trim()
                .parse::<i64>()
                .map(Atom::Integer)
                .map_err(|_| invalid(format!("\"{}\" is not a valid integer", text))),
            AtomType::Boolean => match text.trim() {
                "true" => Ok(Atom::Boolean(true)),
                "false" => Ok(Atom::Boolean(false)),
                other => Err(invalid(format!("\"{}\" is not a valid boolean", other))),
            },
            AtomType::String => Ok(Atom::String(unquote(text.trim()))),
            AtomType::Uuid { .. } => Err(invalid(
                "references must be resolved by the caller".to_string(),
            )),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Integer(i) => write!(f, "{}", i),
            Atom::Boolean(b) => write!(f, "{}", b),
            Atom::String(s) => write!(f, "{}", quote_if_needed(s)),
            Atom::Uuid(u) => write!(f, "{}", u),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datum {
    Scalar(Atom),
    Set(BTreeSet<Atom>),
    Map(BTreeMap<String, String>),
}

impl Datum {
    /// Value of a freshly inserted column
    pub fn default_for(column: &ColumnSchema) -> Datum {
        match column.kind {
            ColumnKind::Set => Datum::Set(BTreeSet::new()),
            ColumnKind::Map => Datum::Map(BTreeMap::new()),
            ColumnKind::Scalar => Datum::Scalar(match column.atom {
                AtomType::Integer => Atom::Integer(0),
                AtomType::Boolean => Atom::Boolean(false),
                AtomType::String | AtomType::Uuid { .. } => Atom::String(String::new()),
            }),
        }
    }

    /// Every atom in the datum, map entries excluded
    pub fn atoms(&self) -> Box<dyn Iterator<Item = &Atom> + '_> {
        match self {
            Datum::Scalar(a) => Box::new(std::iter::once(a)),
            Datum::Set(s) => Box::new(s.iter()),
            Datum::Map(_) => Box::new(std::iter::empty()),
        }
    }

    pub fn uuids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.atoms().filter_map(Atom::as_uuid)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Datum::Scalar(a) => a.as_integer(),
            Datum::Set(s) if s.len() == 1 => s.iter().next().and_then(Atom::as_integer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Scalar(a) => a.as_str(),
            _ => None,
        }
    }

    /// Parse command-line text for `column`
    ///
    /// Sets take `[a,b]` or a bare comma list, maps take `{k=v,...}` or
    /// `k=v,...`. `resolve` turns reference text into a uuid atom.
    ///
    /// # Errors
    ///
    /// Malformed text, or whatever `resolve` reports.
    pub fn parse<F>(column: &ColumnSchema, text: &str, resolve: &mut F) -> Result<Datum>
    where
        F: FnMut(&str) -> Result<Atom>,
    {
        let mut atom = |piece: &str| -> Result<Atom> {
            match column.atom {
                AtomType::Uuid { .. } => resolve(piece.trim()),
                _ => Atom::parse_plain(&column.atom, &column.name, piece),
            }
        };
        match column.kind {
            ColumnKind::Scalar => Ok(Datum::Scalar(atom(text)?)),
            ColumnKind::Set => {
                let body = strip_brackets(text.trim(), '[', ']');
                let mut set = BTreeSet::new();
                for piece in split_top_level(body) {
                    set.insert(atom(&piece)?);
                }
                Ok(Datum::Set(set))
            }
            ColumnKind::Map => {
                let body = strip_brackets(text.trim(), '{', '}');
                let mut map = BTreeMap::new();
                for piece in split_top_level(body) {
                    let (key, value) = parse_map_entry(&column.name, &piece)?;
                    map.insert(key, value);
                }
                Ok(Datum::Map(map))
            }
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Scalar(a) => write!(f, "{}", a),
            Datum::Set(s) => {
                let items: Vec<String> = s.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Datum::Map(m) => {
                let items: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{}={}", quote_if_needed(k), quote_if_needed(v)))
                    .collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

/// Split `k=v` into key and value
///
/// # Errors
///
/// Entries without `=` are rejected.
pub fn parse_map_entry(column: &str, piece: &str) -> Result<(String, String)> {
    let mut parts = split_unquoted(piece, '=');
    match (parts.next(), parts.next()) {
        (Some(k), Some(v)) => Ok((unquote(k.trim()), unquote(v.trim()))),
        _ => Err(CtlError::InvalidValue {
            column: column.to_string(),
            reason: format!("\"{}\" is not a key=value pair", piece.trim()),
        }
        .into()),
    }
}

fn strip_brackets(text: &str, open: char, close: char) -> &str {
    text.strip_prefix(open)
        .and_then(|t| t.strip_suffix(close))
        .unwrap_or(text)
}

/// Split on commas outside double quotes, dropping empty pieces
fn split_top_level(text: &str) -> Vec<String> {
    split_unquoted(text, ',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split at most once per separator occurrence outside double quotes
fn split_unquoted(text: &str, sep: char) -> impl Iterator<Item = &str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                pieces.push(&text[start..i]);
                start = i + c.len_utf8();
                if sep == '=' {
                    break;
                }
            }
            _ => {}
        }
    }
    pieces.push(&text[start..]);
    pieces.into_iter()
}

fn unquote(text: &str) -> String {
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => text.to_string(),
    }
}

fn quote_if_needed(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '/'))
        && s.parse::<i64>().is_err()
        && s != "true"
        && s != "false";
    if plain {
        s.to_string()
    } else {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
