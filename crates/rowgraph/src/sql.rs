//! Placeholder parsing for `:name` and `?` parameters.
//!
//! Statements are parsed once when a [`Query`](crate::Query) is created. Named and
//! positional placeholders may be mixed; the parsed form is rendered in the driver's
//! [`PlaceholderStyle`] at execution time.
//!
//! Text inside string literals, quoted identifiers, dollar-quoted bodies, comments and
//! `::` casts is never treated as a placeholder. A `?` outside those is always a
//! placeholder, so Postgres JSON operators (`?`, `?|`, `?&`) must be written with their
//! function forms (`jsonb_exists`, ...).

use crate::client::PlaceholderStyle;
use crate::error::{OrmError, OrmResult};
use std::collections::HashSet;
use std::fmt::Write;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A placeholder occurrence, in statement order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `:name`
    Named(String),
    /// The n-th `?` (1-based, counting only `?` placeholders).
    Positional(usize),
}

impl Placeholder {
    /// Display form used in error messages (`name` or `?n`).
    pub fn display_name(&self) -> String {
        match self {
            Placeholder::Named(name) => name.clone(),
            Placeholder::Positional(n) => format!("?{n}"),
        }
    }
}

/// A statement split into raw SQL and placeholder slots.
#[derive(Debug, Clone)]
pub struct ParsedSql {
    source: String,
    parts: Vec<SqlPart>,
    placeholders: Vec<Placeholder>,
    positional_count: usize,
}

fn is_ident_start(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphabetic()
}

fn is_ident_char(b: u8) -> bool {
    b == b'_' || b.is_ascii_alphanumeric()
}

/// Position just past the quoted run starting at `pos`. A doubled quote is an escape.
fn skip_quoted(sql: &str, pos: usize, quote: u8) -> OrmResult<usize> {
    let bytes = sql.as_bytes();
    let mut i = pos + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    let what = if quote == b'\'' {
        "string literal"
    } else {
        "quoted identifier"
    };
    Err(OrmError::SqlParse(format!(
        "unterminated {what} starting at byte {pos}"
    )))
}

/// Position just past a `$tag$ ... $tag$` body starting at `pos`, or `pos + 1` when the
/// `$` does not open one (e.g. a native `$1`).
fn skip_dollar_quoted(sql: &str, pos: usize) -> OrmResult<usize> {
    let rest = &sql.as_bytes()[pos + 1..];
    if rest.first().is_some_and(|b| b.is_ascii_digit()) {
        return Ok(pos + 1);
    }
    let tag_len = rest.iter().take_while(|b| is_ident_char(**b)).count();
    if rest.get(tag_len) != Some(&b'$') {
        return Ok(pos + 1);
    }
    let delimiter = &sql[pos..pos + tag_len + 2];
    let body = pos + delimiter.len();
    match sql[body..].find(delimiter) {
        Some(n) => Ok(body + n + delimiter.len()),
        None => Err(OrmError::SqlParse(format!(
            "unterminated dollar-quoted string starting at byte {pos}"
        ))),
    }
}

impl ParsedSql {
    /// Parse `sql`, rejecting duplicated named placeholders.
    pub fn parse(sql: &str) -> OrmResult<Self> {
        let bytes = sql.as_bytes();
        let mut parts = Vec::new();
        let mut placeholders = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut positional_count = 0;
        let mut raw_start = 0;
        let mut pos = 0;

        let flush = |parts: &mut Vec<SqlPart>, from: usize, to: usize| {
            if to > from {
                parts.push(SqlPart::Raw(sql[from..to].to_string()));
            }
        };

        while pos < bytes.len() {
            match bytes[pos] {
                quote @ (b'\'' | b'"') => pos = skip_quoted(sql, pos, quote)?,
                b'-' if bytes.get(pos + 1) == Some(&b'-') => {
                    pos = sql[pos..].find('\n').map_or(bytes.len(), |n| pos + n + 1);
                }
                b'/' if bytes.get(pos + 1) == Some(&b'*') => {
                    let end = sql[pos + 2..].find("*/").ok_or_else(|| {
                        OrmError::SqlParse(format!(
                            "unterminated block comment starting at byte {pos}"
                        ))
                    })?;
                    pos += 2 + end + 2;
                }
                b'$' => pos = skip_dollar_quoted(sql, pos)?,
                b':' if bytes.get(pos + 1) == Some(&b':') => pos += 2,
                b':' if bytes.get(pos + 1).is_some_and(|b| is_ident_start(*b)) => {
                    let start = pos + 1;
                    let end = start
                        + bytes[start..]
                            .iter()
                            .take_while(|b| is_ident_char(**b))
                            .count();
                    let name = &sql[start..end];
                    if !seen.insert(name) {
                        return Err(OrmError::DuplicateParameter(name.to_string()));
                    }
                    flush(&mut parts, raw_start, pos);
                    parts.push(SqlPart::Param);
                    placeholders.push(Placeholder::Named(name.to_string()));
                    pos = end;
                    raw_start = end;
                }
                b'?' => {
                    positional_count += 1;
                    flush(&mut parts, raw_start, pos);
                    parts.push(SqlPart::Param);
                    placeholders.push(Placeholder::Positional(positional_count));
                    pos += 1;
                    raw_start = pos;
                }
                _ => pos += 1,
            }
        }
        flush(&mut parts, raw_start, bytes.len());

        Ok(Self {
            source: sql.to_string(),
            parts,
            placeholders,
            positional_count,
        })
    }

    /// A statement with no text and no placeholders.
    pub fn empty() -> Self {
        Self {
            source: String::new(),
            parts: Vec::new(),
            placeholders: Vec::new(),
            positional_count: 0,
        }
    }

    /// The statement as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All placeholders in statement order.
    pub fn placeholders(&self) -> &[Placeholder] {
        &self.placeholders
    }

    /// Names of the named placeholders, in statement order.
    pub fn named(&self) -> impl Iterator<Item = &str> {
        self.placeholders.iter().filter_map(|p| match p {
            Placeholder::Named(name) => Some(name.as_str()),
            Placeholder::Positional(_) => None,
        })
    }

    /// `(slot, name)` of each named placeholder.
    pub fn named_slots(&self) -> impl Iterator<Item = (usize, &str)> {
        self.placeholders
            .iter()
            .enumerate()
            .filter_map(|(slot, p)| match p {
                Placeholder::Named(name) => Some((slot, name.as_str())),
                Placeholder::Positional(_) => None,
            })
    }

    pub fn positional_count(&self) -> usize {
        self.positional_count
    }

    /// Slot index of the named placeholder `name`.
    pub fn slot_of_name(&self, name: &str) -> Option<usize> {
        self.placeholders
            .iter()
            .position(|p| matches!(p, Placeholder::Named(n) if n == name))
    }

    /// Slot index of the `index`-th `?` (1-based).
    pub fn slot_of_position(&self, index: usize) -> Option<usize> {
        self.placeholders
            .iter()
            .position(|p| matches!(p, Placeholder::Positional(n) if *n == index))
    }

    /// Render with the driver's placeholder syntax.
    pub fn render(&self, style: PlaceholderStyle) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut idx: usize = 0;

        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    match style {
                        PlaceholderStyle::Dollar => {
                            let _ = write!(&mut out, "${}", idx);
                        }
                        PlaceholderStyle::Question => out.push('?'),
                    }
                }
            }
        }
        out
    }
}
