//! SQL template handling: static placeholders, bind markers and parameter filling.

use std::collections::BTreeMap;

use crate::error::{ReaderError, Result};
use crate::values::SqlValue;

/// Outcome of resolving `${name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(String),
    /// First placeholder without a value.
    Missing(String),
}

/// Replace every `${name}` in `sql` with its static parameter value.
pub fn resolve_placeholders(sql: &str, parameters: &BTreeMap<String, String>) -> Result<Resolution> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            ReaderError::Configuration(format!("unterminated placeholder in: {}", sql))
        })?;
        let name = &after[..end];
        match parameters.get(name) {
            Some(value) => out.push_str(value),
            None => return Ok(Resolution::Missing(name.to_string())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(Resolution::Resolved(out))
}

/// Byte offsets of `?` bind markers outside quoted literals and identifiers.
fn bind_positions(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if c == q => quote = None,
            (None, '?') => positions.push(i),
            _ => {}
        }
    }
    positions
}

pub fn count_bind_parameters(sql: &str) -> usize {
    bind_positions(sql).len()
}

/// Rewrite `?` markers to PostgreSQL's numbered `$n` form.
pub fn to_postgres(sql: &str) -> String {
    let positions = bind_positions(sql);
    let mut out = String::with_capacity(sql.len() + positions.len() * 2);
    let mut last = 0;
    for (n, pos) in positions.iter().enumerate() {
        out.push_str(&sql[last..*pos]);
        out.push('$');
        out.push_str(&(n + 1).to_string());
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    out
}

/// Match supplied parameters to `placeholders` bind markers.
///
/// A single parameter is repeated for every marker; otherwise the counts
/// must agree.
pub fn fill_parameters(placeholders: usize, parameters: &[SqlValue]) -> Result<Vec<SqlValue>> {
    if parameters.len() == placeholders {
        return Ok(parameters.to_vec());
    }
    if let [single] = parameters {
        return Ok(vec![single.clone(); placeholders]);
    }
    Err(ReaderError::IllegalArgument(format!(
        "statement expects {} parameter(s), {} supplied",
        placeholders,
        parameters.len()
    )))
}
