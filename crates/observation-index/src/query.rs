//! Structured boolean query over index fields.
//!
//! Filters are assembled as a [`Query`] tree and rendered to Lucene classic
//! syntax only when handed to the searcher. Composite nodes always render
//! parenthesised, so operator precedence never depends on the caller.

use std::fmt::Write as _;
use std::ops::Bound;

use crate::document::{fields, METAFILE_DOC};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every document (`metafile:doc`).
    MatchAll,
    /// No document.
    MatchNone,
    Term {
        field: String,
        value: String,
    },
    /// Term pattern with `*` (any run) and `?` (any single character);
    /// `\` makes the next character literal.
    Wildcard {
        field: String,
        pattern: String,
    },
    Range {
        field: String,
        lower: Bound<String>,
        upper: Bound<String>,
    },
    And(Vec<Query>),
    Or(Vec<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: &str, value: impl Into<String>) -> Self {
        Query::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn wildcard(field: &str, pattern: impl Into<String>) -> Self {
        Query::Wildcard {
            field: field.to_string(),
            pattern: pattern.into(),
        }
    }

    /// Inclusive range on both ends.
    pub fn range(field: &str, lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Query::Range {
            field: field.to_string(),
            lower: Bound::Included(lower.into()),
            upper: Bound::Included(upper.into()),
        }
    }

    /// Conjunction; an empty list matches everything and a single clause is returned as is.
    pub fn and(mut clauses: Vec<Query>) -> Self {
        match clauses.len() {
            0 => Query::MatchAll,
            1 => clauses.remove(0),
            _ => Query::And(clauses),
        }
    }

    /// Disjunction; an empty list matches nothing and a single clause is returned as is.
    pub fn or(mut clauses: Vec<Query>) -> Self {
        match clauses.len() {
            0 => Query::MatchNone,
            1 => clauses.remove(0),
            _ => Query::Or(clauses),
        }
    }

    pub fn negate(query: Query) -> Self {
        Query::Not(Box::new(query))
    }

    /// OR together `field:"value"` for every value.
    pub fn any_of<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::or(values.into_iter().map(|v| Query::term(field, v)).collect())
    }

    /// Render to Lucene classic query syntax.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Query::MatchAll => {
                let _ = write!(out, "{}:{}", fields::METAFILE, METAFILE_DOC);
            }
            Query::MatchNone => {
                let _ = write!(
                    out,
                    "({m}:{d} AND NOT {m}:{d})",
                    m = fields::METAFILE,
                    d = METAFILE_DOC
                );
            }
            Query::Term { field, value } => {
                out.push_str(field);
                out.push(':');
                push_value(out, value);
            }
            Query::Wildcard { field, pattern } => {
                out.push_str(field);
                out.push(':');
                let mut chars = pattern.chars();
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        out.push(c);
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                        continue;
                    }
                    if c != '*' && c != '?' && is_special(c) {
                        out.push('\\');
                    }
                    out.push(c);
                }
            }
            Query::Range {
                field,
                lower,
                upper,
            } => {
                out.push_str(field);
                out.push(':');
                match lower {
                    Bound::Included(v) => {
                        out.push('[');
                        push_value(out, v);
                    }
                    Bound::Excluded(v) => {
                        out.push('{');
                        push_value(out, v);
                    }
                    Bound::Unbounded => out.push_str("[*"),
                }
                out.push_str(" TO ");
                match upper {
                    Bound::Included(v) => {
                        push_value(out, v);
                        out.push(']');
                    }
                    Bound::Excluded(v) => {
                        push_value(out, v);
                        out.push('}');
                    }
                    Bound::Unbounded => out.push_str("*]"),
                }
            }
            Query::And(clauses) => render_group(out, clauses, " AND "),
            Query::Or(clauses) => render_group(out, clauses, " OR "),
            Query::Not(inner) => {
                let _ = write!(out, "({}:{} AND NOT ", fields::METAFILE, METAFILE_DOC);
                inner.render_into(out);
                out.push(')');
            }
        }
    }
}

fn render_group(out: &mut String, clauses: &[Query], operator: &str) {
    out.push('(');
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            out.push_str(operator);
        }
        clause.render_into(out);
    }
    out.push(')');
}

/// Characters with a meaning in the query syntax.
fn is_special(c: char) -> bool {
    matches!(
        c,
        '+' | '-' | '&' | '|' | '!' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '"' | '\''
            | '~' | '*' | '?' | ':' | '\\' | '/'
    ) || c.is_whitespace()
}

/// Bare when the value is a plain word, quoted otherwise.
fn push_value(out: &mut String, value: &str) {
    let bare = !value.is_empty()
        && value.chars().all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(value, "AND" | "OR" | "NOT" | "TO");
    if bare {
        out.push_str(value);
        return;
    }
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_terms() {
        assert_eq!(Query::term("type", "observation").render(), "type:observation");
        assert_eq!(
            Query::term("procedure", "urn:ogc:object:sensor:P1").render(),
            r#"procedure:"urn:ogc:object:sensor:P1""#
        );
        assert_eq!(Query::term("id", r#"a"b"#).render(), r#"id:"a\"b""#);
    }

    #[test]
    fn test_render_groups_are_parenthesised() {
        let q = Query::and(vec![
            Query::term("type", "observation"),
            Query::any_of("procedure", ["P1", "P2"]),
        ]);
        assert_eq!(q.render(), "(type:observation AND (procedure:P1 OR procedure:P2))");
    }

    #[test]
    fn test_render_ranges() {
        let q = Query::range("sampling_time_begin", "20200101000000", "20200201000000");
        assert_eq!(q.render(), "sampling_time_begin:[20200101000000 TO 20200201000000]");

        let open = Query::Range {
            field: "f".to_string(),
            lower: Bound::Excluded("a".to_string()),
            upper: Bound::Unbounded,
        };
        assert_eq!(open.render(), "f:{a TO *]");
    }

    #[test]
    fn test_degenerate_groups() {
        assert_eq!(Query::or(vec![]), Query::MatchNone);
        assert_eq!(Query::and(vec![]), Query::MatchAll);
        assert_eq!(Query::or(vec![Query::term("a", "b")]), Query::term("a", "b"));
        assert_eq!(
            Query::MatchNone.render(),
            "(metafile:doc AND NOT metafile:doc)"
        );
    }

    #[test]
    fn test_render_wildcards() {
        assert_eq!(Query::wildcard("id", "*obs:1").render(), r"id:*obs\:1");
        assert_eq!(Query::wildcard("id", r"a\*b*").render(), r"id:a\*b*");
    }

    #[test]
    fn test_render_keywords_are_quoted() {
        assert_eq!(Query::term("f", "AND").render(), r#"f:"AND""#);
    }
}
