//! Converts [`Query`] trees into tantivy queries.
//!
//! Terms become `TermQuery`, ranges `RangeQuery` over the term dictionary,
//! wildcards `RegexQuery`, and boolean nodes `BooleanQuery`. `Not` always
//! keeps a positive `AllQuery` clause so it selects the complement.

use std::ops::Bound;

use tantivy::query::{AllQuery, BooleanQuery, EmptyQuery, Occur, Query as TantivyQuery, RangeQuery, RegexQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Term};

use sos_common::{SosError, SosResult};

use crate::index::IndexFields;
use crate::query::Query;

/// Default ceiling on the number of clauses in one boolean group.
pub const DEFAULT_MAX_CLAUSE_COUNT: usize = 1024;

/// Text fragments that mark a leading wildcard in rendered query text.
const LEADING_WILDCARD_PATTERNS: [&str; 5] = [":*", ":?", ":(*", ":(+*", ":+*"];

/// Restrictions applied while converting one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    pub allow_leading_wildcard: bool,
    pub max_clause_count: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            allow_leading_wildcard: false,
            max_clause_count: DEFAULT_MAX_CLAUSE_COUNT,
        }
    }
}

impl QueryLimits {
    /// Leading wildcards allowed, no clause ceiling.
    pub fn relaxed() -> Self {
        Self {
            allow_leading_wildcard: true,
            max_clause_count: usize::MAX,
        }
    }

    /// Pick the limits a rendered query text needs.
    pub fn for_query_text(text: &str) -> Self {
        if requires_leading_wildcard(text) {
            Self::relaxed()
        } else {
            Self::default()
        }
    }
}

/// Whether the query text contains a term starting with a wildcard.
pub fn requires_leading_wildcard(text: &str) -> bool {
    LEADING_WILDCARD_PATTERNS.iter().any(|p| text.contains(p))
}

/// Build the tantivy query for `query`.
pub fn to_tantivy(query: &Query, fields: &IndexFields, limits: &QueryLimits) -> SosResult<Box<dyn TantivyQuery>> {
    match query {
        Query::MatchAll => Ok(Box::new(AllQuery)),
        Query::MatchNone => Ok(Box::new(EmptyQuery)),
        Query::Term { field, value } => {
            let term = Term::from_field_text(fields.require(field)?, value);
            Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
        }
        Query::Range { field, lower, upper } => {
            let field = fields.require(field)?;
            let to_term = |bound: &Bound<String>| match bound {
                Bound::Included(v) => Bound::Included(Term::from_field_text(field, v)),
                Bound::Excluded(v) => Bound::Excluded(Term::from_field_text(field, v)),
                Bound::Unbounded => Bound::Unbounded,
            };
            Ok(Box::new(RangeQuery::new(to_term(lower), to_term(upper))))
        }
        Query::Wildcard { field, pattern } => {
            if !limits.allow_leading_wildcard && starts_with_wildcard(pattern) {
                return Err(SosError::InvalidQuery(format!(
                    "leading wildcard not allowed: {}:{}",
                    field, pattern
                )));
            }
            let regex = wildcard_to_regex(pattern);
            let query = RegexQuery::from_pattern(&regex, fields.require(field)?).map_err(|e| {
                SosError::InvalidQuery(format!("bad wildcard pattern '{}': {}", pattern, e))
            })?;
            Ok(Box::new(query))
        }
        Query::And(clauses) => boolean(clauses, Occur::Must, fields, limits),
        Query::Or(clauses) => boolean(clauses, Occur::Should, fields, limits),
        Query::Not(inner) => Ok(Box::new(BooleanQuery::new(vec![
            (Occur::Must, Box::new(AllQuery) as Box<dyn TantivyQuery>),
            (Occur::MustNot, to_tantivy(inner, fields, limits)?),
        ]))),
    }
}

fn boolean(
    clauses: &[Query],
    occur: Occur,
    fields: &IndexFields,
    limits: &QueryLimits,
) -> SosResult<Box<dyn TantivyQuery>> {
    if clauses.len() > limits.max_clause_count {
        return Err(SosError::TooManyClauses {
            limit: limits.max_clause_count,
        });
    }
    let subqueries = clauses
        .iter()
        .map(|clause| Ok((occur, to_tantivy(clause, fields, limits)?)))
        .collect::<SosResult<Vec<_>>>()?;
    Ok(Box::new(BooleanQuery::new(subqueries)))
}

/// A `\` escapes the next character, so `\*` is a literal star.
fn starts_with_wildcard(pattern: &str) -> bool {
    matches!(pattern.chars().next(), Some('*' | '?'))
}

/// Anchored regex for a wildcard pattern: `*` any run, `?` one character,
/// `\x` the literal `x`.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' => match chars.next() {
                Some(literal) => push_literal(&mut regex, literal),
                None => push_literal(&mut regex, '\\'),
            },
            other => push_literal(&mut regex, other),
        }
    }
    regex
}

fn push_literal(regex: &mut String, c: char) {
    if matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
    ) {
        regex.push('\\');
    }
    regex.push(c);
}
