//! Compiles temporal filters into range predicates over sampling times.
//!
//! Observations store `sampling_time_begin` and `sampling_time_end` as
//! fixed-width tokens; a single-point observation has `sampling_time_end:NULL`.
//! The `NULL` sentinel sorts above every date token, so open-ended ranges on
//! the end field never match single-point observations.

use sos_common::{SosError, SosResult, TemporalGeometry, TemporalRelation, TimeToken, EVENT_TIME_LOCATOR};

use crate::document::{fields, NULL_VALUE};
use crate::query::Query;

const BEGIN: &str = fields::SAMPLING_TIME_BEGIN;
const END: &str = fields::SAMPLING_TIME_END;

/// Build the predicate for `relation` applied to `time`.
pub fn compile(relation: TemporalRelation, time: &TemporalGeometry) -> SosResult<Query> {
    match (relation, time) {
        (TemporalRelation::Equals, TemporalGeometry::Instant(at)) => {
            Ok(equals_instant(&TimeToken::from_datetime(at)))
        }
        (TemporalRelation::Equals, TemporalGeometry::Period { begin, end }) => Ok(equals_period(
            &TimeToken::from_datetime(begin),
            &TimeToken::from_datetime(end),
        )),
        (TemporalRelation::Before, TemporalGeometry::Instant(at)) => {
            Ok(before(&TimeToken::from_datetime(at)))
        }
        (TemporalRelation::After, TemporalGeometry::Instant(at)) => {
            Ok(after(&TimeToken::from_datetime(at)))
        }
        (TemporalRelation::During, TemporalGeometry::Period { begin, end }) => Ok(during(
            &TimeToken::from_datetime(begin),
            &TimeToken::from_datetime(end),
        )),
        (relation, time) => Err(SosError::UnsupportedTemporalShape {
            relation: relation.operator_name().to_string(),
            shape: time.shape_name(),
            locator: EVENT_TIME_LOCATOR,
        }),
    }
}

fn up_to(field: &str, bound: &TimeToken) -> Query {
    Query::range(field, TimeToken::min().to_string(), bound.to_string())
}

fn from(field: &str, bound: &TimeToken) -> Query {
    Query::range(field, bound.to_string(), TimeToken::max().to_string())
}

fn between(field: &str, lower: &TimeToken, upper: &TimeToken) -> Query {
    Query::range(field, lower.to_string(), upper.to_string())
}

/// Single-point observation at the instant, or an interval containing it.
fn equals_instant(at: &TimeToken) -> Query {
    Query::or(vec![
        Query::and(vec![
            Query::term(BEGIN, at.to_string()),
            Query::term(END, NULL_VALUE),
        ]),
        Query::and(vec![up_to(BEGIN, at), from(END, at)]),
    ])
}

fn equals_period(begin: &TimeToken, end: &TimeToken) -> Query {
    Query::and(vec![
        Query::term(BEGIN, begin.to_string()),
        Query::term(END, end.to_string()),
    ])
}

fn before(at: &TimeToken) -> Query {
    up_to(BEGIN, at)
}

/// Begins at or after the instant, or straddles it.
fn after(at: &TimeToken) -> Query {
    Query::or(vec![
        from(BEGIN, at),
        Query::and(vec![up_to(BEGIN, at), from(END, at)]),
    ])
}

/// Any overlap between the observation and `[begin, end]`.
fn during(begin: &TimeToken, end: &TimeToken) -> Query {
    Query::or(vec![
        // interval inside the period
        Query::and(vec![between(BEGIN, begin, end), between(END, begin, end)]),
        // single point inside the period
        Query::and(vec![between(BEGIN, begin, end), Query::term(END, NULL_VALUE)]),
        // interval overlapping the period start
        Query::and(vec![up_to(BEGIN, begin), between(END, begin, end)]),
        // interval overlapping the period end
        Query::and(vec![between(BEGIN, begin, end), from(END, end)]),
        // interval covering the whole period
        Query::and(vec![up_to(BEGIN, begin), from(END, end)]),
    ])
}
