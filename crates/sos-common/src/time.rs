//! Time handling for observation sampling times.
//!
//! Sampling times are stored in the index as fixed-width `yyyyMMddHHmmss`
//! tokens, so lexicographic order of tokens is chronological order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SosError, EVENT_TIME_LOCATOR};

const TOKEN_FORMAT: &str = "%Y%m%d%H%M%S";

/// A sortable date token (`yyyyMMddHHmmss`, always 14 characters).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeToken(String);

impl TimeToken {
    /// Width of every token, sentinels included.
    pub const WIDTH: usize = 14;

    /// Lower bound standing in for negative infinity.
    pub fn min() -> Self {
        TimeToken("0".repeat(Self::WIDTH))
    }

    /// Upper bound standing in for positive infinity.
    pub fn max() -> Self {
        TimeToken("9".repeat(Self::WIDTH))
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        TimeToken(dt.format(TOKEN_FORMAT).to_string())
    }

    /// Parse a stored token back into a timestamp.
    pub fn parse(token: &str) -> Option<DateTime<Utc>> {
        if token.len() != Self::WIDTH {
            return None;
        }
        NaiveDateTime::parse_from_str(token, TOKEN_FORMAT)
            .ok()
            .map(|ndt| Utc.from_utc_datetime(&ndt))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&DateTime<Utc>> for TimeToken {
    fn from(dt: &DateTime<Utc>) -> Self {
        TimeToken::from_datetime(dt)
    }
}

/// Parse an ISO 8601 timestamp, assuming UTC when no offset is given.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, SosError> {
    let s = s.trim();

    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try date only
    if let Ok(ndt) = NaiveDateTime::parse_from_str(&format!("{}T00:00:00", s), "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(SosError::InvalidTime(s.to_string()))
}

/// The temporal shape of a sampling time or of a temporal filter operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemporalGeometry {
    Instant(DateTime<Utc>),
    Period {
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TemporalGeometry {
    /// Parse `instant` or `begin/end`.
    pub fn parse(s: &str) -> Result<Self, SosError> {
        if let Some((begin, end)) = s.split_once('/') {
            let begin = parse_iso8601(begin)?;
            let end = parse_iso8601(end)?;
            if end < begin {
                return Err(SosError::InvalidTime(format!(
                    "period end precedes its begin: {}",
                    s
                )));
            }
            return Ok(TemporalGeometry::Period { begin, end });
        }
        Ok(TemporalGeometry::Instant(parse_iso8601(s)?))
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            TemporalGeometry::Instant(_) => "instant",
            TemporalGeometry::Period { .. } => "period",
        }
    }
}

/// Temporal operators supported by the observation filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalRelation {
    Equals,
    Before,
    After,
    During,
}

impl TemporalRelation {
    /// OGC filter operator name.
    pub fn operator_name(&self) -> &'static str {
        match self {
            TemporalRelation::Equals => "TM_Equals",
            TemporalRelation::Before => "TM_Before",
            TemporalRelation::After => "TM_After",
            TemporalRelation::During => "TM_During",
        }
    }
}

impl fmt::Display for TemporalRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operator_name())
    }
}

impl FromStr for TemporalRelation {
    type Err = SosError;

    /// Accepts the OGC names (`TM_During`) and the bare ones (`during`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        let bare = name
            .strip_prefix("TM_")
            .or_else(|| name.strip_prefix("tm_"))
            .unwrap_or(name);
        match bare.to_ascii_lowercase().as_str() {
            "equals" => Ok(TemporalRelation::Equals),
            "before" => Ok(TemporalRelation::Before),
            "after" => Ok(TemporalRelation::After),
            "during" => Ok(TemporalRelation::During),
            _ => Err(SosError::invalid_parameter(
                EVENT_TIME_LOCATOR,
                format!("unsupported temporal operator: {}", name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_token_is_fixed_width_and_sortable() {
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2020, 1, 5, 12, 30, 0).unwrap();
        let a = TimeToken::from_datetime(&early);
        let b = TimeToken::from_datetime(&late);

        assert_eq!(a.as_str(), "20200101000000");
        assert_eq!(b.as_str().len(), TimeToken::WIDTH);
        assert!(TimeToken::min() < a && a < b && b < TimeToken::max());
    }

    #[test]
    fn test_token_parse_round_trips() {
        let dt = TimeToken::parse("20240115120000").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.hour(), 12);
        assert!(TimeToken::parse("NULL").is_none());
        assert!(TimeToken::parse("19700000").is_none());
    }

    #[test]
    fn test_parse_temporal_geometry() {
        match TemporalGeometry::parse("2019-12-01/2020-02-01").unwrap() {
            TemporalGeometry::Period { begin, end } => {
                assert_eq!(begin.month(), 12);
                assert_eq!(end.month(), 2);
            }
            _ => panic!("Expected period"),
        }
        assert!(matches!(
            TemporalGeometry::parse("2020-01-03T00:00:00Z").unwrap(),
            TemporalGeometry::Instant(_)
        ));
        assert!(TemporalGeometry::parse("2020-02-01/2019-12-01").is_err());
    }

    #[test]
    fn test_relation_names() {
        assert_eq!("TM_During".parse::<TemporalRelation>().unwrap(), TemporalRelation::During);
        assert_eq!("before".parse::<TemporalRelation>().unwrap(), TemporalRelation::Before);
        let err = "TM_Meets".parse::<TemporalRelation>().unwrap_err();
        assert_eq!(err.locator(), Some("eventTime"));
    }
}
