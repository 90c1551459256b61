//! Compiled filter handed to the searcher: a query tree plus an optional spatial predicate.

use std::fmt;
use std::str::FromStr;

use sos_common::{BoundingBox, SosError};

use crate::document::{fields, FieldDocument};
use crate::query::Query;

/// How the text query and the spatial filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
    Not,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
            LogicalOperator::Not => "NOT",
        })
    }
}

impl FromStr for LogicalOperator {
    type Err = SosError;

    /// Accepts the operator names and the legacy integer tags `0`, `1`, `2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" | "0" => Ok(LogicalOperator::And),
            "OR" | "1" => Ok(LogicalOperator::Or),
            "NOT" | "2" => Ok(LogicalOperator::Not),
            other => Err(SosError::IllegalArgument(format!(
                "unsupported logical operator: {}",
                other
            ))),
        }
    }
}

/// Spatial predicate over a feature-of-interest envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpatialFilter {
    /// Envelope intersects the box.
    BBox(BoundingBox),
    /// Envelope lies inside the box.
    Within(BoundingBox),
}

impl SpatialFilter {
    /// Documents without an envelope never match.
    pub fn matches(&self, document: &FieldDocument) -> bool {
        let Some(envelope) = document.envelope() else {
            return false;
        };
        match self {
            SpatialFilter::BBox(area) => envelope.intersects(area),
            SpatialFilter::Within(area) => envelope.within(area),
        }
    }
}

/// Result ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: false,
        }
    }

    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            descending: true,
        }
    }
}

impl Default for SortSpec {
    fn default() -> Self {
        SortSpec::ascending(fields::SAMPLING_TIME_BEGIN)
    }
}

/// A filter session compiled for the searcher.
///
/// Sub-queries are resolved on their own and intersected with this query's
/// matches, for constraints the flat query cannot express.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialQuery {
    pub query: Query,
    pub spatial_filter: Option<SpatialFilter>,
    pub operator: LogicalOperator,
    pub sort: Option<SortSpec>,
    pub sub_queries: Vec<SpatialQuery>,
}

impl SpatialQuery {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            spatial_filter: None,
            operator: LogicalOperator::And,
            sort: None,
            sub_queries: Vec::new(),
        }
    }

    /// The query in Lucene classic syntax.
    pub fn text(&self) -> String {
        self.query.render()
    }

    pub fn with_spatial_filter(mut self, filter: SpatialFilter, operator: LogicalOperator) -> Self {
        self.spatial_filter = Some(filter);
        self.operator = operator;
        self
    }

    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_sub_query(mut self, sub_query: SpatialQuery) -> Self {
        self.sub_queries.push(sub_query);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ObservationType;

    #[test]
    fn test_operator_tags() {
        assert_eq!("and".parse::<LogicalOperator>().unwrap(), LogicalOperator::And);
        assert_eq!("1".parse::<LogicalOperator>().unwrap(), LogicalOperator::Or);
        assert_eq!("NOT".parse::<LogicalOperator>().unwrap(), LogicalOperator::Not);
        assert!(matches!(
            "XOR".parse::<LogicalOperator>(),
            Err(SosError::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_spatial_filter_needs_envelope() {
        let area = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let located = FieldDocument::new("a", ObservationType::Observation, false)
            .with_envelope(BoundingBox::point(5.0, 5.0));
        let unlocated = FieldDocument::new("b", ObservationType::Observation, false);

        assert!(SpatialFilter::BBox(area).matches(&located));
        assert!(SpatialFilter::Within(area).matches(&located));
        assert!(!SpatialFilter::BBox(area).matches(&unlocated));
    }
}
