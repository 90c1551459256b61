//! Builds one observation filter session from request parameters.
//!
//! A session starts from a base clause (document type, template flag, and an
//! optional fixed procedure), accumulates one AND-ed clause per parameter, and
//! ends with a terminal search call that consumes the builder.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use sos_common::{BoundingBox, SosResult, TemporalGeometry, TemporalRelation};

use crate::document::{fields, flag, ObservationResult, ObservationType};
use crate::query::Query;
use crate::searcher::ObservationSearcher;
use crate::spatial::{LogicalOperator, SortSpec, SpatialFilter, SpatialQuery};
use crate::temporal;

/// Which documents a GetObservation session targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// Live observations (`template:FALSE`).
    #[default]
    Inline,
    /// Result templates (`template:TRUE`).
    ResultTemplate,
    /// Both kinds.
    OutOfBand,
}

/// Offering metadata used to default the procedure clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: String,
    #[serde(default)]
    pub procedures: Vec<String>,
    #[serde(default)]
    pub observed_properties: Vec<String>,
    #[serde(default)]
    pub features_of_interest: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ObservationFilter {
    base: Vec<Query>,
    clauses: Vec<Query>,
    spatial_filter: Option<SpatialFilter>,
    operator: LogicalOperator,
    sort: Option<SortSpec>,
    sub_queries: Vec<SpatialQuery>,
}

impl ObservationFilter {
    fn with_base(base: Vec<Query>) -> Self {
        Self {
            base,
            clauses: Vec::new(),
            spatial_filter: None,
            operator: LogicalOperator::And,
            sort: None,
            sub_queries: Vec::new(),
        }
    }

    /// Session for a GetObservation request.
    pub fn observations(mode: ResponseMode, kind: ObservationType) -> Self {
        let mut base = vec![Query::term(fields::TYPE, kind.as_str())];
        match mode {
            ResponseMode::Inline => base.push(Query::term(fields::TEMPLATE, flag(false))),
            ResponseMode::ResultTemplate => base.push(Query::term(fields::TEMPLATE, flag(true))),
            ResponseMode::OutOfBand => {}
        }
        Self::with_base(base)
    }

    /// Session for a GetResult request on the observations of one procedure.
    pub fn get_result(procedure: &str, kind: ObservationType) -> Self {
        Self::with_base(vec![
            Query::term(fields::TYPE, kind.as_str()),
            Query::term(fields::TEMPLATE, flag(false)),
            Query::term(fields::PROCEDURE, procedure),
        ])
    }

    /// Restrict to the requested procedures, or to every procedure of the
    /// offerings when none are requested. No procedure at all matches nothing.
    pub fn set_procedure(&mut self, procedures: &[String], offerings: &[Offering]) -> &mut Self {
        let candidates: Vec<&String> = if procedures.is_empty() {
            offerings.iter().flat_map(|o| o.procedures.iter()).collect()
        } else {
            procedures.iter().collect()
        };

        let mut seen = HashSet::new();
        let unique: Vec<&str> = candidates
            .into_iter()
            .map(String::as_str)
            .filter(|p| seen.insert(*p))
            .collect();

        if unique.is_empty() {
            debug!("No procedure to filter on, session matches nothing");
        }
        self.clauses.push(Query::any_of(fields::PROCEDURE, unique));
        self
    }

    /// Empty lists leave the session unchanged.
    pub fn set_observed_properties(&mut self, properties: &[String]) -> &mut Self {
        if !properties.is_empty() {
            self.clauses
                .push(Query::any_of(fields::OBSERVED_PROPERTY, properties.iter().map(String::as_str)));
        }
        self
    }

    /// Empty lists leave the session unchanged.
    pub fn set_feature_of_interest(&mut self, features: &[String]) -> &mut Self {
        if !features.is_empty() {
            self.clauses.push(Query::any_of(
                fields::FEATURE_OF_INTEREST,
                features.iter().map(String::as_str),
            ));
        }
        self
    }

    /// Add a temporal clause; unsupported relation/shape pairs fail.
    pub fn set_time_filter(
        &mut self,
        relation: TemporalRelation,
        time: &TemporalGeometry,
    ) -> SosResult<&mut Self> {
        let clause = temporal::compile(relation, time)?;
        self.clauses.push(clause);
        Ok(self)
    }

    /// Intersect with the features of interest inside `bbox`.
    pub fn set_bounding_box(&mut self, bbox: BoundingBox) -> &mut Self {
        self.spatial_filter = Some(SpatialFilter::BBox(bbox));
        self
    }

    pub fn set_spatial_filter(&mut self, filter: SpatialFilter) -> &mut Self {
        self.spatial_filter = Some(filter);
        self
    }

    pub fn set_logical_operator(&mut self, operator: LogicalOperator) -> &mut Self {
        self.operator = operator;
        self
    }

    pub fn set_sort(&mut self, sort: SortSpec) -> &mut Self {
        self.sort = Some(sort);
        self
    }

    pub fn add_sub_query(&mut self, sub_query: SpatialQuery) -> &mut Self {
        self.sub_queries.push(sub_query);
        self
    }

    /// The accumulated text query.
    pub fn query(&self) -> Query {
        Query::and(self.base.iter().chain(self.clauses.iter()).cloned().collect())
    }

    pub fn query_text(&self) -> String {
        self.query().render()
    }

    pub fn build(self) -> SpatialQuery {
        SpatialQuery {
            query: self.query(),
            spatial_filter: self.spatial_filter,
            operator: self.operator,
            sort: self.sort,
            sub_queries: self.sub_queries,
        }
    }

    /// Run the session and return the matching observation identifiers.
    pub fn filter_observation(self, searcher: &ObservationSearcher) -> SosResult<BTreeSet<String>> {
        searcher.filter_observation(&self.build())
    }

    /// Run the session and return (identifier, begin, end) triples.
    pub fn filter_result(self, searcher: &ObservationSearcher) -> SosResult<Vec<ObservationResult>> {
        searcher.filter_result(&self.build())
    }
}
