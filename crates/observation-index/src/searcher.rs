//! Executes compiled filters against the observation index.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use tantivy::collector::DocSetCollector;
use tantivy::query::{AllQuery, Query as TantivyQuery};
use tantivy::{DocAddress, IndexReader, Searcher, TantivyDocument};
use tracing::{debug, instrument};

use sos_common::{SosError, SosResult};

use crate::conversion::{to_tantivy, QueryLimits};
use crate::document::{FieldDocument, ObservationResult};
use crate::index::{IndexFields, ObservationIndex};
use crate::spatial::{LogicalOperator, SortSpec, SpatialQuery};

/// Searches the last loaded commit of an index; `refresh` picks up rebuilds.
pub struct ObservationSearcher {
    index: ObservationIndex,
    reader: IndexReader,
}

impl ObservationSearcher {
    /// Open the index stored in `dir`.
    pub fn open(dir: &Path) -> SosResult<Self> {
        Self::from_index(ObservationIndex::open(dir)?)
    }

    pub fn from_index(index: ObservationIndex) -> SosResult<Self> {
        let reader = index.reader()?;
        Ok(Self { index, reader })
    }

    /// Load the latest commit after a rebuild.
    pub fn refresh(&self) -> SosResult<()> {
        self.reader
            .reload()
            .map_err(|e| SosError::IndexRead(format!("cannot reload index: {}", e)))
    }

    /// Identifiers of the matching observations.
    #[instrument(skip(self, query), fields(text = %query.text(), operator = %query.operator))]
    pub fn filter_observation(&self, query: &SpatialQuery) -> SosResult<BTreeSet<String>> {
        let mut snapshot = Snapshot::new(self.reader.searcher(), self.index.fields());
        let docs = snapshot.resolve(query)?;
        let mut ids = BTreeSet::new();
        for address in docs {
            ids.insert(snapshot.document(address)?.id().to_string());
        }
        debug!(matches = ids.len(), "Observation filter complete");
        Ok(ids)
    }

    /// Result triples of the matching observations, sorted by the query's
    /// sort (sampling begin ascending by default) and free of duplicates.
    #[instrument(skip(self, query), fields(text = %query.text(), operator = %query.operator))]
    pub fn filter_result(&self, query: &SpatialQuery) -> SosResult<Vec<ObservationResult>> {
        let mut snapshot = Snapshot::new(self.reader.searcher(), self.index.fields());
        let docs = snapshot.resolve(query)?;
        let mut documents = Vec::with_capacity(docs.len());
        for address in docs {
            documents.push(snapshot.document(address)?.clone());
        }
        sort_documents(&mut documents, &query.sort.clone().unwrap_or_default());

        let mut seen = HashSet::new();
        let results: Vec<ObservationResult> = documents
            .iter()
            .map(FieldDocument::to_result)
            .filter(|result| seen.insert(result.clone()))
            .collect();
        debug!(matches = results.len(), "Result filter complete");
        Ok(results)
    }
}

/// One searcher generation with the documents loaded so far.
struct Snapshot<'a> {
    searcher: Searcher,
    fields: &'a IndexFields,
    loaded: HashMap<DocAddress, FieldDocument>,
}

impl<'a> Snapshot<'a> {
    fn new(searcher: Searcher, fields: &'a IndexFields) -> Self {
        Self {
            searcher,
            fields,
            loaded: HashMap::new(),
        }
    }

    fn search(&self, query: &dyn TantivyQuery) -> SosResult<BTreeSet<DocAddress>> {
        let docs = self
            .searcher
            .search(query, &DocSetCollector)
            .map_err(|e| SosError::IndexRead(format!("search failed: {}", e)))?;
        Ok(docs.into_iter().collect())
    }

    fn document(&mut self, address: DocAddress) -> SosResult<&FieldDocument> {
        if !self.loaded.contains_key(&address) {
            let doc: TantivyDocument = self
                .searcher
                .doc(address)
                .map_err(|e| SosError::IndexRead(format!("cannot load document: {}", e)))?;
            let document = self.fields.from_tantivy(&doc)?;
            self.loaded.insert(address, document);
        }
        self.loaded
            .get(&address)
            .ok_or_else(|| SosError::InternalError("document cache miss".to_string()))
    }

    /// Keep the documents satisfying the spatial filter, if any.
    fn spatial_matches(&mut self, query: &SpatialQuery, docs: BTreeSet<DocAddress>) -> SosResult<BTreeSet<DocAddress>> {
        let Some(filter) = &query.spatial_filter else {
            return Ok(docs);
        };
        let mut kept = BTreeSet::new();
        for address in docs {
            if filter.matches(self.document(address)?) {
                kept.insert(address);
            }
        }
        Ok(kept)
    }

    /// Matching documents of `query`, sub-queries applied.
    fn resolve(&mut self, query: &SpatialQuery) -> SosResult<BTreeSet<DocAddress>> {
        let text = query.text();
        let limits = QueryLimits::for_query_text(&text);
        if limits.allow_leading_wildcard {
            debug!(text = %text, "Leading wildcard, relaxing query limits");
        }
        let compiled = to_tantivy(&query.query, self.fields, &limits)?;
        let matched = self.search(compiled.as_ref())?;

        let mut docs = match (query.operator, &query.spatial_filter) {
            (LogicalOperator::And, _) | (LogicalOperator::Or, None) => {
                self.spatial_matches(query, matched)?
            }
            (LogicalOperator::Or, Some(_)) => {
                let all = self.search(&AllQuery)?;
                let mut union = matched;
                union.extend(self.spatial_matches(query, all)?);
                union
            }
            (LogicalOperator::Not, _) => {
                let unwanted = self.spatial_matches(query, matched)?;
                let all = self.search(&AllQuery)?;
                all.difference(&unwanted).copied().collect()
            }
        };

        for sub_query in &query.sub_queries {
            let allowed = self.resolve(sub_query)?;
            docs = docs.intersection(&allowed).copied().collect();
        }
        Ok(docs)
    }
}

fn sort_documents(documents: &mut [FieldDocument], sort: &SortSpec) {
    documents.sort_by(|a, b| {
        let ordering = match (a.get(&sort.field), b.get(&sort.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.cmp(y),
        };
        if sort.descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{fields, ObservationType};
    use crate::query::Query;
    use crate::spatial::SpatialFilter;
    use sos_common::BoundingBox;

    fn searcher() -> ObservationSearcher {
        let index = ObservationIndex::in_memory(&[
            FieldDocument::new("inside", ObservationType::Observation, false)
                .with_field(fields::PROCEDURE, "P1")
                .with_envelope(BoundingBox::point(1.0, 1.0)),
            FieldDocument::new("outside", ObservationType::Observation, false)
                .with_field(fields::PROCEDURE, "P1")
                .with_envelope(BoundingBox::point(50.0, 50.0)),
            FieldDocument::new("other", ObservationType::Observation, false)
                .with_field(fields::PROCEDURE, "P2")
                .with_envelope(BoundingBox::point(2.0, 2.0)),
        ])
        .unwrap();
        ObservationSearcher::from_index(index).unwrap()
    }

    fn p1() -> Query {
        Query::term(fields::PROCEDURE, "P1")
    }

    fn area() -> SpatialFilter {
        SpatialFilter::BBox(BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_and_combines_text_and_space() {
        let q = SpatialQuery::new(p1()).with_spatial_filter(area(), LogicalOperator::And);
        assert_eq!(searcher().filter_observation(&q).unwrap(), ids(&["inside"]));
    }

    #[test]
    fn test_or_unions_without_duplicates() {
        let q = SpatialQuery::new(p1()).with_spatial_filter(area(), LogicalOperator::Or);
        let results = searcher().filter_result(&q).unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(
            names.iter().collect::<BTreeSet<_>>().len(),
            3,
            "duplicate identifiers in {:?}",
            names
        );
    }

    #[test]
    fn test_not_returns_complement() {
        let q = SpatialQuery::new(p1()).with_spatial_filter(area(), LogicalOperator::Not);
        assert_eq!(searcher().filter_observation(&q).unwrap(), ids(&["outside", "other"]));

        let text_only = SpatialQuery {
            operator: LogicalOperator::Not,
            ..SpatialQuery::new(p1())
        };
        assert_eq!(searcher().filter_observation(&text_only).unwrap(), ids(&["other"]));
    }

    #[test]
    fn test_negated_query_keeps_positive_base() {
        let q = SpatialQuery::new(Query::negate(p1()));
        assert_eq!(searcher().filter_observation(&q).unwrap(), ids(&["other"]));
        assert!(searcher()
            .filter_observation(&SpatialQuery::new(Query::MatchNone))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sub_query_intersection() {
        let q = SpatialQuery::new(Query::MatchAll)
            .with_sub_query(SpatialQuery::new(p1()))
            .with_sub_query(SpatialQuery::new(Query::MatchAll).with_spatial_filter(area(), LogicalOperator::And));
        assert_eq!(searcher().filter_observation(&q).unwrap(), ids(&["inside"]));
    }

    #[test]
    fn test_leading_wildcard_query() {
        let q = SpatialQuery::new(Query::wildcard(fields::ID, "*side"));
        assert_eq!(searcher().filter_observation(&q).unwrap(), ids(&["inside", "outside"]));

        // an escaped star is literal even next to a real wildcard
        let literal = SpatialQuery::new(Query::wildcard(fields::ID, r"in\*ide*"));
        assert!(searcher().filter_observation(&literal).unwrap().is_empty());
    }

    #[test]
    fn test_range_over_identifiers() {
        let q = SpatialQuery::new(Query::range(fields::ID, "inside", "other"));
        assert_eq!(searcher().filter_observation(&q).unwrap(), ids(&["inside", "other"]));
        let inverted = SpatialQuery::new(Query::range(fields::ID, "z", "a"));
        assert!(searcher().filter_observation(&inverted).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let q = SpatialQuery::new(Query::term("no_such_field", "x"));
        assert!(matches!(
            searcher().filter_observation(&q),
            Err(SosError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_clause_ceiling() {
        let many = Query::any_of(fields::ID, (0..1100).map(|i| format!("obs-{}", i)));
        assert!(matches!(
            searcher().filter_observation(&SpatialQuery::new(many)),
            Err(SosError::TooManyClauses { limit: 1024 })
        ));
    }
}
