//! Observation index for the SOS service.
//!
//! Observations are flattened into field documents, stored in a tantivy
//! index, and searched with a boolean query tree combined with an optional
//! spatial filter. [`ObservationFilter`] assembles that query from
//! request parameters; [`ObservationIndexer`] rebuilds the index from disk.

pub mod config;
pub mod conversion;
pub mod document;
pub mod filter;
pub mod index;
pub mod indexer;
pub mod query;
pub mod searcher;
pub mod spatial;
pub mod temporal;

pub use config::IndexerConfig;
pub use conversion::QueryLimits;
pub use document::{FieldDocument, ObservationResult, ObservationType};
pub use filter::{ObservationFilter, Offering, ResponseMode};
pub use index::{ObservationIndex, ObservationWriter};
pub use indexer::{IndexStats, ObservationIndexer, ObservationRecord};
pub use query::Query;
pub use searcher::ObservationSearcher;
pub use spatial::{LogicalOperator, SortSpec, SpatialFilter, SpatialQuery};
