//! Common types and utilities shared across the SOS observation services.

pub mod bbox;
pub mod error;
pub mod time;

pub use bbox::BoundingBox;
pub use error::{SosError, SosResult, EVENT_TIME_LOCATOR};
pub use time::{TemporalGeometry, TemporalRelation, TimeToken};
