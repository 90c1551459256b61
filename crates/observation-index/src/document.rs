//! Flat field documents stored in the observation index.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sos_common::{BoundingBox, SosError, SosResult, TemporalGeometry, TimeToken};

/// Index field names.
pub mod fields {
    pub const ID: &str = "id";
    pub const TYPE: &str = "type";
    pub const PROCEDURE: &str = "procedure";
    pub const OBSERVED_PROPERTY: &str = "observed_property";
    pub const FEATURE_OF_INTEREST: &str = "feature_of_interest";
    pub const SAMPLING_TIME_BEGIN: &str = "sampling_time_begin";
    pub const SAMPLING_TIME_END: &str = "sampling_time_end";
    pub const TEMPLATE: &str = "template";
    pub const METAFILE: &str = "metafile";
}

/// Stored in `sampling_time_end` for single-point observations.
pub const NULL_VALUE: &str = "NULL";

/// Value of `metafile` on every document; `metafile:doc` selects everything.
pub const METAFILE_DOC: &str = "doc";

/// Observation flavour recorded in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationType {
    Observation,
    Measurement,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationType::Observation => "observation",
            ObservationType::Measurement => "measurement",
        }
    }
}

/// Renders a boolean the way the `template` field stores it.
pub fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// One indexed observation or template: field name to string value.
///
/// Every document carries `metafile=doc` and a `sampling_time_end`
/// (the `NULL` sentinel when the sampling time is an instant or unknown).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDocument {
    fields: BTreeMap<String, String>,
    envelope: Option<BoundingBox>,
}

impl FieldDocument {
    /// A document with no field, filled from stored index values.
    pub(crate) fn empty() -> Self {
        Self {
            fields: BTreeMap::new(),
            envelope: None,
        }
    }

    pub fn new(id: &str, kind: ObservationType, template: bool) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(fields::ID.to_string(), id.to_string());
        fields.insert(fields::TYPE.to_string(), kind.as_str().to_string());
        fields.insert(fields::TEMPLATE.to_string(), flag(template).to_string());
        fields.insert(fields::METAFILE.to_string(), METAFILE_DOC.to_string());
        fields.insert(fields::SAMPLING_TIME_END.to_string(), NULL_VALUE.to_string());
        Self {
            fields,
            envelope: None,
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_sampling_time(mut self, time: &TemporalGeometry) -> Self {
        let (begin, end) = match time {
            TemporalGeometry::Instant(at) => (TimeToken::from_datetime(at), None),
            TemporalGeometry::Period { begin, end } => (
                TimeToken::from_datetime(begin),
                Some(TimeToken::from_datetime(end)),
            ),
        };
        self.fields
            .insert(fields::SAMPLING_TIME_BEGIN.to_string(), begin.to_string());
        self.fields.insert(
            fields::SAMPLING_TIME_END.to_string(),
            end.map(|t| t.to_string())
                .unwrap_or_else(|| NULL_VALUE.to_string()),
        );
        self
    }

    pub fn with_envelope(mut self, envelope: BoundingBox) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn id(&self) -> &str {
        self.get(fields::ID).unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn envelope(&self) -> Option<&BoundingBox> {
        self.envelope.as_ref()
    }

    /// Check the invariants of a document read back from the index.
    pub fn validate(&self) -> SosResult<()> {
        if self.get(fields::ID).map_or(true, str::is_empty) {
            return Err(SosError::IndexRead("document without identifier".to_string()));
        }
        if self.get(fields::METAFILE) != Some(METAFILE_DOC) {
            return Err(SosError::IndexRead(format!(
                "document {} lacks the metafile marker",
                self.id()
            )));
        }
        if self.get(fields::SAMPLING_TIME_END).is_none() {
            return Err(SosError::IndexRead(format!(
                "document {} lacks {}",
                self.id(),
                fields::SAMPLING_TIME_END
            )));
        }
        Ok(())
    }

    /// Project the document onto the result triple.
    pub fn to_result(&self) -> ObservationResult {
        ObservationResult {
            identifier: self.id().to_string(),
            begin: self.get(fields::SAMPLING_TIME_BEGIN).and_then(TimeToken::parse),
            end: self.get(fields::SAMPLING_TIME_END).and_then(TimeToken::parse),
        }
    }
}

/// Minimal projection of a matching document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservationResult {
    pub identifier: String,
    pub begin: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}
