//! Batch build of the observation index from JSON observation files.
//!
//! Live observations and result templates are read from separate
//! directories and flattened into [`FieldDocument`]s. The index is rebuilt
//! wholesale on every run.
//!
//! File handling policy:
//! - unreadable files and directory entries are logged and skipped
//! - well-formed JSON that is not an observation is logged and skipped
//! - malformed JSON aborts the build with `IndexBuildFailure`

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use sos_common::{BoundingBox, SosError, SosResult, TemporalGeometry};

use crate::config::IndexerConfig;
use crate::document::{fields, FieldDocument, ObservationType};
use crate::index::ObservationIndex;
use crate::searcher::ObservationSearcher;

/// An observation (or result template) as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub id: String,
    pub procedure: String,
    pub observed_property: String,
    pub feature_of_interest: FeatureOfInterest,
    #[serde(default)]
    pub sampling_time: Option<TemporalGeometry>,
    #[serde(default)]
    pub result: Option<ResultContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureOfInterest {
    pub id: String,
    #[serde(default)]
    pub location: Option<Location>,
}

/// Feature geometry: `{"point": [x, y]}` or `{"bbox": [minx, miny, maxx, maxy]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Point([f64; 2]),
    Bbox([f64; 4]),
}

impl Location {
    pub fn envelope(&self) -> BoundingBox {
        match *self {
            Location::Point([x, y]) => BoundingBox::point(x, y),
            Location::Bbox([min_x, min_y, max_x, max_y]) => {
                BoundingBox::new(min_x, min_y, max_x, max_y)
            }
        }
    }
}

/// Observation result; a value with a unit of measure makes a measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultContent {
    Measure { value: f64, uom: String },
    Other(serde_json::Value),
}

impl ObservationRecord {
    pub fn kind(&self) -> ObservationType {
        match self.result {
            Some(ResultContent::Measure { .. }) => ObservationType::Measurement,
            _ => ObservationType::Observation,
        }
    }

    /// Flatten into an index document.
    pub fn to_document(&self, template: bool) -> FieldDocument {
        let mut document = FieldDocument::new(&self.id, self.kind(), template)
            .with_field(fields::PROCEDURE, &self.procedure)
            .with_field(fields::OBSERVED_PROPERTY, &self.observed_property)
            .with_field(fields::FEATURE_OF_INTEREST, &self.feature_of_interest.id);
        if let Some(time) = &self.sampling_time {
            document = document.with_sampling_time(time);
        }
        if let Some(location) = &self.feature_of_interest.location {
            document = document.with_envelope(location.envelope());
        }
        document
    }
}

/// Counts reported by one index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub observations: usize,
    pub templates: usize,
    pub skipped: usize,
}

pub struct ObservationIndexer {
    config: IndexerConfig,
}

impl ObservationIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Rebuild the whole index from the configured directories.
    #[instrument(skip(self), fields(index_dir = %self.config.index_dir.display()))]
    pub fn create_index(&self) -> SosResult<IndexStats> {
        self.config.validate()?;
        let writer = ObservationIndex::open_or_create(&self.config.index_dir)?.writer()?;

        let mut stats = IndexStats::default();
        let mut documents = Vec::new();

        let observations = read_documents(&self.config.observation_dir, false, &mut stats)?;
        stats.observations = observations.len();
        documents.extend(observations);

        if let Some(template_dir) = &self.config.template_dir {
            let templates = read_documents(template_dir, true, &mut stats)?;
            stats.templates = templates.len();
            documents.extend(templates);
        }

        writer.replace_all(&documents)?;
        info!(
            observations = stats.observations,
            templates = stats.templates,
            skipped = stats.skipped,
            "Observation index built"
        );
        Ok(stats)
    }

    /// Rebuild the index and point `searcher` at the new build.
    pub fn refresh(&self, searcher: &ObservationSearcher) -> SosResult<IndexStats> {
        let stats = self.create_index()?;
        searcher.refresh()?;
        Ok(stats)
    }
}

fn read_documents(dir: &Path, template: bool, stats: &mut IndexStats) -> SosResult<Vec<FieldDocument>> {
    let mut paths = Vec::new();
    for entry in walkdir::WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                warn!(path = %path, error = %e, "Unreadable directory entry, skipping");
                stats.skipped += 1;
                continue;
            }
        };
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable observation file, skipping");
                stats.skipped += 1;
                continue;
            }
        };

        let value: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            SosError::IndexBuildFailure(format!("{}: {}", path.display(), e))
        })?;

        match serde_json::from_value::<ObservationRecord>(value) {
            Ok(record) => {
                debug!(id = %record.id, kind = record.kind().as_str(), template, "Indexing");
                documents.push(record.to_document(template));
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Not an observation, skipping");
                stats.skipped += 1;
            }
        }
    }
    Ok(documents)
}
