//! Tantivy storage for observation documents.
//!
//! Every flat field is indexed untokenized and stored (`STRING | STORED`), so
//! term and range clauses match whole values. The feature-of-interest
//! envelope is stored as four `f64` values and only read back for the
//! spatial post-filter.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tantivy::directory::MmapDirectory;
use tantivy::schema::{Field, Schema, Value, STORED, STRING};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use tracing::{debug, info};

use sos_common::{BoundingBox, SosError, SosResult};

use crate::document::{fields, FieldDocument};

/// Indexed string fields, in schema order.
pub const STRING_FIELDS: [&str; 9] = [
    fields::ID,
    fields::TYPE,
    fields::PROCEDURE,
    fields::OBSERVED_PROPERTY,
    fields::FEATURE_OF_INTEREST,
    fields::SAMPLING_TIME_BEGIN,
    fields::SAMPLING_TIME_END,
    fields::TEMPLATE,
    fields::METAFILE,
];

const ENVELOPE_FIELDS: [&str; 4] = ["envelope_min_x", "envelope_min_y", "envelope_max_x", "envelope_max_y"];

/// Writer heap; the index holds small flat documents.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Build the observation schema.
pub fn observation_schema() -> Schema {
    let mut builder = Schema::builder();
    for name in STRING_FIELDS {
        builder.add_text_field(name, STRING | STORED);
    }
    for name in ENVELOPE_FIELDS {
        builder.add_f64_field(name, STORED);
    }
    builder.build()
}

/// Field handles resolved against an index schema.
#[derive(Debug, Clone)]
pub struct IndexFields {
    by_name: HashMap<&'static str, Field>,
    envelope: [Field; 4],
}

impl IndexFields {
    /// Resolve every field; an index built with another schema is rejected.
    pub fn from_schema(schema: &Schema) -> SosResult<Self> {
        let lookup = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| SosError::IndexRead(format!("index schema lacks field '{}'", name)))
        };
        let mut by_name = HashMap::with_capacity(STRING_FIELDS.len());
        for name in STRING_FIELDS {
            by_name.insert(name, lookup(name)?);
        }
        let envelope = [
            lookup(ENVELOPE_FIELDS[0])?,
            lookup(ENVELOPE_FIELDS[1])?,
            lookup(ENVELOPE_FIELDS[2])?,
            lookup(ENVELOPE_FIELDS[3])?,
        ];
        Ok(Self { by_name, envelope })
    }

    /// Handle of an indexed string field.
    pub fn get(&self, name: &str) -> Option<Field> {
        self.by_name.get(name).copied()
    }

    /// Like [`IndexFields::get`], failing on names outside the schema.
    pub fn require(&self, name: &str) -> SosResult<Field> {
        self.get(name)
            .ok_or_else(|| SosError::InvalidQuery(format!("unknown field '{}'", name)))
    }

    pub fn to_tantivy(&self, document: &FieldDocument) -> TantivyDocument {
        let mut doc = TantivyDocument::default();
        for (name, value) in document.fields() {
            if let Some(field) = self.get(name) {
                doc.add_text(field, value);
            }
        }
        if let Some(envelope) = document.envelope() {
            let corners = [envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y];
            for (field, value) in self.envelope.iter().zip(corners) {
                doc.add_f64(*field, value);
            }
        }
        doc
    }

    pub fn from_tantivy(&self, doc: &TantivyDocument) -> SosResult<FieldDocument> {
        let mut document = FieldDocument::empty();
        for (name, field) in &self.by_name {
            if let Some(value) = doc.get_first(*field).and_then(|v| v.as_str()) {
                document = document.with_field(name, value);
            }
        }
        if let Some(envelope) = self.envelope_of(doc) {
            document = document.with_envelope(envelope);
        }
        document.validate()?;
        Ok(document)
    }

    /// Stored envelope, when all four corners are present.
    pub fn envelope_of(&self, doc: &TantivyDocument) -> Option<BoundingBox> {
        let corner = |field: Field| doc.get_first(field).and_then(|v| v.as_f64());
        Some(BoundingBox::new(
            corner(self.envelope[0])?,
            corner(self.envelope[1])?,
            corner(self.envelope[2])?,
            corner(self.envelope[3])?,
        ))
    }
}

/// An observation index, on disk or in memory.
#[derive(Clone)]
pub struct ObservationIndex {
    index: Index,
    fields: IndexFields,
}

impl ObservationIndex {
    /// Open the index stored in `dir`.
    pub fn open(dir: &Path) -> SosResult<Self> {
        let index = Index::open_in_dir(dir)
            .map_err(|e| SosError::IndexRead(format!("cannot open {}: {}", dir.display(), e)))?;
        let fields = IndexFields::from_schema(&index.schema())?;
        debug!(path = %dir.display(), "Opened observation index");
        Ok(Self { index, fields })
    }

    /// Open the index in `dir`, creating the directory and an empty index if needed.
    pub fn open_or_create(dir: &Path) -> SosResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            SosError::IndexBuildFailure(format!("cannot create {}: {}", dir.display(), e))
        })?;
        let directory = MmapDirectory::open(dir).map_err(|e| {
            SosError::IndexBuildFailure(format!("cannot open {}: {}", dir.display(), e))
        })?;
        let index = Index::open_or_create(directory, observation_schema()).map_err(|e| {
            SosError::IndexBuildFailure(format!("cannot open index in {}: {}", dir.display(), e))
        })?;
        let fields = IndexFields::from_schema(&index.schema())?;
        Ok(Self { index, fields })
    }

    /// In-memory index holding `documents`.
    pub fn in_memory(documents: &[FieldDocument]) -> SosResult<Self> {
        let index = Index::create_in_ram(observation_schema());
        let fields = IndexFields::from_schema(&index.schema())?;
        let this = Self { index, fields };
        this.writer()?.replace_all(documents)?;
        Ok(this)
    }

    pub fn fields(&self) -> &IndexFields {
        &self.fields
    }

    /// Reader that only sees new commits after an explicit reload.
    pub fn reader(&self) -> SosResult<IndexReader> {
        self.index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: TantivyError| SosError::IndexRead(format!("cannot open reader: {}", e)))
    }

    /// Take the index write lock. A second writer fails instead of waiting.
    pub fn writer(&self) -> SosResult<ObservationWriter> {
        let writer: IndexWriter = self
            .index
            .writer_with_num_threads(1, WRITER_HEAP_BYTES)
            .map_err(|e| SosError::IndexBuildFailure(format!("cannot lock index: {}", e)))?;
        Ok(ObservationWriter {
            writer,
            fields: self.fields.clone(),
        })
    }
}

/// Holds the index write lock until dropped or committed.
pub struct ObservationWriter {
    writer: IndexWriter,
    fields: IndexFields,
}

impl ObservationWriter {
    /// Replace every indexed document with `documents` in one commit.
    pub fn replace_all(mut self, documents: &[FieldDocument]) -> SosResult<()> {
        let failure = |e: TantivyError| SosError::IndexBuildFailure(e.to_string());
        self.writer.delete_all_documents().map_err(failure)?;
        for document in documents {
            self.writer
                .add_document(self.fields.to_tantivy(document))
                .map_err(failure)?;
        }
        self.writer.commit().map_err(failure)?;
        self.writer.wait_merging_threads().map_err(failure)?;
        info!(documents = documents.len(), "Committed observation index");
        Ok(())
    }
}
