//! Locates account trees inside loosely structured documents and turns them into
//! period-tagged leaf records.
//!
//! A document is any JSON value. Account-tree sections are objects carrying a
//! `descricao` (or `label`) field. They are looked up, in order:
//!
//! 1. the document itself, when it is a node or an array of nodes;
//! 2. under the container keys `data`, `content`, `payload`, `balancete` and `document`;
//! 3. among the top-level values of the document.
//!
//! The period comes from `metadata.periodo` / `metadata.period` /
//! `metadata.periodo_referencia` (a `dd/mm/yyyy - dd/mm/yyyy` range or a `YYYY-MM`
//! value), falling back to a `YYYY-MM` fragment in the document identifier.

use crate::error::{AnalyticsError, Result};
use crate::flatten::{AccountTreeFlattener, LeafRecord};
use crate::period::{derive_period, Period};
use crate::tree::{AccountTree, SkippedNode, DEFAULT_MAX_DEPTH};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

pub const SECTION_CONTAINER_KEYS: [&str; 5] = ["data", "content", "payload", "balancete", "document"];

pub const PERIOD_METADATA_KEYS: [&str; 3] = ["periodo", "period", "periodo_referencia"];

fn is_section(value: &Value) -> bool {
    value
        .as_object()
        .map(|map| map.contains_key("descricao") || map.contains_key("label"))
        .unwrap_or(false)
}

/// Account-tree sections of a document, in discovery order.
pub fn find_sections(document: &Value) -> Vec<&Value> {
    if let Value::Array(items) = document {
        return items.iter().filter(|v| is_section(v)).collect();
    }
    if is_section(document) {
        return vec![document];
    }

    let mut sections = Vec::new();
    for key in SECTION_CONTAINER_KEYS {
        let Some(container) = document.get(key).filter(|v| v.is_object()) else {
            continue;
        };
        if let Some(map) = container.as_object() {
            sections.extend(map.values().filter(|v| is_section(v)));
        }
        if is_section(container) {
            sections.push(container);
        }
    }

    if sections.is_empty() {
        if let Some(map) = document.as_object() {
            sections.extend(map.values().filter(|v| is_section(v)));
        }
    }
    sections
}

/// Reporting period of a document from its metadata, else from its identifier.
pub fn document_period(document: &Value, identifier: &str) -> Option<Period> {
    let metadata_value = document.get("metadata").and_then(|metadata| {
        PERIOD_METADATA_KEYS
            .iter()
            .find_map(|key| {
                metadata
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
            })
    });

    derive_period(metadata_value, Some(identifier))
}

/// Leaves of one document, tagged with its period and identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedDocument {
    pub identifier: String,
    pub period: Period,
    pub records: Vec<LeafRecord>,
    pub skipped: Vec<SkippedNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionFailure {
    pub document: String,
    pub error: String,
}

/// Outcome of a batch: documents that were read and documents that were not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchIngestion {
    pub documents: Vec<IngestedDocument>,
    pub failures: Vec<IngestionFailure>,
}

impl BatchIngestion {
    /// All leaf records, documents in batch order.
    pub fn records(&self) -> Vec<LeafRecord> {
        self.documents
            .iter()
            .flat_map(|doc| doc.records.iter().cloned())
            .collect()
    }

    fn push(&mut self, identifier: &str, outcome: Result<IngestedDocument>) {
        match outcome {
            Ok(document) => self.documents.push(document),
            Err(e) => {
                warn!("Skipping document {}: {}", identifier, e);
                self.failures.push(IngestionFailure {
                    document: identifier.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }
}

pub struct DocumentIngestor {
    max_depth: usize,
    flattener: AccountTreeFlattener,
}

impl Default for DocumentIngestor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl DocumentIngestor {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            flattener: AccountTreeFlattener::new(max_depth),
        }
    }

    /// Flattens every section of `document`. A document without a period or without
    /// any account-tree section is an error.
    pub fn ingest_value(&self, document: &Value, identifier: &str) -> Result<IngestedDocument> {
        let period = document_period(document, identifier).ok_or_else(|| AnalyticsError::DocumentError {
            document: identifier.to_string(),
            details: "no reporting period in metadata or identifier".to_string(),
        })?;

        let sections = find_sections(document);
        if sections.is_empty() {
            return Err(AnalyticsError::DocumentError {
                document: identifier.to_string(),
                details: "no account-tree section found".to_string(),
            });
        }

        let mut records = Vec::new();
        let mut skipped = Vec::new();
        for section in sections {
            let tree = AccountTree::from_value_with_depth(section, self.max_depth);
            records.extend(self.flattener.flatten_tree(&tree, period));
            skipped.extend(tree.skipped().iter().cloned());
        }
        for record in &mut records {
            record.source = Some(identifier.to_string());
        }

        debug!(
            "Document {} ({}): {} leaf records, {} skipped nodes",
            identifier,
            period,
            records.len(),
            skipped.len()
        );

        Ok(IngestedDocument {
            identifier: identifier.to_string(),
            period,
            records,
            skipped,
        })
    }

    /// Reads a JSON document from disk. The file name is the identifier.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestedDocument> {
        let identifier = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let content = fs::read_to_string(path).map_err(|e| AnalyticsError::DocumentError {
            document: identifier.clone(),
            details: e.to_string(),
        })?;
        let document: Value = serde_json::from_str(&content).map_err(|e| AnalyticsError::DocumentError {
            document: identifier.clone(),
            details: e.to_string(),
        })?;

        self.ingest_value(&document, &identifier)
    }

    /// Ingests every document, recording failures instead of stopping at the first one.
    pub fn ingest_values(&self, documents: &[(String, Value)]) -> BatchIngestion {
        let mut batch = BatchIngestion::default();
        for (identifier, document) in documents {
            batch.push(identifier, self.ingest_value(document, identifier));
        }
        self.log_batch(&batch);
        batch
    }

    pub fn ingest_files<P: AsRef<Path>>(&self, paths: &[P]) -> BatchIngestion {
        let mut batch = BatchIngestion::default();
        for path in paths {
            let path = path.as_ref();
            batch.push(&path.display().to_string(), self.ingest_file(path));
        }
        self.log_batch(&batch);
        batch
    }

    fn log_batch(&self, batch: &BatchIngestion) {
        info!(
            "Ingested {} documents ({} failed), {} leaf records",
            batch.documents.len(),
            batch.failures.len(),
            batch.documents.iter().map(|d| d.records.len()).sum::<usize>()
        );
    }
}
