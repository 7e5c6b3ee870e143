//! Input records.
//!
//! A record's identity is its zero-based position in the batch. The index
//! drives every artifact name and, through those names, the final
//! concatenation order.

use std::path::Path;

use reel_common::error::{ReelError, ReelResult};
use serde::{Deserialize, Serialize};

/// One comment to be narrated and recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Comment author.
    #[serde(default = "default_author")]
    pub author: String,

    /// Vote count.
    #[serde(default)]
    pub votes: i64,

    /// Comment body; this is the narrated text.
    pub comment: String,

    /// Any other fields from the upstream producer, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_author() -> String {
    "Unknown Author".to_string()
}

impl Record {
    pub fn new(author: impl Into<String>, votes: i64, comment: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            votes,
            comment: comment.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// An ordered, read-only batch of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Load a JSON array of records.
    pub fn load(path: &Path) -> ReelResult<Self> {
        if !path.is_file() {
            return Err(ReelError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let batch = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), records = batch.len(), "Loaded records");
        Ok(batch)
    }

    pub fn from_json(json: &str) -> ReelResult<Self> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Records paired with their batch index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.records.iter().enumerate()
    }

    /// All record indices, in order.
    pub fn indices(&self) -> std::ops::Range<usize> {
        0..self.records.len()
    }
}
