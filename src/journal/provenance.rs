//! Provenance of the sources a journal was read from.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata captured for one read of one source. Fields never change after
/// creation; re-reading a source appends a new record instead.
///
/// Field order is the persisted snapshot layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvenanceRecord {
    source_path: Option<PathBuf>,
    byte_size: u64,
    modified_at: Option<DateTime<Utc>>,
    from_stream: bool,
}

impl ProvenanceRecord {
    /// Captures size and modification time of the file at `path`.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let modified_at = metadata.modified().ok().map(DateTime::<Utc>::from);
        Ok(Self {
            source_path: Some(path.to_path_buf()),
            byte_size: metadata.len(),
            modified_at,
            from_stream: false,
        })
    }

    /// Record for content that has no file identity, e.g. piped input.
    pub fn from_stream(byte_size: u64) -> Self {
        Self {
            source_path: None,
            byte_size,
            modified_at: None,
            from_stream: true,
        }
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        self.modified_at
    }

    pub fn is_from_stream(&self) -> bool {
        self.from_stream
    }

    /// Whether the backing file changed size or timestamp since this read,
    /// or disappeared. Stream records are never stale.
    pub fn is_stale(&self) -> bool {
        let Some(path) = self.source_path.as_deref() else {
            return false;
        };
        match Self::from_path(path) {
            Ok(current) => {
                current.byte_size != self.byte_size || current.modified_at != self.modified_at
            }
            Err(_) => true,
        }
    }
}

/// Append-only log of provenance records in read order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct SourceProvenanceLog {
    records: Vec<ProvenanceRecord>,
}

impl SourceProvenanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ProvenanceRecord) {
        self.records.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProvenanceRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Paths whose latest record no longer matches the file on disk.
    pub fn stale_sources(&self) -> Vec<PathBuf> {
        let mut seen: Vec<&Path> = Vec::new();
        let mut stale = Vec::new();
        for record in self.records.iter().rev() {
            let Some(path) = record.source_path() else {
                continue;
            };
            if seen.contains(&path) {
                continue;
            }
            seen.push(path);
            if record.is_stale() {
                stale.push(path.to_path_buf());
            }
        }
        stale.reverse();
        stale
    }
}

impl<'a> IntoIterator for &'a SourceProvenanceLog {
    type Item = &'a ProvenanceRecord;
    type IntoIter = std::slice::Iter<'a, ProvenanceRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
