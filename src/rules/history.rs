//! Dataset copies for rebuilt collections.
//!
//! Rebuilt collections never share datasets with their source; every leaf is
//! copied into the history and receives a fresh hid.

use log::debug;
use serde::Serialize;
use serde_json::Value;

use super::source::{SourceDataset, SourceRecord};

/// A dataset copied into the history for a rebuilt collection.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RebuiltDataset {
    pub hid: u64,
    pub source_hid: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<Value>,
    pub tags: Vec<String>,
}

/// Receives the datasets of a rebuilt collection.
pub trait DatasetSink {
    fn copy_dataset(&mut self, source: &SourceDataset, tags: Vec<String>) -> RebuiltDataset;
}

/// Numbers copies sequentially, like a history appending new items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCopier {
    next_hid: u64,
    copied: usize,
}

impl HistoryCopier {
    pub fn new(next_hid: u64) -> Self {
        Self {
            next_hid,
            copied: 0,
        }
    }

    /// Starts numbering after the source datasets and the source collection.
    pub fn after_sources(records: &[SourceRecord]) -> Self {
        let last_source = records
            .iter()
            .map(|record| record.dataset.hid)
            .max()
            .unwrap_or(0);
        Self::new(last_source + 2)
    }

    pub fn next_hid(&self) -> u64 {
        self.next_hid
    }

    pub fn copied(&self) -> usize {
        self.copied
    }
}

impl DatasetSink for HistoryCopier {
    fn copy_dataset(&mut self, source: &SourceDataset, tags: Vec<String>) -> RebuiltDataset {
        let hid = self.next_hid;
        self.next_hid += 1;
        self.copied += 1;
        debug!("Copied dataset {} as hid {}", source.hid, hid);
        RebuiltDataset {
            hid,
            source_hid: source.hid,
            contents: source.contents.clone(),
            tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hid: u64) -> SourceRecord {
        SourceRecord {
            identifiers: vec![format!("i{}", hid)],
            indices: vec![0],
            tags: Vec::new(),
            dataset: SourceDataset {
                hid,
                contents: None,
            },
        }
    }

    #[test]
    fn test_numbering_after_sources() {
        let records = vec![record(1), record(2)];
        let mut copier = HistoryCopier::after_sources(&records);
        assert_eq!(copier.next_hid(), 4);

        let copy = copier.copy_dataset(&records[1].dataset, vec!["name:x".to_string()]);
        assert_eq!(copy.hid, 4);
        assert_eq!(copy.source_hid, 2);
        assert_eq!(copy.tags, vec!["name:x"]);
        assert_eq!(copier.next_hid(), 5);
        assert_eq!(copier.copied(), 1);
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(HistoryCopier::after_sources(&[]).next_hid(), 2);
    }
}
