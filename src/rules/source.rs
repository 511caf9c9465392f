//! Source collections fed to the rule engine.
//!
//! A source is a tree of elements; rules see one record per leaf dataset,
//! carrying the identifier and index at every nesting level.

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Result, RuleError};

const KNOWN_LEVELS: &[&str] = &[
    "list",
    "paired",
    "paired_or_unpaired",
    "sample_sheet",
    "record",
];

/// One element of a source collection, either a dataset or a nested collection.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct SourceElement {
    pub identifier: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hid: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<SourceElement>,
}

impl SourceElement {
    pub fn is_collection(&self) -> bool {
        !self.elements.is_empty() || self.class.as_deref() == Some("Collection")
    }
}

/// The dataset behind a leaf element.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDataset {
    pub hid: u64,
    pub contents: Option<Value>,
}

/// A flattened leaf: identifiers and indices from the outermost level down.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub identifiers: Vec<String>,
    pub indices: Vec<usize>,
    pub tags: Vec<String>,
    pub dataset: SourceDataset,
}

impl SourceRecord {
    /// Slash-joined identifier path, used in error messages.
    pub fn display_path(&self) -> String {
        self.identifiers.join("/")
    }
}

/// Number of levels in a collection type such as `list:paired`.
pub fn collection_depth(collection_type: &str) -> Result<usize> {
    let levels: Vec<&str> = collection_type.split(':').collect();
    if levels.iter().any(|level| !KNOWN_LEVELS.contains(level)) {
        return Err(RuleError::InvalidSourceType(collection_type.to_string()));
    }
    Ok(levels.len())
}

/// Flattens a source collection depth-first into one record per dataset.
///
/// Datasets without an explicit hid are numbered 1, 2, ... in flattening order.
pub fn flatten_source(source_type: &str, elements: &[SourceElement]) -> Result<Vec<SourceRecord>> {
    let depth = collection_depth(source_type)?;
    let mut records = Vec::new();
    let mut identifiers = Vec::with_capacity(depth);
    let mut indices = Vec::with_capacity(depth);

    for (index, element) in elements.iter().enumerate() {
        flatten_element(
            source_type,
            depth,
            element,
            index,
            &mut identifiers,
            &mut indices,
            &mut records,
        )?;
    }

    debug!(
        "Flattened '{}' source into {} records",
        source_type,
        records.len()
    );
    Ok(records)
}

fn flatten_element(
    source_type: &str,
    depth: usize,
    element: &SourceElement,
    index: usize,
    identifiers: &mut Vec<String>,
    indices: &mut Vec<usize>,
    records: &mut Vec<SourceRecord>,
) -> Result<()> {
    identifiers.push(element.identifier.clone());
    indices.push(index);

    if element.is_collection() {
        if identifiers.len() >= depth {
            return Err(depth_error(source_type, depth, identifiers, element));
        }
        for (child_index, child) in element.elements.iter().enumerate() {
            flatten_element(
                source_type,
                depth,
                child,
                child_index,
                identifiers,
                indices,
                records,
            )?;
        }
    } else {
        if identifiers.len() != depth {
            return Err(depth_error(source_type, depth, identifiers, element));
        }
        let hid = element.hid.unwrap_or(records.len() as u64 + 1);
        records.push(SourceRecord {
            identifiers: identifiers.clone(),
            indices: indices.clone(),
            tags: element.tags.clone(),
            dataset: SourceDataset {
                hid,
                contents: element.contents.clone(),
            },
        });
    }

    identifiers.pop();
    indices.pop();
    Ok(())
}

fn depth_error(
    source_type: &str,
    expected: usize,
    identifiers: &[String],
    element: &SourceElement,
) -> RuleError {
    let found = if element.is_collection() {
        identifiers.len() + 1
    } else {
        identifiers.len()
    };
    RuleError::SourceDepth {
        identifier: identifiers.join("/"),
        source_type: source_type.to_string(),
        expected,
        found,
    }
}
