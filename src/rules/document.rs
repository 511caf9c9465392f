//! Rule Documents
//!
//! A rule document pairs a rule set with the source collection it runs
//! against, so a rebuild can be reproduced from one file.
//!
//! # Example YAML Format
//!
//! ```yaml
//! rules:
//!   rules:
//!     - type: add_column_metadata
//!       value: identifier0
//!   mapping:
//!     - type: list_identifiers
//!       columns: [0]
//! test_data:
//!   type: list
//!   elements:
//!     - identifier: i1
//!       class: File
//!       contents: "0"
//! ```

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::Deserialize;

use super::apply::{apply_rules, RuleInputs, SampleSheet};
use super::assemble::{assemble, RebuiltCollection};
use super::definition::RuleSet;
use super::error::{Result, RuleError};
use super::history::{DatasetSink, HistoryCopier};
use super::mapping::{map_rows, IdentifierMapping};
use super::source::{flatten_source, SourceElement, SourceRecord};

/// The source collection a rule set is applied to.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct TestData {
    /// Source collection type, e.g. `list:paired`
    #[serde(rename = "type")]
    pub source_type: String,

    #[serde(default)]
    pub elements: Vec<SourceElement>,

    /// Sample sheet rows keyed by element identifier
    #[serde(default)]
    pub rows: Option<SampleSheet>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RuleDocument {
    pub rules: RuleSet,

    #[serde(default)]
    pub test_data: Option<TestData>,
}

impl RuleDocument {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading rule document from: {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Rebuilds the document's source collection with its rules.
    pub fn run(&self) -> Result<RebuiltCollection> {
        let test_data = self.test_data.as_ref().ok_or(RuleError::MissingTestData)?;
        rebuild_collection(
            &self.rules,
            &test_data.source_type,
            &test_data.elements,
            test_data.rows.as_ref(),
        )
    }
}

/// Rebuilds a source collection, copying datasets into a fresh history numbering.
pub fn rebuild_collection(
    rules: &RuleSet,
    source_type: &str,
    elements: &[SourceElement],
    sample_sheet: Option<&SampleSheet>,
) -> Result<RebuiltCollection> {
    let records = flatten_source(source_type, elements)?;
    let mut copier = HistoryCopier::after_sources(&records);
    debug!("Copies are numbered from hid {}", copier.next_hid());
    let collection = rebuild_with_sink(rules, &records, sample_sheet, &mut copier)?;
    debug!("{} datasets copied into the history", copier.copied());
    Ok(collection)
}

/// Runs rules, mapping and assembly over already flattened records.
pub fn rebuild_with_sink(
    rules: &RuleSet,
    records: &[SourceRecord],
    sample_sheet: Option<&SampleSheet>,
    sink: &mut dyn DatasetSink,
) -> Result<RebuiltCollection> {
    info!(
        "Applying {} rules to {} source datasets",
        rules.rules.len(),
        records.len()
    );
    let table = apply_rules(
        &rules.rules,
        &RuleInputs {
            records,
            sample_sheet,
        },
    )?;

    let mapping = IdentifierMapping::from_entries(&rules.mapping, table.width())?;
    let elements = map_rows(&table, &mapping);
    debug!("{} rows survive filtering", elements.len());

    let collection = assemble(&mapping, &elements, records, sink)?;
    info!(
        "Rebuilt '{}' collection with {} elements",
        collection.collection_type,
        collection.element_count()
    );
    Ok(collection)
}
