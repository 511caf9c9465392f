//! Rule-based collection rebuilding.
//!
//! A source collection is flattened into one row per dataset, rules derive
//! and filter columns, and a mapping turns chosen columns into the identifier
//! structure of a new collection whose datasets are fresh history copies.

pub mod apply;
pub mod assemble;
pub mod definition;
pub mod document;
pub mod error;
pub mod history;
pub mod mapping;
pub mod source;

#[cfg(test)]
mod fixtures;

pub use apply::{apply_rules, ColumnTable, RuleInputs, SampleSheet};
pub use assemble::{
    assemble, decide_pairing, ElementObject, ElementType, PairRole, PairingDecision,
    RebuiltCollection, RebuiltElement,
};
pub use definition::{CompareType, MappingEntry, Rule, RuleSet, SubstrType};
pub use document::{rebuild_collection, rebuild_with_sink, RuleDocument, TestData};
pub use error::{Result, RuleError};
pub use history::{DatasetSink, HistoryCopier, RebuiltDataset};
pub use mapping::{map_rows, IdentifierMapping, MappedElement, PairingMode};
pub use source::{flatten_source, SourceDataset, SourceElement, SourceRecord};
