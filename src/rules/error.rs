//! Rule engine errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Rule {rule} references column {column}, but only {width} columns exist")]
    UnknownColumn {
        rule: usize,
        column: usize,
        width: usize,
    },

    #[error("Mapping '{mapping}' references column {column}, but only {width} columns exist")]
    MappingColumn {
        mapping: &'static str,
        column: usize,
        width: usize,
    },

    #[error("Rule {rule}: unknown metadata selector '{value}'")]
    UnknownMetadata { rule: usize, value: String },

    #[error("Rule {rule}: element '{identifier}' has no {selector}")]
    MissingMetadata {
        rule: usize,
        identifier: String,
        selector: String,
    },

    #[error("Rule {rule}: no sample sheet row for element '{identifier}'")]
    MissingSampleSheetRow { rule: usize, identifier: String },

    #[error("Rule {rule}: sample sheet row for '{identifier}' has no column {index}")]
    SampleSheetColumn {
        rule: usize,
        identifier: String,
        index: usize,
    },

    #[error("Rule {rule}: invalid regular expression: {source}")]
    InvalidRegex {
        rule: usize,
        #[source]
        source: regex::Error,
    },

    #[error("Rule {rule}: expression did not match '{value}'")]
    RegexUnmatched { rule: usize, value: String },

    #[error("Rule {rule}: expression has {found} groups, expected {expected}")]
    GroupCount {
        rule: usize,
        expected: usize,
        found: usize,
    },

    #[error("Rule {rule}: '{value}' is not a number")]
    InvalidNumber { rule: usize, value: String },

    #[error("Rule {rule}: row number does not fit in a 64-bit integer")]
    RownumOverflow { rule: usize },

    #[error("Rule {rule}: split column lists must have the same length")]
    UnevenSplit { rule: usize },

    #[error("Source element '{identifier}' is nested {found} levels deep, source type '{source_type}' has {expected}")]
    SourceDepth {
        identifier: String,
        source_type: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown source collection type '{0}'")]
    InvalidSourceType(String),

    #[error("Mapping '{0}' may only be declared once")]
    DuplicateMapping(&'static str),

    #[error("paired_identifier and paired_or_unpaired_identifier cannot both be mapped")]
    ConflictingPairing,

    #[error("Mapping must define list_identifiers or a pairing identifier")]
    NoIdentifierMapping,

    #[error("Mapping '{mapping}' takes exactly one column, found {found}")]
    PairingColumns { mapping: &'static str, found: usize },

    #[error("Duplicate element identifier '{path}' produced by source elements '{first}' and '{second}'")]
    DuplicateIdentifier {
        path: String,
        first: String,
        second: String,
    },

    #[error("Element '{path}': '{role}' is not a paired role (expected forward or reverse)")]
    InvalidPairRole { path: String, role: String },

    #[error("Element '{path}': paired collections need exactly forward and reverse, found [{roles}]")]
    IncompletePair { path: String, roles: String },

    #[error("Rule document has no test_data to run against")]
    MissingTestData,

    #[error("Failed to read rule document '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Malformed rule definition: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
