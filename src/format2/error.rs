//! Conversion errors.
//!
//! Every failure is fatal and carries enough context (step, label, reference
//! text or path) for the author to locate the problem in the document.

use std::path::PathBuf;

use thiserror::Error;

use crate::workflow::ValidationError;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Not a valid Galaxy workflow definition: document must define a class")]
    MissingClass,

    #[error("Not a valid Galaxy workflow definition: class must be 'GalaxyWorkflow', found '{0}'")]
    WrongClass(String),

    #[error("Invalid workflow document: {0}")]
    InvalidDocument(String),

    #[error("{step}: steps specified with a run action cannot also declare a type")]
    TypeAndRun { step: String },

    #[error("{step}: unknown step type '{step_type}'")]
    UnknownStepType { step: String, step_type: String },

    #[error("{step}: unsupported run class '{class}'")]
    UnknownRunClass { step: String, class: String },

    #[error("{step}: tool steps must define a tool_id")]
    MissingToolId { step: String },

    #[error("label and id are aliases for {kind}s, may only define one (found label '{label}' and id '{id}')")]
    AliasAmbiguity {
        kind: &'static str,
        label: String,
        id: String,
    },

    #[error("{kind} {index} must define a label")]
    MissingLabel { kind: &'static str, index: usize },

    #[error("Input '{label}': input type '{input_type}' not supported")]
    UnsupportedInputType { label: String, input_type: String },

    #[error("Label '{label}' is used by both step {first} and step {second}")]
    DuplicateLabel {
        label: String,
        first: usize,
        second: usize,
    },

    #[error("Reference '{reference}' does not name a step in this workflow")]
    UnresolvedReference { reference: String },

    #[error("Reference '{reference}' must have the form 'step' or 'step/output'")]
    MalformedReference { reference: String },

    #[error("Run reference '#{0}' does not match any $graph entry")]
    UnknownGraphId(String),

    #[error("$graph document must contain a workflow with id 'main'")]
    MissingMainGraph,

    #[error("Subworkflow reference cycle: {chain}")]
    CyclicReference { chain: String },

    #[error("@import must be the only key of a run action")]
    ImportWithSiblings,

    #[error("Failed to read imported file '{path}': {source}")]
    Import {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read workflow file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Malformed workflow element: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{step} input '{input}' must define either source or default")]
    InvalidStepInput { step: String, input: String },

    #[error("{step} connection '{input}' must be a step reference string, found {found}")]
    InvalidConnection {
        step: String,
        input: String,
        found: String,
    },

    #[error("Workflow output {index} must be a mapping")]
    InvalidOutput { index: usize },

    #[error("Workflow output {index} must specify outputSource")]
    MissingOutputSource { index: usize },

    #[error("Tool catalog could not import {step}: {message}")]
    Catalog { step: String, message: String },

    #[error("Lowered workflow is invalid: {0}")]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, ConversionError>;
