//! Format 2 Document Model
//!
//! Typed views over the author-facing workflow dialect.
//!
//! # Example YAML Format
//!
//! ```yaml
//! class: GalaxyWorkflow
//! inputs:
//!   reads: data
//! outputs:
//!   merged:
//!     outputSource: cat/out_file1
//! steps:
//!   cat:
//!     tool_id: cat1
//!     in:
//!       input1: reads
//!     out:
//!       out_file1:
//!         rename: merged.txt
//! ```

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::error::{ConversionError, Result};
use crate::workflow::Position;

/// Step keys produced by the converter itself; declared values are dropped.
pub const RESERVED_STEP_KEYS: &[&str] = &[
    "name",
    "inputs",
    "input_connections",
    "post_job_actions",
    "workflow_outputs",
    "subworkflow",
    "content_id",
];

/// `doc` may be a single string or a list of lines.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Doc {
    Text(String),
    Lines(Vec<String>),
}

impl Doc {
    pub fn into_text(self) -> String {
        match self {
            Doc::Text(text) => text,
            Doc::Lines(lines) => lines.join("\n"),
        }
    }
}

/// Picks the annotation from `doc` first, then `annotation`.
pub fn annotation_of(doc: Option<Doc>, annotation: Option<String>) -> String {
    doc.map(Doc::into_text)
        .or(annotation)
        .unwrap_or_default()
}

/// Accepts strings, numbers and booleans where a string is expected.
fn optional_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(de::Error::custom("Expected a string")),
    }
}

/// Top-level Format 2 workflow.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub class: Option<String>,

    #[serde(default, deserialize_with = "optional_string")]
    pub label: Option<String>,

    #[serde(default, deserialize_with = "optional_string")]
    pub name: Option<String>,

    #[serde(default)]
    pub doc: Option<Doc>,

    #[serde(default)]
    pub annotation: Option<String>,

    #[serde(default)]
    pub uuid: Option<String>,

    /// `$graph` entry id, not emitted
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default)]
    pub inputs: Option<Value>,

    #[serde(default)]
    pub outputs: Option<Value>,

    #[serde(default)]
    pub steps: Option<Value>,

    /// report, creator, license, release, tags, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One step as declared by the author (inputs are normalized into this shape too).
#[derive(Deserialize, Debug, Clone, Default)]
pub struct StepDefinition {
    /// String ids are label aliases; numeric ids are ignored in favour of position
    #[serde(default)]
    pub id: Option<Value>,

    #[serde(default, deserialize_with = "optional_string")]
    pub label: Option<String>,

    #[serde(default, rename = "type")]
    pub step_type: Option<String>,

    #[serde(default)]
    pub run: Option<Value>,

    #[serde(default, deserialize_with = "optional_string")]
    pub tool_id: Option<String>,

    #[serde(default, deserialize_with = "optional_string")]
    pub tool_version: Option<String>,

    #[serde(default)]
    pub doc: Option<Doc>,

    #[serde(default)]
    pub annotation: Option<String>,

    #[serde(default)]
    pub position: Option<Position>,

    #[serde(default)]
    pub state: Option<Map<String, Value>>,

    /// Native tool state, used verbatim when no `state` is given
    #[serde(default)]
    pub tool_state: Option<Map<String, Value>>,

    #[serde(default)]
    pub runtime_inputs: Vec<String>,

    #[serde(default, rename = "in")]
    pub step_in: Option<Map<String, Value>>,

    #[serde(default)]
    pub connect: Option<Map<String, Value>>,

    #[serde(default)]
    pub out: Option<Value>,

    /// Pre-`out` spelling of output directives
    #[serde(default)]
    pub outputs: Option<Value>,

    #[serde(default)]
    pub collection_type: Option<Value>,

    #[serde(default)]
    pub parameter_type: Option<Value>,

    #[serde(default)]
    pub optional: Option<Value>,

    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub format: Option<Value>,

    #[serde(default)]
    pub restrictions: Option<Value>,

    #[serde(default, rename = "restrictOnConnections")]
    pub restrict_on_connections: Option<Value>,

    #[serde(default)]
    pub suggestions: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StepDefinition {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Returns the string form of `id` when it is used as a label alias.
    pub fn id_alias(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        }
    }

    /// Input step attributes copied into tool state, in emission order.
    pub fn input_state_attributes(&self) -> Vec<(&'static str, &Value)> {
        [
            ("collection_type", &self.collection_type),
            ("parameter_type", &self.parameter_type),
            ("optional", &self.optional),
            ("default", &self.default),
            ("format", &self.format),
            ("restrictions", &self.restrictions),
            ("restrictOnConnections", &self.restrict_on_connections),
            ("suggestions", &self.suggestions),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
        .collect()
    }
}

/// Normalizes a list-or-mapping section into a list of mappings.
///
/// Mapping keys are written into `key_field` of their value. Scalar values are
/// shorthand for `{type: <value>}`. A value that already names itself through
/// `label` or `id` is ambiguous.
pub fn keyed_entries(section: Option<Value>, key_field: &str, kind: &'static str) -> Result<Vec<Value>> {
    match section {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(entries)) => Ok(entries),
        Some(Value::Object(map)) => {
            let mut entries = Vec::with_capacity(map.len());
            for (key, value) in map {
                let mut entry = match value {
                    Value::Object(entry) => entry,
                    Value::Null => Map::new(),
                    other => {
                        let mut entry = Map::new();
                        entry.insert("type".to_string(), other);
                        entry
                    }
                };
                if let Some(declared) = entry.get("label").or_else(|| entry.get("id")) {
                    return Err(ConversionError::AliasAmbiguity {
                        kind,
                        label: key,
                        id: scalar_text(declared),
                    });
                }
                entry.insert(key_field.to_string(), Value::String(key));
                entries.push(Value::Object(entry));
            }
            Ok(entries)
        }
        Some(other) => Err(ConversionError::InvalidDocument(format!(
            "{} section must be a list or a mapping, found {}",
            kind, other
        ))),
    }
}

/// Renders a scalar without JSON quoting.
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
