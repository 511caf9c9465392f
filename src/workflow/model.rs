//! Native Workflow Data Model
//!
//! Fully-resolved step graph consumed by the execution engine. This is the
//! output side of the Format 2 converter.
//!
//! # Example JSON Format
//!
//! ```json
//! {
//!   "a_galaxy_workflow": "true",
//!   "format-version": "0.1",
//!   "name": "Workflow",
//!   "annotation": "",
//!   "uuid": "…",
//!   "steps": {
//!     "0": {
//!       "id": 0,
//!       "type": "data_input",
//!       "label": "reads",
//!       "annotation": "",
//!       "position": {"left": 0, "top": 0},
//!       "inputs": [{"name": "reads", "description": ""}],
//!       "input_connections": {},
//!       "tool_state": "{\"name\": \"reads\"}"
//!     }
//!   }
//! }
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::encoding::encode_json;

/// Kind of a workflow step.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    DataInput,
    DataCollectionInput,
    ParameterInput,
    Tool,
    Pause,
    Subworkflow,
}

impl StepType {
    /// Parses a declared step type, normalizing the short aliases
    /// (`input`, `input_collection`, `parameter`).
    pub fn parse(declared: &str) -> Option<Self> {
        match declared {
            "data_input" | "input" => Some(Self::DataInput),
            "data_collection_input" | "input_collection" => Some(Self::DataCollectionInput),
            "parameter_input" | "parameter" => Some(Self::ParameterInput),
            "tool" => Some(Self::Tool),
            "pause" => Some(Self::Pause),
            "subworkflow" => Some(Self::Subworkflow),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataInput => "data_input",
            Self::DataCollectionInput => "data_collection_input",
            Self::ParameterInput => "parameter_input",
            Self::Tool => "tool",
            Self::Pause => "pause",
            Self::Subworkflow => "subworkflow",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Editor layout hint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Position {
    pub left: Number,
    pub top: Number,
}

impl Position {
    /// Diagonal placement used when a step declares no position.
    pub fn synthesized(index: usize) -> Self {
        let offset = Number::from(10 * index as u64);
        Self {
            left: offset.clone(),
            top: offset,
        }
    }
}

/// A connection from an input slot to another step's output.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRef {
    pub id: usize,
    pub output_name: String,

    /// Inner input step wired by this connection (subworkflow steps only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_subworkflow_step_id: Option<usize>,
}

impl ConnectionRef {
    pub fn new(id: usize, output_name: impl Into<String>) -> Self {
        Self {
            id,
            output_name: output_name.into(),
            input_subworkflow_step_id: None,
        }
    }
}

/// An action applied to a tool output once the job finishes.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PostJobAction {
    pub action_type: String,
    pub output_name: String,
    pub action_arguments: Value,
}

/// A step output promoted to a named workflow output.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WorkflowOutput {
    pub output_name: String,
    pub label: Option<String>,
    pub uuid: Option<String>,
}

/// Declared input slot of an input or pause step.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct StepInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Per-step parameter state.
///
/// Held as an ordered tree while converting and written as a JSON-encoded
/// string, which is the legacy wire format.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolState(Map<String, Value>);

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serializes the state to its wire string.
    pub fn encode(&self) -> serde_json::Result<String> {
        encode_json(&Value::Object(self.0.clone()))
    }
}

impl Serialize for ToolState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.encode().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

/// A fully lowered workflow step.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NativeStep {
    /// Position in declaration order within the enclosing workflow
    pub id: usize,

    #[serde(rename = "type")]
    pub step_type: StepType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub annotation: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,

    /// External subworkflow reference when the body is not inlined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,

    pub position: Position,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<StepInput>,

    pub input_connections: IndexMap<String, Vec<ConnectionRef>>,

    pub tool_state: ToolState,

    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub post_job_actions: IndexMap<String, PostJobAction>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub workflow_outputs: Vec<WorkflowOutput>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subworkflow: Option<Box<NativeWorkflow>>,

    /// Declared keys the converter does not interpret, passed through as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NativeStep {
    /// Creates an empty step of the given type.
    pub fn new(id: usize, step_type: StepType, position: Position) -> Self {
        Self {
            id,
            step_type,
            label: None,
            name: None,
            annotation: String::new(),
            tool_id: None,
            tool_version: None,
            content_id: None,
            position,
            inputs: Vec::new(),
            input_connections: IndexMap::new(),
            tool_state: ToolState::new(),
            post_job_actions: IndexMap::new(),
            workflow_outputs: Vec::new(),
            subworkflow: None,
            extra: Map::new(),
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    pub fn with_annotation(mut self, annotation: impl Into<String>) -> Self {
        self.annotation = annotation.into();
        self
    }

    /// Human readable reference used in log and error messages.
    pub fn describe(&self) -> String {
        describe_step(self.id, self.label.as_deref())
    }

    /// Iterates over every connection of this step.
    pub fn connections(&self) -> impl Iterator<Item = (&str, &ConnectionRef)> {
        self.input_connections
            .iter()
            .flat_map(|(key, refs)| refs.iter().map(move |r| (key.as_str(), r)))
    }
}

/// Formats a step reference as `step 3 ("align")`.
pub fn describe_step(id: usize, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("step {} (\"{}\")", id, label),
        None => format!("step {}", id),
    }
}

/// A fully lowered workflow document.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NativeWorkflow {
    #[serde(rename = "a_galaxy_workflow")]
    pub galaxy_marker: String,

    #[serde(rename = "format-version")]
    pub format_version: String,

    pub name: String,

    pub annotation: String,

    pub uuid: String,

    #[serde(serialize_with = "serialize_steps")]
    pub steps: Vec<NativeStep>,

    /// Top-level keys passed through unchanged (report, creator, license, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Writes steps as the string-keyed mapping (`"0"`, `"1"`, ...) of the wire format.
fn serialize_steps<S: Serializer>(steps: &[NativeStep], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(steps.len()))?;
    for step in steps {
        map.serialize_entry(&step.id.to_string(), step)?;
    }
    map.end()
}

impl NativeWorkflow {
    /// Creates an empty workflow with the given name.
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            galaxy_marker: "true".to_string(),
            format_version: "0.1".to_string(),
            name: name.into(),
            annotation: String::new(),
            uuid: uuid.into(),
            steps: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Gets a step by ID.
    pub fn get_step(&self, id: usize) -> Option<&NativeStep> {
        self.steps.get(id).filter(|s| s.id == id)
    }

    /// Gets a mutable reference to a step by ID.
    pub fn get_step_mut(&mut self, id: usize) -> Option<&mut NativeStep> {
        self.steps.get_mut(id).filter(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Serializes to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes to indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
