//! Format 2 Converter
//!
//! Lowers a Format 2 workflow document into the native step graph in three
//! passes per workflow scope:
//! 1. Indexing: inputs and steps are numbered in declaration order and their
//!    labels registered in the scope
//! 2. Transform: each step is lowered by its type handler (see `transform`)
//! 3. Outputs: workflow outputs are attached to the steps they expose
//!
//! Subworkflows are lowered recursively in child scopes of a shared arena, and
//! the finished graph is validated before it is returned.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::Value;
use uuid::Uuid;

use super::context::{ContextArena, ScopeId};
use super::document::{annotation_of, keyed_entries, StepDefinition, WorkflowDocument};
use super::error::{ConversionError, Result};
use super::inputs::inputs_to_steps;
use super::loader::{load_document, split_graph};
use super::outputs::bind_outputs;
use crate::workflow::{describe_step, validate_workflow, NativeWorkflow, Position};

const WORKFLOW_CLASS: &str = "GalaxyWorkflow";
const DEFAULT_WORKFLOW_NAME: &str = "Workflow";

/// Conversion settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Directory `@import` paths are resolved against
    pub workflow_directory: PathBuf,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            workflow_directory: PathBuf::from("."),
        }
    }
}

impl ConversionOptions {
    pub fn with_workflow_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.workflow_directory = directory.into();
        self
    }
}

/// A tool registered from an embedded `GalaxyTool` description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedTool {
    pub tool_id: String,
    pub tool_version: Option<String>,
    pub tool_hash: Option<String>,
    pub tool_uuid: Option<String>,
}

/// Registers embedded tool descriptions with the host application.
pub trait ToolCatalog {
    fn import_tool(&self, description: &Value) -> std::result::Result<ImportedTool, String>;
}

/// Catalog that refuses every embedded tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoToolCatalog;

impl ToolCatalog for NoToolCatalog {
    fn import_tool(&self, _description: &Value) -> std::result::Result<ImportedTool, String> {
        Err("no tool catalog is configured for embedded GalaxyTool definitions".to_string())
    }
}

/// A step numbered by pass 1, waiting to be transformed.
#[derive(Debug, Clone)]
pub(crate) struct IndexedStep {
    pub id: usize,
    pub label: Option<String>,
    pub position: Position,
    pub definition: StepDefinition,
}

impl IndexedStep {
    pub fn describe(&self) -> String {
        describe_step(self.id, self.label.as_deref())
    }
}

/// Lowers one document, including its subworkflows, into a native workflow.
pub struct Converter<'a> {
    pub(super) options: ConversionOptions,
    pub(super) catalog: &'a dyn ToolCatalog,
    pub(super) arena: ContextArena,
    pub(super) graph_ids: IndexMap<String, Value>,
    /// Import paths and graph ids of the subworkflows being lowered, outermost first
    resolving: Vec<String>,
}

impl<'a> Converter<'a> {
    pub fn new(options: ConversionOptions, catalog: &'a dyn ToolCatalog) -> Self {
        Self {
            options,
            catalog,
            arena: ContextArena::new(),
            graph_ids: IndexMap::new(),
            resolving: Vec::new(),
        }
    }

    /// Converts a parsed document.
    pub fn convert(mut self, document: Value) -> Result<NativeWorkflow> {
        let (main, graph_ids) = split_graph(document)?;
        self.graph_ids = graph_ids;

        let root = self.arena.root();
        let workflow = self.lower_workflow(main, root)?;

        info!("Validating lowered workflow...");
        validate_workflow(&workflow)?;
        info!(
            "Converted workflow '{}' ({} steps, {} scopes)",
            workflow.name,
            workflow.len(),
            self.arena.len()
        );
        Ok(workflow)
    }

    /// Lowers one workflow document within `scope`.
    pub(super) fn lower_workflow(&mut self, document: Value, scope: ScopeId) -> Result<NativeWorkflow> {
        check_class(&document)?;
        let fingerprint = document.to_string();
        let document: WorkflowDocument = serde_json::from_value(document)?;

        let name = document
            .name
            .or(document.label)
            .unwrap_or_else(|| DEFAULT_WORKFLOW_NAME.to_string());
        let uuid = document
            .uuid
            .unwrap_or_else(|| Uuid::new_v5(&Uuid::NAMESPACE_OID, fingerprint.as_bytes()).to_string());
        debug!(
            "Lowering workflow '{}' at scope depth {}",
            name,
            self.arena.depth(scope)
        );

        let mut declarations = inputs_to_steps(document.inputs)?;
        declarations.extend(keyed_entries(document.steps, "label", "step")?);

        let indexed = self.index_steps(scope, declarations)?;
        debug!("Pass 1 complete: {} steps indexed", indexed.len());

        let mut workflow = NativeWorkflow::new(name, uuid);
        workflow.annotation = annotation_of(document.doc, document.annotation);
        workflow.extra = document.extra;
        for step in indexed {
            let native = self.transform_step(scope, step)?;
            workflow.steps.push(native);
        }
        debug!("Pass 2 complete: {} steps lowered", workflow.len());

        bind_outputs(&self.arena, scope, &mut workflow, document.outputs)?;
        Ok(workflow)
    }

    /// Lowers a subworkflow, refusing one that is already being lowered.
    pub(super) fn lower_referenced(
        &mut self,
        document: Value,
        scope: ScopeId,
        origin: Option<String>,
    ) -> Result<NativeWorkflow> {
        let Some(origin) = origin else {
            return self.lower_workflow(document, scope);
        };
        if self.resolving.contains(&origin) {
            let mut chain = self.resolving.clone();
            chain.push(origin);
            return Err(ConversionError::CyclicReference {
                chain: chain.join(" -> "),
            });
        }

        debug!("Resolving subworkflow {}", origin);
        self.resolving.push(origin);
        let lowered = self.lower_workflow(document, scope);
        self.resolving.pop();
        lowered
    }

    /// Pass 1: numbers steps, resolves their labels and fixes positions.
    fn index_steps(&mut self, scope: ScopeId, declarations: Vec<Value>) -> Result<Vec<IndexedStep>> {
        let mut indexed = Vec::with_capacity(declarations.len());

        for (id, declaration) in declarations.into_iter().enumerate() {
            let mut definition = StepDefinition::from_value(declaration)?;
            let label = match (definition.label.take(), definition.id_alias()) {
                (Some(label), Some(alias)) => {
                    return Err(ConversionError::AliasAmbiguity {
                        kind: "step",
                        label,
                        id: alias,
                    })
                }
                (Some(label), None) | (None, Some(label)) => Some(label),
                (None, None) => None,
            };
            definition.id = None;

            if let Some(label) = &label {
                self.arena.register_label(scope, label, id)?;
            }
            let position = definition
                .position
                .take()
                .unwrap_or_else(|| Position::synthesized(id));

            indexed.push(IndexedStep {
                id,
                label,
                position,
                definition,
            });
        }

        self.arena.set_step_count(scope, indexed.len());
        Ok(indexed)
    }
}

fn check_class(document: &Value) -> Result<()> {
    match document.get("class") {
        None | Some(Value::Null) => Err(ConversionError::MissingClass),
        Some(Value::String(class)) if class == WORKFLOW_CLASS => Ok(()),
        Some(Value::String(class)) => Err(ConversionError::WrongClass(class.clone())),
        Some(other) => Err(ConversionError::WrongClass(other.to_string())),
    }
}

/// Converts a parsed document without an embedded-tool catalog.
pub fn convert(document: Value, options: ConversionOptions) -> Result<NativeWorkflow> {
    Converter::new(options, &NoToolCatalog).convert(document)
}

/// Loads and converts a workflow file; `@import` paths resolve against its directory.
pub fn convert_path(path: impl AsRef<Path>, catalog: &dyn ToolCatalog) -> Result<NativeWorkflow> {
    let path = path.as_ref();
    let document = load_document(path)?;
    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let options = ConversionOptions::default().with_workflow_directory(directory);
    let mut converter = Converter::new(options, catalog);
    let root = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    converter.resolving.push(root.display().to_string());
    converter.convert(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format2::loader::parse_document;
    use crate::workflow::{StepType, ValidationError};
    use serde_json::json;
    use tempfile::tempdir;

    fn convert_yaml(text: &str) -> Result<NativeWorkflow> {
        convert(parse_document(text)?, ConversionOptions::default())
    }

    const CAT_WORKFLOW: &str = r#"
class: GalaxyWorkflow
label: Concat
doc:
  - Concatenates
  - a dataset with itself
inputs:
  reads: data
outputs:
  merged:
    outputSource: cat/out_file1
steps:
  cat:
    tool_id: cat1
    tool_version: "1.0.0"
    in:
      input1: reads
    out:
      out_file1:
        rename: merged.txt
"#;

    #[test]
    fn test_convert_basic_workflow() {
        let workflow = convert_yaml(CAT_WORKFLOW).unwrap();

        assert_eq!(workflow.name, "Concat");
        assert_eq!(workflow.annotation, "Concatenates\na dataset with itself");
        assert_eq!(workflow.len(), 2);

        let input = &workflow.steps[0];
        assert_eq!(input.step_type, StepType::DataInput);
        assert_eq!(input.label.as_deref(), Some("reads"));

        let cat = &workflow.steps[1];
        assert_eq!(cat.step_type, StepType::Tool);
        assert_eq!(cat.tool_id.as_deref(), Some("cat1"));
        assert_eq!(cat.input_connections["input1"][0].id, 0);
        assert_eq!(cat.input_connections["input1"][0].output_name, "output");
        assert!(cat.post_job_actions.contains_key("RenameDatasetActionout_file1"));
        assert_eq!(cat.workflow_outputs[0].label.as_deref(), Some("merged"));
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let first = convert_yaml(CAT_WORKFLOW).unwrap().to_json().unwrap();
        let second = convert_yaml(CAT_WORKFLOW).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_uuid_passthrough_and_derived() {
        let derived = convert_yaml(CAT_WORKFLOW).unwrap();
        assert!(Uuid::parse_str(&derived.uuid).is_ok());

        let explicit = convert_yaml("class: GalaxyWorkflow\nuuid: fixed-uuid\nsteps: []\n").unwrap();
        assert_eq!(explicit.uuid, "fixed-uuid");
    }

    #[test]
    fn test_step_ids_follow_declaration_order() {
        let workflow = convert_yaml(
            r#"
class: GalaxyWorkflow
inputs:
  - id: a
  - id: b
steps:
  - tool_id: t1
    in: {x: a}
  - tool_id: t2
    in: {x: b}
"#,
        )
        .unwrap();

        for (index, step) in workflow.steps.iter().enumerate() {
            assert_eq!(step.id, index);
            for (_, connection) in step.connections() {
                assert!(connection.id < step.id);
            }
        }
    }

    #[test]
    fn test_default_name_and_passthrough_keys() {
        let workflow = convert_yaml(
            "class: GalaxyWorkflow\nlicense: MIT\ncreator:\n  - class: Person\n    name: Jane\nsteps: []\n",
        )
        .unwrap();
        assert_eq!(workflow.name, "Workflow");
        assert_eq!(workflow.extra["license"], "MIT");
        assert_eq!(workflow.extra["creator"][0]["name"], "Jane");
    }

    #[test]
    fn test_class_required() {
        assert!(matches!(
            convert_yaml("steps: []\n"),
            Err(ConversionError::MissingClass)
        ));
        assert!(matches!(
            convert_yaml("class: Workflow\n"),
            Err(ConversionError::WrongClass(_))
        ));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let err = convert_yaml(
            r#"
class: GalaxyWorkflow
inputs:
  reads: data
steps:
  - label: reads
    tool_id: cat1
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::DuplicateLabel { first: 0, second: 1, .. }
        ));
    }

    #[test]
    fn test_step_label_and_id_rejected() {
        let err = convert_yaml(
            "class: GalaxyWorkflow\nsteps:\n  - label: a\n    id: b\n    tool_id: cat1\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::AliasAmbiguity { kind: "step", .. }));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let err = convert_yaml(
            r#"
class: GalaxyWorkflow
steps:
  first:
    tool_id: cat1
    in: {input1: second/out_file1}
  second:
    tool_id: cat1
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Validation(ValidationError::ForwardReference { .. })
        ));
    }

    #[test]
    fn test_nested_subworkflow() {
        let workflow = convert_yaml(
            r#"
class: GalaxyWorkflow
inputs:
  outer_input: data
steps:
  nested:
    run:
      class: GalaxyWorkflow
      inputs:
        inner_input: data
      outputs:
        inner_out:
          outputSource: inner_cat/out_file1
      steps:
        inner_cat:
          tool_id: cat1
          in: {input1: inner_input}
    in:
      inner_input: outer_input
  after:
    tool_id: cat1
    in: {input1: nested/inner_out}
"#,
        )
        .unwrap();

        let nested = &workflow.steps[1];
        assert_eq!(nested.step_type, StepType::Subworkflow);
        let connection = &nested.input_connections["inner_input"][0];
        assert_eq!(connection.id, 0);
        assert_eq!(connection.input_subworkflow_step_id, Some(0));

        let inner = nested.subworkflow.as_ref().unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner.steps[1].workflow_outputs[0].label.as_deref(), Some("inner_out"));

        let after = &workflow.steps[2].input_connections["input1"][0];
        assert_eq!((after.id, after.output_name.as_str()), (1, "inner_out"));
    }

    #[test]
    fn test_graph_reference() {
        let document = json!({"$graph": [
            {
                "id": "main",
                "class": "GalaxyWorkflow",
                "inputs": {"reads": "data"},
                "steps": {"helper_step": {"run": "#helper", "in": {"inner": "reads"}}}
            },
            {
                "id": "helper",
                "class": "GalaxyWorkflow",
                "inputs": {"inner": "data"},
                "steps": {}
            }
        ]});
        let workflow = convert(document, ConversionOptions::default()).unwrap();
        let helper = &workflow.steps[1];
        assert_eq!(helper.step_type, StepType::Subworkflow);
        assert_eq!(helper.subworkflow.as_ref().unwrap().steps[0].label.as_deref(), Some("inner"));
    }

    #[test]
    fn test_unknown_graph_reference() {
        let document = json!({"$graph": [
            {"id": "main", "class": "GalaxyWorkflow", "steps": [{"run": "#missing"}]}
        ]});
        assert!(matches!(
            convert(document, ConversionOptions::default()),
            Err(ConversionError::UnknownGraphId(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_import_relative_to_workflow_file() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("inner.gxwf.yml"),
            "class: GalaxyWorkflow\ninputs:\n  inner_input: data\nsteps: {}\n",
        )
        .unwrap();
        let outer = temp_dir.path().join("outer.gxwf.yml");
        std::fs::write(
            &outer,
            r#"
class: GalaxyWorkflow
inputs:
  reads: data
steps:
  nested:
    run:
      "@import": inner.gxwf.yml
    in:
      inner_input: reads
"#,
        )
        .unwrap();

        let workflow = convert_path(&outer, &NoToolCatalog).unwrap();
        let nested = &workflow.steps[1];
        assert_eq!(nested.subworkflow.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_import_is_fatal() {
        let temp_dir = tempdir().unwrap();
        let document = parse_document(
            "class: GalaxyWorkflow\nsteps:\n  nested:\n    run:\n      \"@import\": nope.yml\n",
        )
        .unwrap();
        let options = ConversionOptions::default().with_workflow_directory(temp_dir.path());
        assert!(matches!(
            convert(document, options),
            Err(ConversionError::Import { .. })
        ));
    }

    #[test]
    fn test_self_referencing_graph_entry_rejected() {
        let document = json!({"$graph": [
            {"id": "main", "class": "GalaxyWorkflow", "steps": {"a": {"run": "#loop"}}},
            {"id": "loop", "class": "GalaxyWorkflow", "steps": {"again": {"run": "#loop"}}}
        ]});
        match convert(document, ConversionOptions::default()) {
            Err(ConversionError::CyclicReference { chain }) => assert_eq!(chain, "#loop -> #loop"),
            other => panic!("expected cyclic reference error, got {:?}", other),
        }
    }

    #[test]
    fn test_mutually_referencing_graph_entries_rejected() {
        let document = json!({"$graph": [
            {"id": "main", "class": "GalaxyWorkflow", "steps": {"a": {"run": "#first"}}},
            {"id": "first", "class": "GalaxyWorkflow", "steps": {"b": {"run": "#second"}}},
            {"id": "second", "class": "GalaxyWorkflow", "steps": {"c": {"run": "#first"}}}
        ]});
        assert!(matches!(
            convert(document, ConversionOptions::default()),
            Err(ConversionError::CyclicReference { chain }) if chain == "#first -> #second -> #first"
        ));
    }

    #[test]
    fn test_repeated_graph_reference_is_not_a_cycle() {
        let document = json!({"$graph": [
            {
                "id": "main",
                "class": "GalaxyWorkflow",
                "steps": {"a": {"run": "#helper"}, "b": {"run": "#helper"}}
            },
            {"id": "helper", "class": "GalaxyWorkflow", "steps": {}}
        ]});
        let workflow = convert(document, ConversionOptions::default()).unwrap();
        assert_eq!(workflow.len(), 2);
        assert!(workflow.steps[1].subworkflow.is_some());
    }

    #[test]
    fn test_self_import_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("self.yml");
        std::fs::write(
            &path,
            "class: GalaxyWorkflow\nsteps:\n  again:\n    run:\n      \"@import\": self.yml\n",
        )
        .unwrap();

        let err = convert_path(&path, &NoToolCatalog).unwrap_err();
        assert!(matches!(err, ConversionError::CyclicReference { .. }));
        assert!(err.to_string().contains("self.yml"));
    }

    #[test]
    fn test_import_cycle_through_second_file_rejected() {
        let temp_dir = tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("a.yml"),
            "class: GalaxyWorkflow\nsteps:\n  to_b:\n    run:\n      \"@import\": b.yml\n",
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("b.yml"),
            "class: GalaxyWorkflow\nsteps:\n  to_a:\n    run:\n      \"@import\": a.yml\n",
        )
        .unwrap();

        let document = parse_document(
            "class: GalaxyWorkflow\nsteps:\n  start:\n    run:\n      \"@import\": a.yml\n",
        )
        .unwrap();
        let options = ConversionOptions::default().with_workflow_directory(temp_dir.path());
        match convert(document, options) {
            Err(ConversionError::CyclicReference { chain }) => {
                let files: Vec<&str> = chain.split(" -> ").collect();
                assert_eq!(files.len(), 3);
                assert!(files[0].ends_with("a.yml"));
                assert!(files[1].ends_with("b.yml"));
                assert!(files[2].ends_with("a.yml"));
            }
            other => panic!("expected cyclic reference error, got {:?}", other),
        }
    }

    struct FixedCatalog;

    impl ToolCatalog for FixedCatalog {
        fn import_tool(&self, description: &Value) -> std::result::Result<ImportedTool, String> {
            Ok(ImportedTool {
                tool_id: description["id"].as_str().unwrap_or("anon").to_string(),
                tool_version: Some("0.1".to_string()),
                tool_hash: Some("h4sh".to_string()),
                tool_uuid: None,
            })
        }
    }

    #[test]
    fn test_embedded_tool_uses_catalog() {
        let document = parse_document(
            "class: GalaxyWorkflow\nsteps:\n  embedded:\n    run:\n      class: GalaxyTool\n      id: my_tool\n",
        )
        .unwrap();

        let workflow = Converter::new(ConversionOptions::default(), &FixedCatalog)
            .convert(document.clone())
            .unwrap();
        let step = &workflow.steps[0];
        assert_eq!(step.step_type, StepType::Tool);
        assert_eq!(step.tool_id.as_deref(), Some("my_tool"));
        assert_eq!(step.extra["tool_hash"], "h4sh");

        assert!(matches!(
            convert(document, ConversionOptions::default()),
            Err(ConversionError::Catalog { .. })
        ));
    }
}
