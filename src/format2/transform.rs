//! Step Transformer
//!
//! Pass 2 of the converter. Resolves each step's `run` action to an effective
//! step type, then lowers the step through the handler registered for that
//! type. Handlers fill in the native step's tool state, connections and post
//! job actions; keys they do not interpret are passed through unchanged.

use log::{debug, warn};
use serde_json::{Map, Value};

use super::actions::lower_output_actions;
use super::connections::{collect_declared, replace_links, resolve_connections, runtime_value, ConnectionSpec};
use super::context::ScopeId;
use super::converter::{Converter, ImportedTool, IndexedStep};
use super::document::{annotation_of, StepDefinition, RESERVED_STEP_KEYS};
use super::error::{ConversionError, Result};
use super::loader::resolve_import;
use crate::workflow::{encode_json, NativeStep, StatePath, StepInput, StepType};

const DEFAULT_STEP_TYPE: &str = "tool";
const PAUSE_DEFAULT_NAME: &str = "Pause for dataset review";
const STATE_PAGE_KEY: &str = "__page__";

/// What a step's `run` action resolved to.
#[derive(Debug, Clone)]
pub(crate) enum RunTarget {
    /// No `run` action; the declared type decides
    Declared,
    /// Inline, imported or `$graph` workflow document; `origin` names the
    /// import path or graph id it was resolved from
    Workflow { document: Value, origin: Option<String> },
    /// Subworkflow referenced by content id
    External(String),
    /// Embedded tool registered through the catalog
    Tool(ImportedTool),
}

/// A step being lowered by its type handler.
pub(crate) struct StepLowering {
    scope: ScopeId,
    describe: String,
    definition: StepDefinition,
    run: RunTarget,
    native: NativeStep,
}

type Handler = fn(&mut Converter<'_>, &mut StepLowering) -> Result<()>;

/// Static dispatch table from step type to handler.
fn handler_for(step_type: StepType) -> Handler {
    match step_type {
        StepType::DataInput => lower_data_input,
        StepType::DataCollectionInput => lower_collection_input,
        StepType::ParameterInput => lower_parameter_input,
        StepType::Pause => lower_pause,
        StepType::Subworkflow => lower_subworkflow,
        StepType::Tool => lower_tool,
    }
}

impl Converter<'_> {
    /// Lowers one indexed step within `scope`.
    pub(crate) fn transform_step(&mut self, scope: ScopeId, step: IndexedStep) -> Result<NativeStep> {
        let describe = step.describe();
        let mut definition = step.definition;

        let (step_type, run) = match definition.run.take() {
            Some(_) if definition.step_type.is_some() => {
                return Err(ConversionError::TypeAndRun { step: describe })
            }
            Some(run) => self.resolve_run(&describe, run)?,
            None => {
                let declared = definition
                    .step_type
                    .take()
                    .unwrap_or_else(|| DEFAULT_STEP_TYPE.to_string());
                let step_type = StepType::parse(&declared).ok_or_else(|| {
                    ConversionError::UnknownStepType {
                        step: describe.clone(),
                        step_type: declared.clone(),
                    }
                })?;
                (step_type, RunTarget::Declared)
            }
        };
        debug!("Lowering {} as {}", describe, step_type);

        let annotation = annotation_of(definition.doc.take(), definition.annotation.take());
        let native = NativeStep::new(step.id, step_type, step.position)
            .with_label(step.label)
            .with_annotation(annotation);

        let mut lowering = StepLowering {
            scope,
            describe,
            definition,
            run,
            native,
        };
        handler_for(step_type)(self, &mut lowering)?;

        let StepLowering {
            describe,
            definition,
            mut native,
            ..
        } = lowering;
        for (key, value) in definition.extra {
            if RESERVED_STEP_KEYS.contains(&key.as_str()) {
                warn!("{}: ignoring declared '{}', it is generated", describe, key);
                continue;
            }
            native.extra.insert(key, value);
        }
        Ok(native)
    }

    /// Resolves a `run` action to the step type it implies.
    fn resolve_run(&self, describe: &str, run: Value) -> Result<(StepType, RunTarget)> {
        let (run, imported) = resolve_import(run, &self.options.workflow_directory)?;
        let mut origin = imported.map(|path| path.display().to_string());

        let run = match run {
            Value::String(reference) => match reference.strip_prefix('#') {
                Some(graph_id) => {
                    let entry = self
                        .graph_ids
                        .get(graph_id)
                        .cloned()
                        .ok_or_else(|| ConversionError::UnknownGraphId(graph_id.to_string()))?;
                    origin = Some(reference.clone());
                    entry
                }
                None => return Ok((StepType::Subworkflow, RunTarget::External(reference))),
            },
            other => other,
        };

        let unknown = |class: &str| ConversionError::UnknownRunClass {
            step: describe.to_string(),
            class: class.to_string(),
        };
        match run.get("class") {
            Some(Value::String(class)) if class == "GalaxyWorkflow" => {
                Ok((StepType::Subworkflow, RunTarget::Workflow { document: run, origin }))
            }
            Some(Value::String(class)) if class == "GalaxyTool" => {
                let tool = self
                    .catalog
                    .import_tool(&run)
                    .map_err(|message| ConversionError::Catalog {
                        step: describe.to_string(),
                        message,
                    })?;
                Ok((StepType::Tool, RunTarget::Tool(tool)))
            }
            Some(Value::String(class)) => Err(unknown(class)),
            Some(other) => Err(unknown(&other.to_string())),
            None => Err(unknown("<missing>")),
        }
    }
}

fn lower_data_input(_: &mut Converter<'_>, lowering: &mut StepLowering) -> Result<()> {
    lower_input(lowering, "Input dataset")
}

fn lower_collection_input(_: &mut Converter<'_>, lowering: &mut StepLowering) -> Result<()> {
    lower_input(lowering, "Input dataset collection")
}

fn lower_parameter_input(_: &mut Converter<'_>, lowering: &mut StepLowering) -> Result<()> {
    lower_input(lowering, "input_parameter")
}

fn lower_input(lowering: &mut StepLowering, default_name: &str) -> Result<()> {
    let native = &mut lowering.native;
    let name = native
        .label
        .clone()
        .unwrap_or_else(|| default_name.to_string());

    native.inputs = vec![StepInput {
        name: name.clone(),
        description: Some(String::new()),
    }];
    native.tool_state.insert("name", Value::String(name));
    for (key, value) in lowering.definition.input_state_attributes() {
        native.tool_state.insert(key, value.clone());
    }
    Ok(())
}

fn lower_pause(converter: &mut Converter<'_>, lowering: &mut StepLowering) -> Result<()> {
    let name = lowering
        .native
        .label
        .clone()
        .unwrap_or_else(|| PAUSE_DEFAULT_NAME.to_string());
    lowering.native.inputs = vec![StepInput {
        name: name.clone(),
        description: None,
    }];
    lowering.native.tool_state.insert("name", Value::String(name));

    let spec = declared_connections(lowering)?;
    lowering.native.input_connections =
        resolve_connections(&converter.arena, lowering.scope, None, spec)?;
    Ok(())
}

fn lower_subworkflow(converter: &mut Converter<'_>, lowering: &mut StepLowering) -> Result<()> {
    let run = std::mem::replace(&mut lowering.run, RunTarget::Declared);
    let inner_scope = match run {
        RunTarget::Workflow { document, origin } => {
            let inner = converter
                .arena
                .subworkflow_scope(lowering.scope, lowering.native.id);
            let subworkflow = converter.lower_referenced(document, inner, origin)?;
            debug!(
                "{}: subworkflow '{}' lowered with {} steps",
                lowering.describe,
                subworkflow.name,
                subworkflow.len()
            );
            lowering.native.subworkflow = Some(Box::new(subworkflow));
            Some(inner)
        }
        RunTarget::External(content_id) => {
            lowering.native.content_id = Some(content_id);
            None
        }
        _ => {
            // declared `type: subworkflow` may name its target directly
            if let Some(content_id) = lowering.definition.extra.remove("content_id") {
                lowering.native.content_id = Some(super::document::scalar_text(&content_id));
            }
            None
        }
    };

    let spec = declared_connections(lowering)?;
    lowering.native.input_connections =
        resolve_connections(&converter.arena, lowering.scope, inner_scope, spec)?;
    Ok(())
}

fn lower_tool(converter: &mut Converter<'_>, lowering: &mut StepLowering) -> Result<()> {
    let definition = &mut lowering.definition;
    let native = &mut lowering.native;

    match std::mem::replace(&mut lowering.run, RunTarget::Declared) {
        RunTarget::Tool(tool) => {
            native.tool_id = Some(tool.tool_id);
            native.tool_version = tool.tool_version;
            if let Some(hash) = tool.tool_hash {
                native.extra.insert("tool_hash".to_string(), Value::String(hash));
            }
            if let Some(uuid) = tool.tool_uuid {
                native.extra.insert("tool_uuid".to_string(), Value::String(uuid));
            }
        }
        _ => {
            let tool_id = definition
                .tool_id
                .take()
                .ok_or_else(|| ConversionError::MissingToolId {
                    step: lowering.describe.clone(),
                })?;
            native.tool_id = Some(tool_id);
            native.tool_version = definition.tool_version.take();
        }
    }
    native.name = native.tool_id.clone();

    let mut spec = ConnectionSpec::new();
    let defaults = collect_declared(
        &lowering.describe,
        definition.connect.take(),
        definition.step_in.take(),
        &mut spec,
    )?;
    if !defaults.is_empty() {
        native.extra.insert("in".to_string(), Value::Object(defaults));
    }

    let state = definition.state.take();
    let runtime_inputs = std::mem::take(&mut definition.runtime_inputs);
    native.tool_state.insert(STATE_PAGE_KEY, Value::from(0));
    if state.is_some() || !runtime_inputs.is_empty() {
        let state = replace_links(
            &lowering.describe,
            Value::Object(state.unwrap_or_default()),
            &StatePath::root(),
            &mut spec,
        )?;
        if let Value::Object(state) = state {
            for (key, value) in state {
                native.tool_state.insert(key, Value::String(encode_json(&value)?));
            }
        }
        let placeholder = encode_json(&runtime_value())?;
        for key in runtime_inputs {
            native.tool_state.insert(key, Value::String(placeholder.clone()));
        }
    } else if let Some(tool_state) = definition.tool_state.take() {
        for (key, value) in tool_state {
            native.tool_state.insert(key, value);
        }
    }

    native.input_connections = resolve_connections(&converter.arena, lowering.scope, None, spec)?;
    native.post_job_actions = lower_output_actions(
        &lowering.describe,
        definition.out.take().or_else(|| definition.outputs.take()),
    )?;
    debug!(
        "{}: tool {} with {} connections",
        lowering.describe,
        native.tool_id.as_deref().unwrap_or_default(),
        native.input_connections.len()
    );
    Ok(())
}

/// `connect` and `in` references of a non-tool step.
fn declared_connections(lowering: &mut StepLowering) -> Result<ConnectionSpec> {
    let mut spec = ConnectionSpec::new();
    let defaults: Map<String, Value> = collect_declared(
        &lowering.describe,
        lowering.definition.connect.take(),
        lowering.definition.step_in.take(),
        &mut spec,
    )?;
    if !defaults.is_empty() {
        lowering
            .native
            .extra
            .insert("in".to_string(), Value::Object(defaults));
    }
    Ok(spec)
}
