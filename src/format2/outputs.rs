//! Output Binder
//!
//! Attaches workflow-level named outputs to the step outputs they expose.

use log::debug;
use serde_json::Value;

use super::context::{ContextArena, ScopeId};
use super::document::{keyed_entries, scalar_text};
use super::error::{ConversionError, Result};
use crate::workflow::{NativeWorkflow, WorkflowOutput};

/// Labels with this prefix mark outputs that are exposed without a name.
pub const ANONYMOUS_OUTPUT_PREFIX: &str = "_anonymous_output_";

fn output_label(entry: &serde_json::Map<String, Value>, index: usize) -> Result<Option<String>> {
    let label = match (entry.get("label"), entry.get("id")) {
        (Some(label), Some(id)) => {
            return Err(ConversionError::AliasAmbiguity {
                kind: "output",
                label: scalar_text(label),
                id: scalar_text(id),
            })
        }
        (Some(value), None) | (None, Some(value)) => scalar_text(value),
        (None, None) => String::new(),
    };

    if label.is_empty() {
        return Err(ConversionError::MissingLabel {
            kind: "Output",
            index,
        });
    }
    if label.starts_with(ANONYMOUS_OUTPUT_PREFIX) {
        return Ok(None);
    }
    Ok(Some(label))
}

/// Binds the `outputs` section onto the steps of `workflow`.
pub fn bind_outputs(
    arena: &ContextArena,
    scope: ScopeId,
    workflow: &mut NativeWorkflow,
    outputs: Option<Value>,
) -> Result<()> {
    for (index, entry) in keyed_entries(outputs, "id", "output")?.into_iter().enumerate() {
        let Value::Object(entry) = entry else {
            return Err(ConversionError::InvalidOutput { index });
        };

        let label = output_label(&entry, index)?;
        let source = match entry.get("outputSource").or_else(|| entry.get("source")) {
            Some(Value::String(source)) => source.clone(),
            _ => return Err(ConversionError::MissingOutputSource { index }),
        };

        let (id, output_name) = arena.step_output(scope, &source)?;
        let step = workflow
            .get_step_mut(id)
            .ok_or_else(|| ConversionError::UnresolvedReference {
                reference: source.clone(),
            })?;

        debug!(
            "Workflow output {:?} bound to {}/{}",
            label,
            step.describe(),
            output_name
        );
        step.workflow_outputs.push(WorkflowOutput {
            output_name,
            label,
            uuid: entry.get("uuid").map(scalar_text),
        });
    }
    Ok(())
}
