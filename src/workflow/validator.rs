//! Native Workflow Validation
//!
//! Checks the invariants of a lowered step graph:
//! - Step ids match declaration order
//! - Every connection targets an existing, earlier step (no forward references, no cycles)
//! - Subworkflow connections target existing inner steps
//! - Workflow output labels are unique within a workflow
//!
//! Subworkflows are checked recursively.

use std::collections::HashMap;

use log::{debug, info};
use thiserror::Error;

use super::model::{describe_step, NativeWorkflow};

/// Structural problems found in a lowered workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{step} is stored at position {position}; step ids must follow declaration order")]
    MisnumberedStep { step: String, position: usize },

    #[error("{step} input '{input}' references unknown step {target}")]
    InvalidReference {
        step: String,
        input: String,
        target: usize,
    },

    #[error("{step} input '{input}' references step {target}, which is not declared before it")]
    ForwardReference {
        step: String,
        input: String,
        target: usize,
    },

    #[error("{step} input '{input}' targets unknown subworkflow input step {target}")]
    InvalidSubworkflowInput {
        step: String,
        input: String,
        target: usize,
    },

    #[error("Workflow output label '{label}' is used by both {first} and {second}")]
    DuplicateOutputLabel {
        label: String,
        first: String,
        second: String,
    },

    #[error("In subworkflow {step}: {source}")]
    Nested {
        step: String,
        source: Box<ValidationError>,
    },
}

/// Collects every problem in a workflow, outermost scope first.
pub fn quick_validate(workflow: &NativeWorkflow) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut output_labels: HashMap<&str, String> = HashMap::new();

    for (position, step) in workflow.steps.iter().enumerate() {
        if step.id != position {
            errors.push(ValidationError::MisnumberedStep {
                step: step.describe(),
                position,
            });
        }

        let inner_len = step.subworkflow.as_ref().map(|sub| sub.steps.len());

        for (input, connection) in step.connections() {
            if connection.id >= workflow.steps.len() {
                errors.push(ValidationError::InvalidReference {
                    step: step.describe(),
                    input: input.to_string(),
                    target: connection.id,
                });
            } else if connection.id >= step.id {
                errors.push(ValidationError::ForwardReference {
                    step: step.describe(),
                    input: input.to_string(),
                    target: connection.id,
                });
            }

            if let (Some(inner), Some(len)) = (connection.input_subworkflow_step_id, inner_len) {
                if inner >= len {
                    errors.push(ValidationError::InvalidSubworkflowInput {
                        step: step.describe(),
                        input: input.to_string(),
                        target: inner,
                    });
                }
            }
        }

        for output in &step.workflow_outputs {
            let Some(label) = output.label.as_deref() else {
                continue;
            };
            let owner = describe_step(step.id, step.label.as_deref());
            if let Some(first) = output_labels.get(label) {
                errors.push(ValidationError::DuplicateOutputLabel {
                    label: label.to_string(),
                    first: first.clone(),
                    second: owner,
                });
            } else {
                output_labels.insert(label, owner);
            }
        }

        if let Some(subworkflow) = &step.subworkflow {
            for error in quick_validate(subworkflow) {
                errors.push(ValidationError::Nested {
                    step: step.describe(),
                    source: Box::new(error),
                });
            }
        }
    }

    errors
}

/// Validates a lowered workflow, failing on the first problem.
pub fn validate_workflow(workflow: &NativeWorkflow) -> Result<(), ValidationError> {
    debug!("Validating workflow '{}' with {} steps", workflow.name, workflow.len());

    if let Some(error) = quick_validate(workflow).into_iter().next() {
        return Err(error);
    }

    info!(
        "Workflow '{}' validated: {} steps, {} connections",
        workflow.name,
        workflow.len(),
        workflow
            .steps
            .iter()
            .map(|s| s.connections().count())
            .sum::<usize>()
    );
    Ok(())
}
