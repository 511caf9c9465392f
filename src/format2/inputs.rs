//! Workflow inputs section.
//!
//! Inputs are declared apart from steps in Format 2 but are ordinary input
//! steps in the native graph. Each declaration is rewritten into a step
//! declaration with a normalized `type` and `label`, to be placed ahead of the
//! declared steps.

use log::debug;
use serde_json::{Map, Value};

use super::document::{keyed_entries, scalar_text};
use super::error::{ConversionError, Result};

/// Maps a declared input type to `(step type, parameter type)`.
fn classify_input_type(input_type: &str) -> Option<(&'static str, Option<&'static str>)> {
    match input_type {
        "File" | "data" | "data_input" => Some(("data_input", None)),
        "collection" | "data_collection" | "data_collection_input" => {
            Some(("data_collection_input", None))
        }
        "text" | "string" => Some(("parameter_input", Some("text"))),
        "integer" | "int" => Some(("parameter_input", Some("integer"))),
        "float" => Some(("parameter_input", Some("float"))),
        "color" => Some(("parameter_input", Some("color"))),
        "boolean" => Some(("parameter_input", Some("boolean"))),
        _ => None,
    }
}

fn take_label(entry: &mut Map<String, Value>, index: usize) -> Result<String> {
    let label = entry.remove("label");
    let id = entry.remove("id");
    let chosen = match (label, id) {
        (Some(label), Some(id)) => {
            return Err(ConversionError::AliasAmbiguity {
                kind: "input",
                label: scalar_text(&label),
                id: scalar_text(&id),
            })
        }
        (Some(value), None) | (None, Some(value)) => scalar_text(&value),
        (None, None) => String::new(),
    };
    if chosen.is_empty() {
        return Err(ConversionError::MissingLabel {
            kind: "Input",
            index,
        });
    }
    Ok(chosen)
}

/// Rewrites the `inputs` section into input step declarations.
pub fn inputs_to_steps(inputs: Option<Value>) -> Result<Vec<Value>> {
    let entries = keyed_entries(inputs, "label", "input")?;
    let mut steps = Vec::with_capacity(entries.len());

    for (index, entry) in entries.into_iter().enumerate() {
        let mut entry = match entry {
            Value::Object(map) => map,
            Value::String(label) => {
                let mut map = Map::new();
                map.insert("label".to_string(), Value::String(label));
                map
            }
            other => {
                return Err(ConversionError::InvalidDocument(format!(
                    "input {} must be a mapping, found {}",
                    index, other
                )))
            }
        };

        let label = take_label(&mut entry, index)?;
        let declared_type = entry
            .remove("type")
            .map(|t| scalar_text(&t))
            .unwrap_or_else(|| "data".to_string());

        let (step_type, parameter_type) =
            classify_input_type(&declared_type).ok_or_else(|| {
                ConversionError::UnsupportedInputType {
                    label: label.clone(),
                    input_type: declared_type.clone(),
                }
            })?;

        debug!("Input '{}' ({}) -> {}", label, declared_type, step_type);

        entry.insert("type".to_string(), Value::String(step_type.to_string()));
        if let Some(parameter_type) = parameter_type {
            entry.insert(
                "parameter_type".to_string(),
                Value::String(parameter_type.to_string()),
            );
        }
        entry.insert("label".to_string(), Value::String(label));
        steps.push(Value::Object(entry));
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shorthand_mapping() {
        let steps = inputs_to_steps(Some(json!({
            "reads": "data",
            "samples": "collection",
            "threshold": "int"
        })))
        .unwrap();

        assert_eq!(steps[0], json!({"type": "data_input", "label": "reads"}));
        assert_eq!(steps[1]["type"], "data_collection_input");
        assert_eq!(steps[2]["type"], "parameter_input");
        assert_eq!(steps[2]["parameter_type"], "integer");
    }

    #[test]
    fn test_list_with_id_alias() {
        let steps = inputs_to_steps(Some(json!([
            {"id": "reads", "type": "File"},
            {"label": "name", "type": "string", "optional": true}
        ])))
        .unwrap();

        assert_eq!(steps[0]["label"], "reads");
        assert!(steps[0].get("id").is_none());
        assert_eq!(steps[1]["parameter_type"], "text");
        assert_eq!(steps[1]["optional"], true);
    }

    #[test]
    fn test_missing_type_defaults_to_data() {
        let steps = inputs_to_steps(Some(json!([{"label": "reads"}]))).unwrap();
        assert_eq!(steps[0]["type"], "data_input");
    }

    #[test]
    fn test_label_and_id_rejected() {
        let err = inputs_to_steps(Some(json!([{"label": "a", "id": "b"}]))).unwrap_err();
        assert!(matches!(err, ConversionError::AliasAmbiguity { kind: "input", .. }));
    }

    #[test]
    fn test_missing_label_rejected() {
        let err = inputs_to_steps(Some(json!([{"type": "data"}]))).unwrap_err();
        assert!(matches!(err, ConversionError::MissingLabel { index: 0, .. }));

        let err = inputs_to_steps(Some(json!([{"label": ""}]))).unwrap_err();
        assert!(matches!(err, ConversionError::MissingLabel { .. }));
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let err = inputs_to_steps(Some(json!({"x": "Directory"}))).unwrap_err();
        assert!(err.to_string().contains("Directory"));
    }

    #[test]
    fn test_no_inputs() {
        assert!(inputs_to_steps(None).unwrap().is_empty());
    }
}
