//! Output directives (`out`) lowered to post job actions.

use indexmap::IndexMap;
use log::debug;
use serde_json::{json, Map, Value};

use super::document::{keyed_entries, scalar_text};
use super::error::{ConversionError, Result};
use crate::workflow::PostJobAction;

/// One `out` directive and the action it produces.
struct ActionDirective {
    key: &'static str,
    action_type: &'static str,
    /// Builds the action arguments, or `None` when the directive is off
    arguments: fn(&Value) -> Option<Value>,
}

fn enabled(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn flag_arguments(value: &Value) -> Option<Value> {
    enabled(value).then(|| json!({}))
}

fn rename_arguments(value: &Value) -> Option<Value> {
    enabled(value).then(|| json!({"newname": scalar_text(value)}))
}

fn datatype_arguments(value: &Value) -> Option<Value> {
    enabled(value).then(|| json!({"newtype": scalar_text(value)}))
}

fn column_arguments(value: &Value) -> Option<Value> {
    enabled(value).then(|| value.clone())
}

fn tag_arguments(value: &Value) -> Option<Value> {
    if !enabled(value) {
        return None;
    }
    let tags = match value {
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        other => scalar_text(other),
    };
    Some(json!({ "tags": tags }))
}

/// Directives in emission order.
const DIRECTIVES: &[ActionDirective] = &[
    ActionDirective {
        key: "hide",
        action_type: "HideDatasetAction",
        arguments: flag_arguments,
    },
    ActionDirective {
        key: "rename",
        action_type: "RenameDatasetAction",
        arguments: rename_arguments,
    },
    ActionDirective {
        key: "delete_intermediate_datasets",
        action_type: "DeleteIntermediatesAction",
        arguments: flag_arguments,
    },
    ActionDirective {
        key: "change_datatype",
        action_type: "ChangeDatatypeAction",
        arguments: datatype_arguments,
    },
    ActionDirective {
        key: "set_columns",
        action_type: "ColumnSetAction",
        arguments: column_arguments,
    },
    ActionDirective {
        key: "add_tags",
        action_type: "TagDatasetAction",
        arguments: tag_arguments,
    },
    ActionDirective {
        key: "remove_tags",
        action_type: "RemoveTagDatasetAction",
        arguments: tag_arguments,
    },
];

fn output_directives(step: &str, entry: Value) -> Result<(String, Map<String, Value>)> {
    match entry {
        Value::String(name) => Ok((name, Map::new())),
        Value::Object(mut map) => {
            let name = map
                .remove("id")
                .map(|id| scalar_text(&id))
                .ok_or_else(|| {
                    ConversionError::InvalidDocument(format!(
                        "{}: every output directive must name its output with id",
                        step
                    ))
                })?;
            Ok((name, map))
        }
        other => Err(ConversionError::InvalidDocument(format!(
            "{}: output directive must be a name or a mapping, found {}",
            step, other
        ))),
    }
}

/// Lowers a step's `out` section into post job actions keyed `{ActionType}{output}`.
pub fn lower_output_actions(step: &str, out: Option<Value>) -> Result<IndexMap<String, PostJobAction>> {
    let mut actions = IndexMap::new();

    for entry in keyed_entries(out, "id", "output")? {
        let (output_name, directives) = output_directives(step, entry)?;
        for directive in DIRECTIVES {
            let Some(value) = directives.get(directive.key) else {
                continue;
            };
            let Some(arguments) = (directive.arguments)(value) else {
                continue;
            };
            let action_name = format!("{}{}", directive.action_type, output_name);
            debug!("{}: post job action {}", step, action_name);
            actions.insert(
                action_name,
                PostJobAction {
                    action_type: directive.action_type.to_string(),
                    output_name: output_name.clone(),
                    action_arguments: arguments,
                },
            );
        }
    }

    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_form() {
        let actions = lower_output_actions(
            "step 1",
            Some(json!({
                "out_file1": {"hide": true, "rename": "the_new_name"}
            })),
        )
        .unwrap();

        let hide = &actions["HideDatasetActionout_file1"];
        assert_eq!(hide.action_type, "HideDatasetAction");
        assert_eq!(hide.output_name, "out_file1");
        assert_eq!(hide.action_arguments, json!({}));

        let rename = &actions["RenameDatasetActionout_file1"];
        assert_eq!(rename.action_arguments, json!({"newname": "the_new_name"}));

        let keys: Vec<_> = actions.keys().cloned().collect();
        assert_eq!(
            keys,
            vec!["HideDatasetActionout_file1", "RenameDatasetActionout_file1"]
        );
    }

    #[test]
    fn test_list_form_and_disabled_directives() {
        let actions = lower_output_actions(
            "step 1",
            Some(json!([
                {"id": "out_file1", "hide": false, "delete_intermediate_datasets": true},
                "untouched"
            ])),
        )
        .unwrap();

        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions["DeleteIntermediatesActionout_file1"].action_arguments,
            json!({})
        );
    }

    #[test]
    fn test_tag_and_datatype_directives() {
        let actions = lower_output_actions(
            "step 1",
            Some(json!({
                "out": {
                    "add_tags": ["name:a", "b"],
                    "remove_tags": ["c"],
                    "change_datatype": "tabular",
                    "set_columns": {"chromCol": 1}
                }
            })),
        )
        .unwrap();

        assert_eq!(
            actions["TagDatasetActionout"].action_arguments,
            json!({"tags": "name:a,b"})
        );
        assert_eq!(
            actions["RemoveTagDatasetActionout"].action_arguments,
            json!({"tags": "c"})
        );
        assert_eq!(
            actions["ChangeDatatypeActionout"].action_arguments,
            json!({"newtype": "tabular"})
        );
        assert_eq!(
            actions["ColumnSetActionout"].action_arguments,
            json!({"chromCol": 1})
        );
    }

    #[test]
    fn test_missing_id_rejected() {
        let err = lower_output_actions("step 1", Some(json!([{"hide": true}]))).unwrap_err();
        assert!(err.to_string().contains("step 1"));
    }

    #[test]
    fn test_no_out_section() {
        assert!(lower_output_actions("step 1", None).unwrap().is_empty());
    }
}
