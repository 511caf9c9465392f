//! Connection Resolver
//!
//! Gathers step references from the three places a Format 2 step can declare
//! them and turns them into explicit `{id, output_name}` records:
//! - the `connect` mapping
//! - the CWL-style `in` mapping
//! - `{"$link": ...}` values embedded in tool `state`
//!
//! State links are keyed by their flattened position in the state tree and the
//! linked value itself is replaced by a runtime placeholder.

use indexmap::IndexMap;
use log::debug;
use serde_json::{json, Map, Value};

use super::context::{ContextArena, ScopeId};
use super::error::{ConversionError, Result};
use crate::workflow::{ConnectionRef, StatePath};

/// Input key connecting a whole step rather than one of its outputs.
pub const STEP_CONNECTION_KEY: &str = "$step";

/// Wire name used for whole-step connections.
pub const NO_INPUT_OUTPUT_NAME: &str = "__NO_INPUT_OUTPUT_NAME__";

const LINK_KEY: &str = "$link";

/// Placeholder left in tool state where a value arrives through a connection.
pub fn runtime_value() -> Value {
    json!({"__class__": "RuntimeValue"})
}

fn is_link(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.contains_key(LINK_KEY))
}

/// References awaiting resolution, keyed by input name in discovery order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConnectionSpec {
    entries: IndexMap<String, Vec<String>>,
}

impl ConnectionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, reference: impl Into<String>) {
        self.entries
            .entry(key.into())
            .or_default()
            .push(reference.into());
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &str) -> Option<&[String]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn reference_list(step: &str, key: &str, value: &Value) -> Result<Vec<String>> {
    let invalid = |found: &Value| ConversionError::InvalidConnection {
        step: step.to_string(),
        input: key.to_string(),
        found: found.to_string(),
    };
    match value {
        Value::String(reference) => Ok(vec![reference.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(reference) => Ok(reference.clone()),
                other => Err(invalid(other)),
            })
            .collect(),
        other => Err(invalid(other)),
    }
}

/// Collects `connect` and `in` references into `spec`.
///
/// `in` entries that only carry a `default` are not connections; they are
/// returned so the caller can keep them on the step.
pub fn collect_declared(
    step: &str,
    connect: Option<Map<String, Value>>,
    step_in: Option<Map<String, Value>>,
    spec: &mut ConnectionSpec,
) -> Result<Map<String, Value>> {
    for (key, value) in connect.unwrap_or_default() {
        for reference in reference_list(step, &key, &value)? {
            spec.push(key.clone(), reference);
        }
    }

    let mut defaults = Map::new();
    for (key, value) in step_in.unwrap_or_default() {
        match &value {
            Value::Object(entry) if entry.contains_key("source") => {
                for reference in reference_list(step, &key, &entry["source"])? {
                    spec.push(key.clone(), reference);
                }
            }
            Value::Object(entry) if entry.contains_key("default") => {
                defaults.insert(key, value);
            }
            Value::Object(_) | Value::Null => {
                return Err(ConversionError::InvalidStepInput {
                    step: step.to_string(),
                    input: key,
                })
            }
            _ => {
                for reference in reference_list(step, &key, &value)? {
                    spec.push(key.clone(), reference);
                }
            }
        }
    }

    Ok(defaults)
}

fn link_target(step: &str, path: &StatePath, link: &Value) -> Result<String> {
    match link.get(LINK_KEY) {
        Some(Value::String(target)) => Ok(target.clone()),
        other => Err(ConversionError::InvalidConnection {
            step: step.to_string(),
            input: path.flatten(),
            found: other.cloned().unwrap_or(Value::Null).to_string(),
        }),
    }
}

/// Walks tool state, recording every `$link` as a connection and replacing it.
///
/// A link that is a mapping value is keyed by the flattened path to it and
/// becomes a runtime placeholder. A link that is a list element is appended to
/// the list's own key (several links feeding one multi-input) and becomes
/// `null`; other list elements are repeat instances and extend the path with
/// their index.
pub fn replace_links(
    step: &str,
    value: Value,
    path: &StatePath,
    spec: &mut ConnectionSpec,
) -> Result<Value> {
    if is_link(&value) {
        spec.push(path.flatten(), link_target(step, path, &value)?);
        return Ok(runtime_value());
    }

    match value {
        Value::Object(map) => {
            let mut replaced = Map::new();
            for (key, child) in map {
                let child_path = path.field(key.clone());
                replaced.insert(key, replace_links(step, child, &child_path, spec)?);
            }
            Ok(Value::Object(replaced))
        }
        Value::Array(items) => {
            let mut replaced = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                if is_link(&item) {
                    spec.push(path.flatten(), link_target(step, path, &item)?);
                    replaced.push(Value::Null);
                } else {
                    replaced.push(replace_links(step, item, &path.repeat(index), spec)?);
                }
            }
            Ok(Value::Array(replaced))
        }
        other => Ok(other),
    }
}

/// Resolves collected references within `scope`.
///
/// For subworkflow steps, `inner_scope` is the subworkflow's own scope and
/// each input key names the inner input step the connection feeds.
pub fn resolve_connections(
    arena: &ContextArena,
    scope: ScopeId,
    inner_scope: Option<ScopeId>,
    spec: ConnectionSpec,
) -> Result<IndexMap<String, Vec<ConnectionRef>>> {
    let mut resolved: IndexMap<String, Vec<ConnectionRef>> = IndexMap::new();

    for (key, references) in spec.entries {
        let whole_step = key == STEP_CONNECTION_KEY;
        let mut connections = Vec::with_capacity(references.len());

        for reference in references {
            let mut connection = if whole_step {
                let step_part = reference.split('/').next().unwrap_or(&reference);
                let id = arena.step_id(scope, step_part).map_err(|_| {
                    ConversionError::UnresolvedReference {
                        reference: reference.clone(),
                    }
                })?;
                ConnectionRef::new(id, NO_INPUT_OUTPUT_NAME)
            } else {
                let (id, output_name) = arena.step_output(scope, &reference)?;
                ConnectionRef::new(id, output_name)
            };

            if let (Some(inner), false) = (inner_scope, whole_step) {
                connection.input_subworkflow_step_id = Some(arena.step_id(inner, &key)?);
            }
            debug!("Connection {} <- {} ({:?})", key, reference, connection);
            connections.push(connection);
        }

        let key = if whole_step {
            NO_INPUT_OUTPUT_NAME.to_string()
        } else {
            key
        };
        resolved.entry(key).or_default().extend(connections);
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> ContextArena {
        let mut arena = ContextArena::new();
        let root = arena.root();
        arena.register_label(root, "reads", 0).unwrap();
        arena.register_label(root, "other", 1).unwrap();
        arena.set_step_count(root, 3);
        arena
    }

    #[test]
    fn test_collect_in_forms() {
        let mut spec = ConnectionSpec::new();
        let step_in = json!({
            "input1": "reads",
            "queries": ["reads", "other/out_file1"],
            "input2": {"source": "other"},
            "param": {"default": 5}
        });
        let defaults = collect_declared(
            "step 2",
            None,
            step_in.as_object().cloned(),
            &mut spec,
        )
        .unwrap();

        assert_eq!(spec.get("input1").unwrap(), ["reads"]);
        assert_eq!(spec.get("queries").unwrap().len(), 2);
        assert_eq!(spec.get("input2").unwrap(), ["other"]);
        assert!(spec.get("param").is_none());
        assert_eq!(defaults["param"], json!({"default": 5}));
    }

    #[test]
    fn test_collect_connect_before_in() {
        let mut spec = ConnectionSpec::new();
        collect_declared(
            "step 2",
            json!({"a": "reads"}).as_object().cloned(),
            json!({"b": "other"}).as_object().cloned(),
            &mut spec,
        )
        .unwrap();
        assert_eq!(spec.len(), 2);
    }

    #[test]
    fn test_collect_rejects_bad_in_mapping() {
        let mut spec = ConnectionSpec::new();
        let err = collect_declared(
            "step 2",
            None,
            json!({"input1": {"value": 3}}).as_object().cloned(),
            &mut spec,
        )
        .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidStepInput { .. }));
    }

    #[test]
    fn test_replace_links_nested_and_repeat() {
        let mut spec = ConnectionSpec::new();
        let state = json!({
            "input1": {"$link": "reads"},
            "cond": {"select": "yes", "inner": {"$link": "other/out"}},
            "queries": [
                {"input2": {"$link": "reads"}},
                {"input2": {"$link": "other"}}
            ],
            "count": 3
        });

        let replaced = replace_links("step 2", state, &StatePath::root(), &mut spec).unwrap();

        assert_eq!(replaced["input1"], runtime_value());
        assert_eq!(replaced["cond"]["select"], "yes");
        assert_eq!(replaced["cond"]["inner"], runtime_value());
        assert_eq!(replaced["queries"][1]["input2"], runtime_value());
        assert_eq!(replaced["count"], 3);

        assert_eq!(spec.get("input1").unwrap(), ["reads"]);
        assert_eq!(spec.get("cond|inner").unwrap(), ["other/out"]);
        assert_eq!(spec.get("queries_0|input2").unwrap(), ["reads"]);
        assert_eq!(spec.get("queries_1|input2").unwrap(), ["other"]);
    }

    #[test]
    fn test_replace_links_list_of_links_share_key() {
        let mut spec = ConnectionSpec::new();
        let state = json!({"inputs": [{"$link": "reads"}, {"$link": "other"}]});

        let replaced = replace_links("step 2", state, &StatePath::root(), &mut spec).unwrap();

        assert_eq!(replaced["inputs"], json!([null, null]));
        assert_eq!(spec.get("inputs").unwrap(), ["reads", "other"]);
        assert!(spec.get("inputs_0").is_none());
    }

    #[test]
    fn test_replace_links_rejects_non_string_target() {
        let mut spec = ConnectionSpec::new();
        let state = json!({"input1": {"$link": 3}});
        assert!(replace_links("step 2", state, &StatePath::root(), &mut spec).is_err());
    }

    #[test]
    fn test_resolve_connections() {
        let arena = arena();
        let mut spec = ConnectionSpec::new();
        spec.push("input1", "reads");
        spec.push("input1", "other/out_file1");
        spec.push("$step", "reads");

        let resolved = resolve_connections(&arena, arena.root(), None, spec).unwrap();

        assert_eq!(
            resolved["input1"],
            vec![
                ConnectionRef::new(0, "output"),
                ConnectionRef::new(1, "out_file1")
            ]
        );
        assert_eq!(
            resolved[NO_INPUT_OUTPUT_NAME],
            vec![ConnectionRef::new(0, NO_INPUT_OUTPUT_NAME)]
        );
    }

    #[test]
    fn test_resolve_connections_unknown_reference() {
        let arena = arena();
        let mut spec = ConnectionSpec::new();
        spec.push("input1", "ghost/output");
        let err = resolve_connections(&arena, arena.root(), None, spec).unwrap_err();
        assert!(err.to_string().contains("ghost/output"));
    }

    #[test]
    fn test_resolve_connections_into_subworkflow() {
        let mut arena = arena();
        let root = arena.root();
        let inner = arena.subworkflow_scope(root, 2);
        arena.register_label(inner, "inner_input", 0).unwrap();
        arena.set_step_count(inner, 2);

        let mut spec = ConnectionSpec::new();
        spec.push("inner_input", "reads");
        let resolved = resolve_connections(&arena, root, Some(inner), spec).unwrap();

        let connection = &resolved["inner_input"][0];
        assert_eq!(connection.id, 0);
        assert_eq!(connection.input_subworkflow_step_id, Some(0));
    }

    #[test]
    fn test_resolve_connections_unknown_subworkflow_input() {
        let mut arena = arena();
        let root = arena.root();
        let inner = arena.subworkflow_scope(root, 2);
        arena.set_step_count(inner, 1);

        let mut spec = ConnectionSpec::new();
        spec.push("missing_input", "reads");
        assert!(resolve_connections(&arena, root, Some(inner), spec).is_err());
    }
}
