//! Workflow Loader
//!
//! Reads Format 2 documents from disk and resolves the indirections a `run`
//! action may carry: `@import` of a file relative to the workflow directory,
//! and `#id` references into a `$graph` document.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use serde_json::Value;

use super::error::{ConversionError, Result};
use crate::workflow::NativeWorkflow;

/// Parses YAML (or JSON, a YAML subset) text into an ordered value tree.
pub fn parse_document(text: &str) -> Result<Value> {
    Ok(serde_yaml::from_str(text)?)
}

/// Loads a workflow document from a file.
///
/// # Example
///
/// ```rust,no_run
/// use gxcompiler::format2::load_document;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let document = load_document("workflow.gxwf.yml")?;
///     println!("class: {}", document["class"]);
///     Ok(())
/// }
/// ```
pub fn load_document(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Workflow content loaded ({} bytes)", content.len());

    parse_document(&content)
}

/// Resolves an `{"@import": path}` run action against the workflow directory.
///
/// Any other run action is returned unchanged with no path. An import also
/// returns the canonical path of the file it read, which is read eagerly on
/// every call.
pub fn resolve_import(run: Value, workflow_directory: &Path) -> Result<(Value, Option<PathBuf>)> {
    let Value::Object(map) = &run else {
        return Ok((run, None));
    };
    let Some(target) = map.get("@import") else {
        return Ok((run, None));
    };
    if map.len() > 1 {
        return Err(ConversionError::ImportWithSiblings);
    }

    let relative = match target {
        Value::String(path) => path.clone(),
        other => {
            return Err(ConversionError::InvalidDocument(format!(
                "@import path must be a string, found {}",
                other
            )))
        }
    };

    let path = workflow_directory.join(&relative);
    debug!("Importing run action from {}", path.display());
    let content = fs::read_to_string(&path).map_err(|source| ConversionError::Import {
        path: path.clone(),
        source,
    })?;
    let document = parse_document(&content)?;
    let canonical = fs::canonicalize(&path).unwrap_or(path);
    Ok((document, Some(canonical)))
}

/// Splits a `$graph` document into its `main` workflow and the other entries
/// keyed by id. Documents without `$graph` are returned as the main workflow.
pub fn split_graph(document: Value) -> Result<(Value, IndexMap<String, Value>)> {
    let Value::Object(mut map) = document else {
        return Ok((document, IndexMap::new()));
    };
    let Some(graph) = map.remove("$graph") else {
        return Ok((Value::Object(map), IndexMap::new()));
    };

    let Value::Array(entries) = graph else {
        return Err(ConversionError::InvalidDocument(
            "$graph must be a list of workflows".to_string(),
        ));
    };

    let mut graph_ids = IndexMap::new();
    for entry in entries {
        let id = match entry.get("id") {
            Some(Value::String(id)) => id.trim_start_matches('#').to_string(),
            _ => {
                return Err(ConversionError::InvalidDocument(
                    "every $graph entry must define a string id".to_string(),
                ))
            }
        };
        graph_ids.insert(id, entry);
    }

    let main = graph_ids
        .shift_remove("main")
        .ok_or(ConversionError::MissingMainGraph)?;
    info!("$graph document with {} additional workflows", graph_ids.len());
    Ok((main, graph_ids))
}

/// Saves a lowered workflow as indented JSON.
pub fn save_native(workflow: &NativeWorkflow, path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    let json = workflow.to_json_pretty()?;
    fs::write(path, json)?;
    info!("Native workflow saved to: {}", path.display());
    Ok(())
}
