//! Conversion Scopes
//!
//! Each workflow level (the outer workflow, and every inlined subworkflow) owns
//! a scope mapping step labels to step ids. Scopes live in an arena and refer
//! to their parent by index, so the tree of nested subworkflows is explicit and
//! ownership stays acyclic.
//!
//! Lookups never walk up to the parent: a reference resolves only within the
//! scope it was written in.

use indexmap::IndexMap;
use log::{debug, warn};

use super::error::{ConversionError, Result};

/// Output name assumed when a reference names only a step.
pub const DEFAULT_OUTPUT_NAME: &str = "output";

/// Index of a scope inside a [`ContextArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    labels: IndexMap<String, usize>,
    /// Number of steps once indexed; `None` for scopes whose body is external
    step_count: Option<usize>,
    /// Subworkflow scopes keyed by the step id that owns them
    children: IndexMap<usize, ScopeId>,
}

/// Arena of label scopes for one conversion.
#[derive(Debug)]
pub struct ContextArena {
    scopes: Vec<Scope>,
}

impl ContextArena {
    /// Creates an arena holding only the root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0].parent
    }

    /// Nesting depth; the root scope is depth 0.
    pub fn depth(&self, scope: ScopeId) -> usize {
        let mut depth = 0;
        let mut current = scope;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Returns the scope of the subworkflow owned by `step_id`, creating it on first use.
    pub fn subworkflow_scope(&mut self, parent: ScopeId, step_id: usize) -> ScopeId {
        if let Some(existing) = self.scopes[parent.0].children.get(&step_id) {
            return *existing;
        }
        let child = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            ..Scope::default()
        });
        self.scopes[parent.0].children.insert(step_id, child);
        debug!(
            "Created scope {} for subworkflow step {} (depth {})",
            child.0,
            step_id,
            self.depth(child)
        );
        child
    }

    /// Records how many steps a scope holds, bounding numeric references.
    pub fn set_step_count(&mut self, scope: ScopeId, count: usize) {
        self.scopes[scope.0].step_count = Some(count);
    }

    /// Registers a step label. Labels are unique within a scope.
    pub fn register_label(&mut self, scope: ScopeId, label: &str, id: usize) -> Result<()> {
        let labels = &mut self.scopes[scope.0].labels;
        if let Some(first) = labels.get(label) {
            return Err(ConversionError::DuplicateLabel {
                label: label.to_string(),
                first: *first,
                second: id,
            });
        }
        labels.insert(label.to_string(), id);
        Ok(())
    }

    /// Resolves a label or a numeric step id within a scope.
    pub fn step_id(&self, scope: ScopeId, label_or_id: &str) -> Result<usize> {
        let entry = &self.scopes[scope.0];
        if let Some(id) = entry.labels.get(label_or_id) {
            return Ok(*id);
        }

        let unresolved = || ConversionError::UnresolvedReference {
            reference: label_or_id.to_string(),
        };
        let id: usize = label_or_id.trim().parse().map_err(|_| unresolved())?;
        match entry.step_count {
            Some(count) if id >= count => Err(unresolved()),
            _ => Ok(id),
        }
    }

    /// Resolves `step`, `step/output` or legacy `step#output` to a step id and output name.
    ///
    /// A reference with more than one `/` is rejected.
    pub fn step_output(&self, scope: ScopeId, reference: &str) -> Result<(usize, String)> {
        let normalized = if !reference.contains('/') && reference.contains('#') {
            warn!(
                "Legacy connection syntax '{}', use 'step/output' instead",
                reference
            );
            reference.replacen('#', "/", 1)
        } else {
            reference.to_string()
        };

        let (step, output) = match normalized.split_once('/') {
            Some((_, output)) if output.contains('/') => {
                return Err(ConversionError::MalformedReference {
                    reference: reference.to_string(),
                })
            }
            Some((step, output)) => (step, output),
            None => (normalized.as_str(), DEFAULT_OUTPUT_NAME),
        };

        let id = self
            .step_id(scope, step)
            .map_err(|_| ConversionError::UnresolvedReference {
                reference: reference.to_string(),
            })?;
        Ok((id, output.to_string()))
    }
}

impl Default for ContextArena {
    fn default() -> Self {
        Self::new()
    }
}
