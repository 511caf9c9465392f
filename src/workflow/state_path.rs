//! Structured Tool State Paths
//!
//! Tool state is a tree of conditionals and repeats. Connections into that
//! tree are keyed on the wire by a flattened string: nested fields joined with
//! `|` and repeat instances suffixed with `_N` (`queries_0|input2`).
//!
//! The converter carries a [`StatePath`] while walking state and only renders
//! the flattened form when a connection key is emitted.

use std::fmt;

/// One step down into a tool state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// A named parameter, section or conditional.
    Field(String),
    /// The Nth instance of the enclosing repeat.
    RepeatIndex(usize),
}

/// Location of a parameter within a tool state tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePath {
    segments: Vec<PathSegment>,
}

impl StatePath {
    /// The path of the state root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns this path extended by a named field.
    pub fn field(&self, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Field(key.into()));
        Self { segments }
    }

    /// Returns this path extended by a repeat instance index.
    pub fn repeat(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::RepeatIndex(index));
        Self { segments }
    }

    /// Renders the legacy wire key.
    pub fn flatten(&self) -> String {
        let mut key = String::new();
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    if !key.is_empty() {
                        key.push('|');
                    }
                    key.push_str(name);
                }
                PathSegment::RepeatIndex(index) => {
                    key.push('_');
                    key.push_str(&index.to_string());
                }
            }
        }
        key
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_flattens_to_empty() {
        assert_eq!(StatePath::root().flatten(), "");
    }

    #[test]
    fn test_nested_fields_join_with_pipe() {
        let path = StatePath::root().field("cond").field("input1");
        assert_eq!(path.flatten(), "cond|input1");
    }

    #[test]
    fn test_repeat_index_suffixes_previous_field() {
        let path = StatePath::root().field("queries").repeat(0).field("input2");
        assert_eq!(path.flatten(), "queries_0|input2");
        assert_eq!(
            path,
            StatePath::root().field("queries").repeat(0).field("input2")
        );
    }

    #[test]
    fn test_repeat_at_root() {
        assert_eq!(StatePath::root().repeat(2).flatten(), "_2");
    }

    #[test]
    fn test_display_matches_flatten() {
        let path = StatePath::root().field("a").repeat(1).field("b").repeat(3);
        assert_eq!(path.to_string(), "a_1|b_3");
    }
}
