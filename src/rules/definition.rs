//! Rule Definitions
//!
//! Declarative column rules and identifier mappings.
//!
//! # Example YAML Format
//!
//! ```yaml
//! rules:
//!   - type: add_column_metadata
//!     value: identifier0
//!   - type: add_column_regex
//!     target_column: 0
//!     expression: "(.*)_R[12]"
//!     group_count: 1
//! mapping:
//!   - type: list_identifiers
//!     columns: [1]
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rule set: column rules applied in order, then the identifier mapping.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default)]
    pub mapping: Vec<MappingEntry>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubstrType {
    KeepPrefix,
    DropPrefix,
    KeepSuffix,
    DropSuffix,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompareType {
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
}

impl CompareType {
    pub fn holds(&self, left: f64, right: f64) -> bool {
        match self {
            Self::LessThan => left < right,
            Self::LessThanEqual => left <= right,
            Self::GreaterThan => left > right,
            Self::GreaterThanEqual => left >= right,
        }
    }
}

/// One column rule. Columns are addressed by zero-based index.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    /// `identifierN`, `indexN` or `tags`
    AddColumnMetadata { value: String },

    AddColumnValue { value: Value },

    AddColumnConcatenate {
        target_column_0: usize,
        target_column_1: usize,
    },

    /// Value of the first `group:<value>:` tag
    AddColumnGroupTagValue {
        value: String,
        #[serde(default)]
        default_value: Option<String>,
    },

    AddColumnFromSampleSheetIndex { value: usize },

    AddColumnBasename { target_column: usize },

    AddColumnRownum {
        #[serde(default)]
        start: i64,
    },

    AddColumnRegex {
        target_column: usize,
        expression: String,
        #[serde(default)]
        replacement: Option<String>,
        #[serde(default)]
        group_count: Option<usize>,
        #[serde(default)]
        allow_unmatched: bool,
    },

    AddColumnSubstr {
        target_column: usize,
        length: usize,
        substr_type: SubstrType,
    },

    RemoveColumns { target_columns: Vec<usize> },

    AddFilterRegex {
        target_column: usize,
        expression: String,
        #[serde(default)]
        invert: bool,
    },

    AddFilterMatches {
        target_column: usize,
        value: String,
        #[serde(default)]
        invert: bool,
    },

    AddFilterCompare {
        target_column: usize,
        value: f64,
        compare_type: CompareType,
        #[serde(default)]
        invert: bool,
    },

    AddFilterEmpty {
        target_column: usize,
        #[serde(default)]
        invert: bool,
    },

    Sort {
        target_column: usize,
        #[serde(default)]
        numeric: bool,
        #[serde(default)]
        reverse: bool,
        /// Sort on a regex match within the column instead of the whole value
        #[serde(default)]
        expression: Option<String>,
        /// Named group of `expression` used as the key
        #[serde(default)]
        capture_group: Option<String>,
    },

    SwapColumns {
        target_column_0: usize,
        target_column_1: usize,
    },

    /// Splits every row in two, one keeping each column list
    SplitColumns {
        target_columns_0: Vec<usize>,
        target_columns_1: Vec<usize>,
    },
}

impl Rule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddColumnMetadata { .. } => "add_column_metadata",
            Self::AddColumnValue { .. } => "add_column_value",
            Self::AddColumnConcatenate { .. } => "add_column_concatenate",
            Self::AddColumnGroupTagValue { .. } => "add_column_group_tag_value",
            Self::AddColumnFromSampleSheetIndex { .. } => "add_column_from_sample_sheet_index",
            Self::AddColumnBasename { .. } => "add_column_basename",
            Self::AddColumnRownum { .. } => "add_column_rownum",
            Self::AddColumnRegex { .. } => "add_column_regex",
            Self::AddColumnSubstr { .. } => "add_column_substr",
            Self::RemoveColumns { .. } => "remove_columns",
            Self::AddFilterRegex { .. } => "add_filter_regex",
            Self::AddFilterMatches { .. } => "add_filter_matches",
            Self::AddFilterCompare { .. } => "add_filter_compare",
            Self::AddFilterEmpty { .. } => "add_filter_empty",
            Self::Sort { .. } => "sort",
            Self::SwapColumns { .. } => "swap_columns",
            Self::SplitColumns { .. } => "split_columns",
        }
    }
}

/// Assigns meaning to columns of the finished table.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingEntry {
    ListIdentifiers {
        columns: Vec<usize>,
        /// Types the outermost level as `sample_sheet`
        #[serde(default)]
        sample_sheet: bool,
    },
    PairedIdentifier {
        columns: Vec<usize>,
    },
    PairedOrUnpairedIdentifier {
        columns: Vec<usize>,
    },
    Tags {
        columns: Vec<usize>,
    },
    GroupTags {
        columns: Vec<usize>,
    },
    /// file_type, dbkey, name, url, ... have no effect on the structure
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rule_set() {
        let rule_set: RuleSet = serde_json::from_value(json!({
            "rules": [
                {"type": "add_column_metadata", "value": "identifier0"},
                {"type": "add_column_group_tag_value", "value": "type", "default_value": "unused"},
                {"type": "sort", "target_column": 0, "numeric": true}
            ],
            "mapping": [
                {"type": "list_identifiers", "columns": [1, 0], "editable": true},
                {"type": "file_type", "columns": [2]}
            ]
        }))
        .unwrap();

        assert_eq!(rule_set.rules.len(), 3);
        assert_eq!(rule_set.rules[1].name(), "add_column_group_tag_value");
        assert_eq!(
            rule_set.mapping[0],
            MappingEntry::ListIdentifiers {
                columns: vec![1, 0],
                sample_sheet: false
            }
        );
        assert_eq!(rule_set.mapping[1], MappingEntry::Other);
    }

    #[test]
    fn test_unknown_rule_rejected() {
        let result: Result<Rule, _> = serde_json::from_value(json!({"type": "add_column_magic"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_compare_types() {
        assert!(CompareType::LessThan.holds(1.0, 2.0));
        assert!(!CompareType::GreaterThan.holds(2.0, 2.0));
        assert!(CompareType::GreaterThanEqual.holds(2.0, 2.0));
    }
}
