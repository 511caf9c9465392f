//! Calibration documents for the rule engine and the checks they must pass.

use super::document::RuleDocument;
use super::error::RuleError;
use super::RebuiltCollection;

/// Two flat datasets listed by identifier.
pub const FLAT_LIST: &str = r#"
rules:
  rules:
    - type: add_column_metadata
      value: identifier0
  mapping:
    - type: list_identifiers
      columns: [0]
test_data:
  type: list
  elements:
    - identifier: i1
      contents: "0"
      class: File
    - identifier: i2
      contents: "1"
      class: File
"#;

/// A `list:paired` source flattened into a list by concatenating identifiers.
pub const FLATTEN_PAIRED: &str = r#"
rules:
  rules:
    - type: add_column_metadata
      value: identifier0
    - type: add_column_metadata
      value: identifier1
    - type: add_column_concatenate
      target_column_0: 0
      target_column_1: 1
  mapping:
    - type: list_identifiers
      columns: [2]
test_data:
  type: "list:paired"
  elements:
    - identifier: test0
      elements:
        - identifier: forward
          class: File
          contents: TestData123
        - identifier: reverse
          class: File
          contents: TestData123
"#;

/// Datasets nested under the value of their `group:type:` tag.
pub const GROUP_TAG_NESTING: &str = r#"
rules:
  rules:
    - type: add_column_metadata
      value: identifier0
    - type: add_column_group_tag_value
      value: type
      default_value: unused
  mapping:
    - type: list_identifiers
      columns: [1, 0]
test_data:
  type: list
  elements:
    - identifier: i1
      contents: "0"
      class: File
      tags: ["random", "group:type:single"]
    - identifier: i2
      contents: "1"
      class: File
      tags: ["random", "group:type:paired"]
"#;

/// Lone children of every spelling degrade to `unpaired`.
pub const PAIRED_OR_UNPAIRED: &str = r#"
rules:
  rules:
    - type: add_column_metadata
      value: identifier0
    - type: add_column_metadata
      value: identifier1
  mapping:
    - type: list_identifiers
      columns: [0]
    - type: paired_or_unpaired_identifier
      columns: [1]
test_data:
  type: "list:list"
  elements:
    - identifier: sample1
      elements:
        - identifier: forward
          class: File
          contents: sample1 forward
        - identifier: reverse
          class: File
          contents: sample1 reverse
    - identifier: sample2
      elements:
        - identifier: unpaired
          class: File
          contents: sample2 unpaired
    - identifier: sample3
      elements:
        - identifier: u
          class: File
          contents: sample3 unpaired
    - identifier: sample4
      elements:
        - identifier: forward
          class: File
          contents: sample4 forward
"#;

/// Flat sample sheet nested by its first sheet column.
pub const SAMPLE_SHEET_TO_NESTED_LIST: &str = r#"
rules:
  rules:
    - type: add_column_from_sample_sheet_index
      value: 0
    - type: add_column_metadata
      value: identifier0
  mapping:
    - type: list_identifiers
      columns: [0, 1]
test_data:
  type: sample_sheet
  elements:
    - identifier: i1
      contents: "0"
      class: File
    - identifier: i2
      contents: "1"
      class: File
    - identifier: i3
      contents: "2"
      class: File
  rows:
    i1: ["treat1"]
    i2: ["treat2"]
    i3: ["treat1"]
"#;

/// Every element renamed to the same identifier.
pub const DUPLICATE_IDENTIFIERS: &str = r#"
rules:
  rules:
    - type: add_column_value
      value: same
  mapping:
    - type: list_identifiers
      columns: [0]
test_data:
  type: list
  elements:
    - identifier: i1
      class: File
    - identifier: i2
      class: File
"#;

/// Strict pairing over a role it does not accept.
pub const STRICT_INVALID_ROLE: &str = r#"
rules:
  rules:
    - type: add_column_metadata
      value: identifier0
    - type: add_column_metadata
      value: identifier1
  mapping:
    - type: list_identifiers
      columns: [0]
    - type: paired_identifier
      columns: [1]
test_data:
  type: "list:list"
  elements:
    - identifier: sample1
      elements:
        - identifier: forward
          class: File
        - identifier: u
          class: File
"#;

fn run(document: &str) -> Result<RebuiltCollection, RuleError> {
    RuleDocument::from_yaml(document)?.run()
}

#[test]
fn test_flat_list() {
    let collection = run(FLAT_LIST).unwrap();
    assert_eq!(collection.collection_type, "list");
    assert_eq!(collection.element_count(), 2);

    let first = collection.elements[0].as_dataset().unwrap();
    assert!(first.hid > 3);
    assert_eq!(first.contents, Some(serde_json::json!("0")));
}

#[test]
fn test_flatten_paired() {
    let collection = run(FLATTEN_PAIRED).unwrap();
    assert_eq!(collection.collection_type, "list");
    assert_eq!(collection.identifiers(), vec!["test0forward", "test0reverse"]);
}

#[test]
fn test_group_tag_nesting() {
    let collection = run(GROUP_TAG_NESTING).unwrap();
    assert_eq!(collection.collection_type, "list:list");
    assert_eq!(collection.elements[0].element_identifier, "single");

    let inner = collection.elements[0].as_collection().unwrap();
    assert_eq!(inner.elements[0].element_identifier, "i1");
    assert_eq!(inner.elements[0].as_dataset().unwrap().tags.len(), 0);
}

#[test]
fn test_paired_or_unpaired() {
    let collection = run(PAIRED_OR_UNPAIRED).unwrap();
    assert_eq!(collection.collection_type, "list:paired_or_unpaired");

    let sample1 = collection.get("sample1").unwrap().as_collection().unwrap();
    assert_eq!(sample1.collection_type, "paired_or_unpaired");
    assert_eq!(sample1.identifiers(), vec!["forward", "reverse"]);

    for sample in ["sample2", "sample3", "sample4"] {
        let degraded = collection.get(sample).unwrap().as_collection().unwrap();
        assert_eq!(degraded.collection_type, "paired_or_unpaired");
        assert_eq!(degraded.identifiers(), vec!["unpaired"]);
    }

    let sample4 = collection.get("sample4").unwrap().as_collection().unwrap();
    assert_eq!(
        sample4.elements[0].as_dataset().unwrap().contents,
        Some(serde_json::json!("sample4 forward"))
    );
}

#[test]
fn test_sample_sheet_to_nested_list() {
    let collection = run(SAMPLE_SHEET_TO_NESTED_LIST).unwrap();
    assert_eq!(collection.collection_type, "list:list");
    assert_eq!(collection.identifiers(), vec!["treat1", "treat2"]);

    let treat1 = collection.get("treat1").unwrap().as_collection().unwrap();
    assert_eq!(treat1.identifiers(), vec!["i1", "i3"]);
    let treat2 = collection.get("treat2").unwrap().as_collection().unwrap();
    assert_eq!(treat2.element_count(), 1);
}

#[test]
fn test_duplicate_identifiers() {
    match run(DUPLICATE_IDENTIFIERS) {
        Err(RuleError::DuplicateIdentifier { path, first, second }) => {
            assert_eq!(path, "same");
            assert_eq!((first.as_str(), second.as_str()), ("i1", "i2"));
        }
        other => panic!("expected duplicate identifier error, got {:?}", other),
    }
}

#[test]
fn test_strict_invalid_role() {
    assert!(matches!(
        run(STRICT_INVALID_ROLE),
        Err(RuleError::InvalidPairRole { ref role, .. }) if role == "u"
    ));
}

#[test]
fn test_rebuild_is_deterministic() {
    let first = serde_json::to_string(&run(PAIRED_OR_UNPAIRED).unwrap()).unwrap();
    let second = serde_json::to_string(&run(PAIRED_OR_UNPAIRED).unwrap()).unwrap();
    assert_eq!(first, second);
    assert!(first.contains("\"element_type\":\"dataset_collection\""));
}
