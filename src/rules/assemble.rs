//! Collection Assembler
//!
//! Groups mapped elements by identifier path into a nested collection. Each
//! list level groups by one identifier in first-appearance order; a mapped
//! pairing column adds an innermost level whose shape is chosen by
//! [`decide_pairing`].

use std::collections::HashMap;

use indexmap::IndexMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use serde::Serialize;

use super::error::{Result, RuleError};
use super::history::{DatasetSink, RebuiltDataset};
use super::mapping::{IdentifierMapping, MappedElement, PairingMode};
use super::source::SourceRecord;

const FORWARD: &str = "forward";
const REVERSE: &str = "reverse";
const UNPAIRED: &str = "unpaired";

/// Normalized pairing role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairRole {
    Forward,
    Reverse,
    Unpaired,
    /// Accepted only when pairing is relaxed
    Literal(String),
}

impl PairRole {
    fn is_paired(&self) -> bool {
        matches!(self, Self::Forward | Self::Reverse)
    }
}

/// Role spellings, matched case-insensitively.
static ROLE_ALIASES: Lazy<HashMap<&'static str, PairRole>> = Lazy::new(|| {
    let mut aliases = HashMap::new();
    for alias in ["f", "1", "r1", "forward"] {
        aliases.insert(alias, PairRole::Forward);
    }
    for alias in ["r", "2", "r2", "reverse"] {
        aliases.insert(alias, PairRole::Reverse);
    }
    for alias in ["u", "unpaired"] {
        aliases.insert(alias, PairRole::Unpaired);
    }
    aliases
});

/// Normalizes a raw role value; strict pairing rejects anything but forward and reverse.
pub fn normalize_role(raw: &str, mode: PairingMode, path: &str) -> Result<PairRole> {
    let role = ROLE_ALIASES
        .get(raw.trim().to_ascii_lowercase().as_str())
        .cloned()
        .unwrap_or_else(|| PairRole::Literal(raw.to_string()));

    match mode {
        PairingMode::Strict if !role.is_paired() => Err(RuleError::InvalidPairRole {
            path: path.to_string(),
            role: raw.to_string(),
        }),
        _ => Ok(role),
    }
}

/// How the children of one pairing node are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingDecision {
    /// Both halves present, indices of the forward and reverse children
    Paired { forward: usize, reverse: usize },
    /// A single child, relabeled `unpaired`
    Unpaired { chosen: usize },
}

/// The pairing decision table.
///
/// | children                      | strict           | relaxed                        |
/// |-------------------------------|------------------|--------------------------------|
/// | exactly forward and reverse   | paired           | paired                         |
/// | one child                     | `None` (fatal)   | that child, unpaired           |
/// | two or more, otherwise        | `None` (fatal)   | first non-forward/reverse child, unpaired |
pub fn decide_pairing(roles: &[PairRole], mode: PairingMode) -> Option<PairingDecision> {
    let position = |wanted: &PairRole| roles.iter().position(|role| role == wanted);

    match (roles.len(), position(&PairRole::Forward), position(&PairRole::Reverse)) {
        (2, Some(forward), Some(reverse)) => Some(PairingDecision::Paired { forward, reverse }),
        _ if mode == PairingMode::Strict => None,
        (1, _, _) => Some(PairingDecision::Unpaired { chosen: 0 }),
        (0, _, _) => None,
        _ => {
            let chosen = roles.iter().position(|role| !role.is_paired()).unwrap_or(0);
            Some(PairingDecision::Unpaired { chosen })
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    Hda,
    DatasetCollection,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ElementObject {
    Dataset(RebuiltDataset),
    Collection(RebuiltCollection),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RebuiltElement {
    pub element_identifier: String,
    pub element_type: ElementType,
    pub object: ElementObject,
}

impl RebuiltElement {
    pub fn as_dataset(&self) -> Option<&RebuiltDataset> {
        match &self.object {
            ElementObject::Dataset(dataset) => Some(dataset),
            ElementObject::Collection(_) => None,
        }
    }

    pub fn as_collection(&self) -> Option<&RebuiltCollection> {
        match &self.object {
            ElementObject::Collection(collection) => Some(collection),
            ElementObject::Dataset(_) => None,
        }
    }
}

/// A rebuilt, possibly nested, collection.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RebuiltCollection {
    pub collection_type: String,
    pub elements: Vec<RebuiltElement>,
}

impl RebuiltCollection {
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn get(&self, identifier: &str) -> Option<&RebuiltElement> {
        self.elements
            .iter()
            .find(|element| element.element_identifier == identifier)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.elements
            .iter()
            .map(|element| element.element_identifier.as_str())
            .collect()
    }
}

struct Assembler<'a, 's> {
    mapping: &'a IdentifierMapping,
    elements: &'a [MappedElement],
    records: &'a [SourceRecord],
    sink: &'s mut dyn DatasetSink,
    levels: Vec<&'static str>,
}

impl Assembler<'_, '_> {
    fn collection_type(&self, level: usize) -> String {
        self.levels[level..].join(":")
    }

    fn key(&self, member: usize, level: usize) -> &str {
        let element = &self.elements[member];
        match element.path.get(level) {
            Some(identifier) => identifier,
            None => element.role.as_deref().unwrap_or_default(),
        }
    }

    fn source_path(&self, member: usize) -> String {
        self.records[self.elements[member].source].display_path()
    }

    fn group(&self, members: &[usize], level: usize) -> IndexMap<String, Vec<usize>> {
        let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
        for member in members {
            groups
                .entry(self.key(*member, level).to_string())
                .or_default()
                .push(*member);
        }
        groups
    }

    fn duplicate(&self, path: String, members: &[usize]) -> RuleError {
        RuleError::DuplicateIdentifier {
            path,
            first: self.source_path(members[0]),
            second: self.source_path(members[1]),
        }
    }

    fn leaf(&mut self, identifier: String, member: usize) -> RebuiltElement {
        let element = &self.elements[member];
        let dataset = self
            .sink
            .copy_dataset(&self.records[element.source].dataset, element.tags.clone());
        RebuiltElement {
            element_identifier: identifier,
            element_type: ElementType::Hda,
            object: ElementObject::Dataset(dataset),
        }
    }

    fn build_level(&mut self, members: &[usize], level: usize, prefix: &[String]) -> Result<Vec<RebuiltElement>> {
        if level == self.mapping.list_columns.len() {
            if let Some(mode) = self.mapping.pairing_mode() {
                return self.build_pair(members, mode, prefix);
            }
        }

        let innermost = level + 1 == self.levels.len();
        let mut built = Vec::new();
        for (identifier, group) in self.group(members, level) {
            let mut path = prefix.to_vec();
            path.push(identifier.clone());

            if innermost {
                if group.len() > 1 {
                    return Err(self.duplicate(path.join("/"), &group));
                }
                built.push(self.leaf(identifier, group[0]));
            } else {
                let elements = self.build_level(&group, level + 1, &path)?;
                built.push(RebuiltElement {
                    element_identifier: identifier,
                    element_type: ElementType::DatasetCollection,
                    object: ElementObject::Collection(RebuiltCollection {
                        collection_type: self.collection_type(level + 1),
                        elements,
                    }),
                });
            }
        }
        Ok(built)
    }

    fn build_pair(&mut self, members: &[usize], mode: PairingMode, prefix: &[String]) -> Result<Vec<RebuiltElement>> {
        let level = prefix.len();
        let path = prefix.join("/");
        let groups = self.group(members, level);

        let mut children = Vec::with_capacity(groups.len());
        let mut roles = Vec::with_capacity(groups.len());
        for (raw, group) in &groups {
            if group.len() > 1 {
                let mut duplicate_path = prefix.to_vec();
                duplicate_path.push(raw.clone());
                return Err(self.duplicate(duplicate_path.join("/"), group));
            }
            roles.push(normalize_role(raw, mode, &path)?);
            children.push((raw.clone(), group[0]));
        }

        let decision = decide_pairing(&roles, mode).ok_or_else(|| RuleError::IncompletePair {
            path: path.clone(),
            roles: children
                .iter()
                .map(|(raw, _)| raw.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })?;

        match decision {
            PairingDecision::Paired { forward, reverse } => Ok(vec![
                self.leaf(FORWARD.to_string(), children[forward].1),
                self.leaf(REVERSE.to_string(), children[reverse].1),
            ]),
            PairingDecision::Unpaired { chosen } => {
                let (raw, member) = &children[chosen];
                if children.len() > 1 {
                    warn!(
                        "'{}': {} children are not a forward/reverse pair, keeping '{}' as unpaired",
                        path,
                        children.len(),
                        raw
                    );
                } else if roles[chosen] != PairRole::Unpaired {
                    warn!("'{}': lone '{}' element relabeled unpaired", path, raw);
                }
                Ok(vec![self.leaf(UNPAIRED.to_string(), *member)])
            }
        }
    }
}

fn level_types(mapping: &IdentifierMapping) -> Vec<&'static str> {
    let mut levels: Vec<&'static str> = (0..mapping.list_columns.len())
        .map(|level| {
            if level == 0 && mapping.sample_sheet {
                "sample_sheet"
            } else {
                "list"
            }
        })
        .collect();
    match mapping.pairing_mode() {
        Some(PairingMode::Strict) => levels.push("paired"),
        Some(PairingMode::Relaxed) => levels.push("paired_or_unpaired"),
        None => {}
    }
    levels
}

/// Assembles mapped elements into a collection, copying leaf datasets through `sink`.
pub fn assemble(
    mapping: &IdentifierMapping,
    elements: &[MappedElement],
    records: &[SourceRecord],
    sink: &mut dyn DatasetSink,
) -> Result<RebuiltCollection> {
    let levels = level_types(mapping);
    let mut assembler = Assembler {
        mapping,
        elements,
        records,
        sink,
        levels,
    };

    let members: Vec<usize> = (0..elements.len()).collect();
    let built = assembler.build_level(&members, 0, &[])?;
    let collection = RebuiltCollection {
        collection_type: assembler.collection_type(0),
        elements: built,
    };
    debug!(
        "Assembled '{}' collection with {} top-level elements",
        collection.collection_type,
        collection.element_count()
    );
    Ok(collection)
}
