//! Identifier Mapper
//!
//! Reads the mapping declarations against a finished column table and turns
//! every row into an element: its identifier path, its pairing role and the
//! tags the rebuilt dataset will carry.

use log::debug;

use super::apply::ColumnTable;
use super::definition::MappingEntry;
use super::error::{Result, RuleError};

/// How pairing roles are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingMode {
    /// `paired_identifier`: only forward and reverse
    Strict,
    /// `paired_or_unpaired_identifier`: lone and odd roles degrade to unpaired
    Relaxed,
}

/// Validated mapping declarations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentifierMapping {
    pub list_columns: Vec<usize>,
    pub sample_sheet: bool,
    pub pairing: Option<(PairingMode, usize)>,
    pub tag_columns: Vec<usize>,
    pub group_tag_columns: Vec<usize>,
}

/// A row placed in the output collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedElement {
    /// List identifiers, outermost first
    pub path: Vec<String>,
    /// Raw pairing role, when a pairing column is mapped
    pub role: Option<String>,
    pub tags: Vec<String>,
    /// Index of the source record
    pub source: usize,
}

fn check_columns(mapping: &'static str, columns: &[usize], width: usize) -> Result<()> {
    match columns.iter().find(|column| **column >= width) {
        Some(column) => Err(RuleError::MappingColumn {
            mapping,
            column: *column,
            width,
        }),
        None => Ok(()),
    }
}

fn pairing_column(mapping: &'static str, columns: &[usize]) -> Result<usize> {
    match columns {
        [column] => Ok(*column),
        _ => Err(RuleError::PairingColumns {
            mapping,
            found: columns.len(),
        }),
    }
}

impl IdentifierMapping {
    /// Validates mapping entries against a table of `width` columns.
    pub fn from_entries(entries: &[MappingEntry], width: usize) -> Result<Self> {
        let mut mapping = Self::default();
        let mut has_list = false;

        for entry in entries {
            match entry {
                MappingEntry::ListIdentifiers {
                    columns,
                    sample_sheet,
                } => {
                    if has_list {
                        return Err(RuleError::DuplicateMapping("list_identifiers"));
                    }
                    check_columns("list_identifiers", columns, width)?;
                    has_list = true;
                    mapping.list_columns = columns.clone();
                    mapping.sample_sheet = *sample_sheet;
                }
                MappingEntry::PairedIdentifier { columns } => {
                    mapping.set_pairing(PairingMode::Strict, "paired_identifier", columns, width)?;
                }
                MappingEntry::PairedOrUnpairedIdentifier { columns } => {
                    mapping.set_pairing(
                        PairingMode::Relaxed,
                        "paired_or_unpaired_identifier",
                        columns,
                        width,
                    )?;
                }
                MappingEntry::Tags { columns } => {
                    check_columns("tags", columns, width)?;
                    mapping.tag_columns.extend(columns);
                }
                MappingEntry::GroupTags { columns } => {
                    check_columns("group_tags", columns, width)?;
                    mapping.group_tag_columns.extend(columns);
                }
                MappingEntry::Other => {}
            }
        }

        if mapping.list_columns.is_empty() && mapping.pairing.is_none() {
            return Err(RuleError::NoIdentifierMapping);
        }
        Ok(mapping)
    }

    fn set_pairing(
        &mut self,
        mode: PairingMode,
        name: &'static str,
        columns: &[usize],
        width: usize,
    ) -> Result<()> {
        match self.pairing {
            Some((existing, _)) if existing == mode => return Err(RuleError::DuplicateMapping(name)),
            Some(_) => return Err(RuleError::ConflictingPairing),
            None => {}
        }
        let column = pairing_column(name, columns)?;
        check_columns(name, &[column], width)?;
        self.pairing = Some((mode, column));
        Ok(())
    }

    pub fn pairing_mode(&self) -> Option<PairingMode> {
        self.pairing.map(|(mode, _)| mode)
    }

    /// Number of identifier levels, including the pairing level.
    pub fn depth(&self) -> usize {
        self.list_columns.len() + usize::from(self.pairing.is_some())
    }
}

fn split_tags(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|tag| !tag.is_empty())
}

/// Maps every table row to an element.
pub fn map_rows(table: &ColumnTable, mapping: &IdentifierMapping) -> Vec<MappedElement> {
    let elements: Vec<MappedElement> = table
        .rows()
        .iter()
        .map(|row| {
            let path = mapping
                .list_columns
                .iter()
                .map(|column| row.cells[*column].clone())
                .collect();
            let role = mapping
                .pairing
                .map(|(_, column)| row.cells[column].clone());

            let mut tags: Vec<String> = Vec::new();
            for column in &mapping.tag_columns {
                tags.extend(split_tags(&row.cells[*column]).map(str::to_string));
            }
            for column in &mapping.group_tag_columns {
                tags.extend(split_tags(&row.cells[*column]).map(|tag| {
                    if tag.starts_with("group:") {
                        tag.to_string()
                    } else {
                        format!("group:{}", tag)
                    }
                }));
            }

            MappedElement {
                path,
                role,
                tags,
                source: row.source,
            }
        })
        .collect();

    debug!(
        "Mapped {} rows to {}-level identifier paths",
        elements.len(),
        mapping.depth()
    );
    elements
}
