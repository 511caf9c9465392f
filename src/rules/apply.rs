//! Column Table Builder
//!
//! Applies column rules in declaration order to a table holding one row per
//! source record. Every rule either appends a column, rewrites the column set,
//! or filters and reorders rows. Column references are checked when the rule
//! runs, so a rule may only use columns produced by the rules before it.

use std::cmp::Ordering;

use indexmap::IndexMap;
use log::debug;
use regex::Regex;
use serde_json::Value;

use super::definition::{Rule, SubstrType};
use super::error::{Result, RuleError};
use super::source::SourceRecord;

/// Sample sheet rows keyed by the outermost source identifier.
pub type SampleSheet = IndexMap<String, Vec<Value>>;

/// A table row and the source record it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub source: usize,
    pub cells: Vec<String>,
}

/// The column table built by the rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTable {
    width: usize,
    rows: Vec<Row>,
}

impl ColumnTable {
    /// A table with one empty row per source record.
    pub fn for_sources(count: usize) -> Self {
        Self {
            width: 0,
            rows: (0..count)
                .map(|source| Row {
                    source,
                    cells: Vec::new(),
                })
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn check_column(&self, rule: usize, column: usize) -> Result<usize> {
        if column >= self.width {
            return Err(RuleError::UnknownColumn {
                rule,
                column,
                width: self.width,
            });
        }
        Ok(column)
    }

    /// Appends `count` columns computed per row.
    fn extend_columns<F>(&mut self, count: usize, mut derive: F) -> Result<()>
    where
        F: FnMut(usize, &Row) -> Result<Vec<String>>,
    {
        for (position, row) in self.rows.iter_mut().enumerate() {
            let values = derive(position, row)?;
            row.cells.extend(values);
        }
        self.width += count;
        Ok(())
    }

    fn add_column<F>(&mut self, mut derive: F) -> Result<()>
    where
        F: FnMut(usize, &Row) -> Result<String>,
    {
        self.extend_columns(1, |position, row| Ok(vec![derive(position, row)?]))
    }

    fn retain_rows<F>(&mut self, mut keep: F) -> Result<()>
    where
        F: FnMut(&Row) -> Result<bool>,
    {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if keep(&row)? {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }
}

/// Inputs the rules read besides the table itself.
pub struct RuleInputs<'a> {
    pub records: &'a [SourceRecord],
    pub sample_sheet: Option<&'a SampleSheet>,
}

/// Builds the column table for `records`.
pub fn apply_rules(rules: &[Rule], inputs: &RuleInputs<'_>) -> Result<ColumnTable> {
    let mut table = ColumnTable::for_sources(inputs.records.len());
    for (index, rule) in rules.iter().enumerate() {
        apply_rule(&mut table, index, rule, inputs)?;
        debug!(
            "Rule {} ({}): {} rows x {} columns",
            index,
            rule.name(),
            table.len(),
            table.width()
        );
    }
    Ok(table)
}

fn compile(rule: usize, expression: &str) -> Result<Regex> {
    Regex::new(expression).map_err(|source| RuleError::InvalidRegex { rule, source })
}

fn parse_number(rule: usize, value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| RuleError::InvalidNumber {
            rule,
            value: value.to_string(),
        })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rewrites Python-style `\1` and `\g<name>` group references for `Captures::expand`.
fn expand_template(replacement: &str) -> String {
    let mut expanded = String::with_capacity(replacement.len());
    let mut rest = replacement;

    while let Some(position) = rest.find(|c: char| c == '\\' || c == '$') {
        expanded.push_str(&rest[..position]);
        let tail = &rest[position..];
        if let Some(after) = tail.strip_prefix('$') {
            expanded.push_str("$$");
            rest = after;
            continue;
        }

        let after = &tail[1..];
        if let Some(remainder) = after.strip_prefix('\\') {
            expanded.push('\\');
            rest = remainder;
            continue;
        }
        let digits = after.chars().take_while(char::is_ascii_digit).count();
        if digits > 0 {
            expanded.push_str(&format!("${{{}}}", &after[..digits]));
            rest = &after[digits..];
            continue;
        }
        if let Some((name, remainder)) = after
            .strip_prefix("g<")
            .and_then(|named| named.split_once('>'))
        {
            expanded.push_str(&format!("${{{}}}", name));
            rest = remainder;
            continue;
        }
        expanded.push('\\');
        rest = after;
    }

    expanded.push_str(rest);
    expanded
}

fn metadata_value(rule: usize, selector: &str, record: &SourceRecord) -> Result<String> {
    if selector == "tags" {
        let mut tags = record.tags.clone();
        tags.sort();
        return Ok(tags.join(","));
    }

    let (values, level): (Vec<String>, &str) = if let Some(level) = selector.strip_prefix("identifier") {
        (record.identifiers.clone(), level)
    } else if let Some(level) = selector.strip_prefix("index") {
        (record.indices.iter().map(usize::to_string).collect(), level)
    } else {
        return Err(RuleError::UnknownMetadata {
            rule,
            value: selector.to_string(),
        });
    };

    let level: usize = level.parse().map_err(|_| RuleError::UnknownMetadata {
        rule,
        value: selector.to_string(),
    })?;
    values
        .get(level)
        .cloned()
        .ok_or_else(|| RuleError::MissingMetadata {
            rule,
            identifier: record.display_path(),
            selector: selector.to_string(),
        })
}

fn group_tag_value(record: &SourceRecord, group: &str, default_value: Option<&str>) -> String {
    let prefix = format!("group:{}:", group);
    let mut values: Vec<&str> = record
        .tags
        .iter()
        .filter_map(|tag| tag.strip_prefix(prefix.as_str()))
        .collect();
    values.sort_unstable();
    values
        .first()
        .map(|value| value.to_string())
        .or_else(|| default_value.map(str::to_string))
        .unwrap_or_default()
}

fn substring(value: &str, length: usize, substr_type: SubstrType) -> String {
    let chars: Vec<char> = value.chars().collect();
    let length = length.min(chars.len());
    let kept = match substr_type {
        SubstrType::KeepPrefix => &chars[..length],
        SubstrType::DropPrefix => &chars[length..],
        SubstrType::KeepSuffix => &chars[chars.len() - length..],
        SubstrType::DropSuffix => &chars[..chars.len() - length],
    };
    kept.iter().collect()
}

fn regex_columns(
    rule: usize,
    pattern: &Regex,
    value: &str,
    replacement: Option<&str>,
    group_count: Option<usize>,
    allow_unmatched: bool,
) -> Result<Vec<String>> {
    let width = group_count.filter(|_| replacement.is_none()).unwrap_or(1);
    let Some(captures) = pattern.captures(value) else {
        if allow_unmatched {
            return Ok(vec![String::new(); width]);
        }
        return Err(RuleError::RegexUnmatched {
            rule,
            value: value.to_string(),
        });
    };

    if let Some(replacement) = replacement {
        let mut expanded = String::new();
        captures.expand(&expand_template(replacement), &mut expanded);
        return Ok(vec![expanded]);
    }

    match group_count {
        Some(expected) => {
            let found = captures.len() - 1;
            if found != expected {
                return Err(RuleError::GroupCount {
                    rule,
                    expected,
                    found,
                });
            }
            Ok((1..=expected)
                .map(|group| {
                    captures
                        .get(group)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
                .collect())
        }
        None => Ok(vec![captures
            .get(0)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()]),
    }
}

fn sort_rows(
    table: &mut ColumnTable,
    rule: usize,
    column: usize,
    numeric: bool,
    reverse: bool,
    expression: Option<&str>,
    capture_group: Option<&str>,
) -> Result<()> {
    let pattern = expression.map(|expression| compile(rule, expression)).transpose()?;

    let mut keyed = Vec::with_capacity(table.rows.len());
    for row in table.rows.drain(..) {
        let cell = row.cells[column].as_str();
        let text = match &pattern {
            Some(pattern) => {
                let captures = pattern.captures(cell).ok_or_else(|| RuleError::RegexUnmatched {
                    rule,
                    value: cell.to_string(),
                })?;
                let matched = match capture_group {
                    Some(name) => captures.name(name),
                    None => captures.get(1).or_else(|| captures.get(0)),
                };
                matched.map(|m| m.as_str().to_string()).unwrap_or_default()
            }
            None => cell.to_string(),
        };
        let number = if numeric {
            Some(parse_number(rule, &text)?)
        } else {
            None
        };
        keyed.push((number, text, row));
    }

    keyed.sort_by(|a, b| {
        let ordering = match (a.0, b.0) {
            (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            _ => a.1.cmp(&b.1),
        };
        if reverse {
            ordering.reverse()
        } else {
            ordering
        }
    });
    table.rows = keyed.into_iter().map(|(_, _, row)| row).collect();
    Ok(())
}

fn apply_rule(table: &mut ColumnTable, index: usize, rule: &Rule, inputs: &RuleInputs<'_>) -> Result<()> {
    let records = inputs.records;

    match rule {
        Rule::AddColumnMetadata { value } => table.add_column(|_, row| {
            metadata_value(index, value, &records[row.source])
        }),

        Rule::AddColumnValue { value } => {
            let text = scalar_text(value);
            table.add_column(|_, _| Ok(text.clone()))
        }

        Rule::AddColumnConcatenate {
            target_column_0,
            target_column_1,
        } => {
            let first = table.check_column(index, *target_column_0)?;
            let second = table.check_column(index, *target_column_1)?;
            table.add_column(|_, row| Ok(format!("{}{}", row.cells[first], row.cells[second])))
        }

        Rule::AddColumnGroupTagValue {
            value,
            default_value,
        } => table.add_column(|_, row| {
            Ok(group_tag_value(
                &records[row.source],
                value,
                default_value.as_deref(),
            ))
        }),

        Rule::AddColumnFromSampleSheetIndex { value } => table.add_column(|_, row| {
            let record = &records[row.source];
            let identifier = record.identifiers.first().cloned().unwrap_or_default();
            let sheet_row = inputs
                .sample_sheet
                .and_then(|sheet| sheet.get(&identifier))
                .ok_or_else(|| RuleError::MissingSampleSheetRow {
                    rule: index,
                    identifier: identifier.clone(),
                })?;
            sheet_row
                .get(*value)
                .map(scalar_text)
                .ok_or(RuleError::SampleSheetColumn {
                    rule: index,
                    identifier,
                    index: *value,
                })
        }),

        Rule::AddColumnBasename { target_column } => {
            let column = table.check_column(index, *target_column)?;
            table.add_column(|_, row| {
                let cell = &row.cells[column];
                Ok(cell.rsplit('/').next().unwrap_or(cell).to_string())
            })
        }

        Rule::AddColumnRownum { start } => table.add_column(|position, _| {
            i64::try_from(position)
                .ok()
                .and_then(|offset| start.checked_add(offset))
                .map(|number| number.to_string())
                .ok_or(RuleError::RownumOverflow { rule: index })
        }),

        Rule::AddColumnRegex {
            target_column,
            expression,
            replacement,
            group_count,
            allow_unmatched,
        } => {
            let column = table.check_column(index, *target_column)?;
            let pattern = compile(index, expression)?;
            let count = group_count.filter(|_| replacement.is_none()).unwrap_or(1);
            table.extend_columns(count, |_, row| {
                regex_columns(
                    index,
                    &pattern,
                    &row.cells[column],
                    replacement.as_deref(),
                    *group_count,
                    *allow_unmatched,
                )
            })
        }

        Rule::AddColumnSubstr {
            target_column,
            length,
            substr_type,
        } => {
            let column = table.check_column(index, *target_column)?;
            table.add_column(|_, row| Ok(substring(&row.cells[column], *length, *substr_type)))
        }

        Rule::RemoveColumns { target_columns } => {
            for column in target_columns {
                table.check_column(index, *column)?;
            }
            for row in &mut table.rows {
                row.cells = row
                    .cells
                    .drain(..)
                    .enumerate()
                    .filter(|(position, _)| !target_columns.contains(position))
                    .map(|(_, cell)| cell)
                    .collect();
            }
            let removed = (0..table.width)
                .filter(|position| target_columns.contains(position))
                .count();
            table.width -= removed;
            Ok(())
        }

        Rule::AddFilterRegex {
            target_column,
            expression,
            invert,
        } => {
            let column = table.check_column(index, *target_column)?;
            let pattern = compile(index, expression)?;
            table.retain_rows(|row| Ok(pattern.is_match(&row.cells[column]) != *invert))
        }

        Rule::AddFilterMatches {
            target_column,
            value,
            invert,
        } => {
            let column = table.check_column(index, *target_column)?;
            table.retain_rows(|row| Ok((row.cells[column] == *value) != *invert))
        }

        Rule::AddFilterCompare {
            target_column,
            value,
            compare_type,
            invert,
        } => {
            let column = table.check_column(index, *target_column)?;
            table.retain_rows(|row| {
                let cell = parse_number(index, &row.cells[column])?;
                Ok(compare_type.holds(cell, *value) != *invert)
            })
        }

        Rule::AddFilterEmpty {
            target_column,
            invert,
        } => {
            let column = table.check_column(index, *target_column)?;
            table.retain_rows(|row| Ok(!row.cells[column].is_empty() != *invert))
        }

        Rule::Sort {
            target_column,
            numeric,
            reverse,
            expression,
            capture_group,
        } => {
            let column = table.check_column(index, *target_column)?;
            sort_rows(
                table,
                index,
                column,
                *numeric,
                *reverse,
                expression.as_deref(),
                capture_group.as_deref(),
            )
        }

        Rule::SwapColumns {
            target_column_0,
            target_column_1,
        } => {
            let first = table.check_column(index, *target_column_0)?;
            let second = table.check_column(index, *target_column_1)?;
            for row in &mut table.rows {
                row.cells.swap(first, second);
            }
            Ok(())
        }

        Rule::SplitColumns {
            target_columns_0,
            target_columns_1,
        } => {
            if target_columns_0.len() != target_columns_1.len() {
                return Err(RuleError::UnevenSplit { rule: index });
            }
            for column in target_columns_0.iter().chain(target_columns_1) {
                table.check_column(index, *column)?;
            }

            let mut split = Vec::with_capacity(table.rows.len() * 2);
            for row in table.rows.drain(..) {
                let mut first = Vec::new();
                let mut second = Vec::new();
                for (position, cell) in row.cells.into_iter().enumerate() {
                    if target_columns_0.contains(&position) {
                        first.push(cell);
                    } else if target_columns_1.contains(&position) {
                        second.push(cell);
                    } else {
                        first.push(cell.clone());
                        second.push(cell);
                    }
                }
                split.push(Row {
                    source: row.source,
                    cells: first,
                });
                split.push(Row {
                    source: row.source,
                    cells: second,
                });
            }
            table.rows = split;
            table.width -= target_columns_1.len();
            Ok(())
        }
    }
}
