//! Value normalization applied to a resolved payload before submission.
//!
//! Each field goes through the same fixed sequence: trim, canonicalize against the
//! field's allowed choices (then its alias table), then the length check.
use std::collections::BTreeMap;
use std::fmt;

use crate::mapping::ResolvedRow;
use crate::types::{Payload, RowIndex, RowIndexed};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldRule {
    pub choices: Vec<String>,
    /// Lower-cased alias -> canonical value.
    pub aliases: Vec<(String, String)>,
    pub max_length: Option<usize>,
}

/// Normalization rules keyed by field identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizationRules {
    fields: BTreeMap<String, FieldRule>,
}

impl NormalizationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_choices<S: Into<String>>(
        mut self,
        field_id: &str,
        choices: impl IntoIterator<Item = S>,
    ) -> Self {
        self.entry(field_id)
            .choices
            .extend(choices.into_iter().map(Into::into));
        self
    }

    pub fn with_alias(mut self, field_id: &str, alias: &str, canonical: impl Into<String>) -> Self {
        self.entry(field_id)
            .aliases
            .push((alias.trim().to_lowercase(), canonical.into()));
        self
    }

    pub fn with_max_length(mut self, field_id: &str, max: usize) -> Self {
        self.entry(field_id).max_length = Some(max);
        self
    }

    pub fn rule(&self, field_id: &str) -> Option<&FieldRule> {
        self.fields.get(field_id)
    }

    fn entry(&mut self, field_id: &str) -> &mut FieldRule {
        self.fields.entry(field_id.to_string()).or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizationNote {
    Canonicalized {
        row: RowIndex,
        field: String,
        from: String,
        to: String,
    },
    /// No allowed value or alias matched; the raw value is kept.
    Unmatched {
        row: RowIndex,
        field: String,
        value: String,
    },
}

impl fmt::Display for NormalizationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationNote::Canonicalized {
                row,
                field,
                from,
                to,
            } => write!(f, "row {row}: {field} {from:?} -> {to:?}"),
            NormalizationNote::Unmatched { row, field, value } => {
                write!(f, "row {row}: {field} value {value:?} matches no allowed choice")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("row {row}: value for {field} is {length} characters long (max {max})")]
    ValueTooLong {
        row: RowIndex,
        field: String,
        length: usize,
        max: usize,
    },
}

/// The exact payload that will be submitted for a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPayload {
    pub row_index: RowIndex,
    pub payload: Payload,
    pub notes: Vec<NormalizationNote>,
}

impl RowIndexed for BuiltPayload {
    fn row_index(&self) -> RowIndex {
        self.row_index
    }
}

pub fn build(
    resolved: &ResolvedRow,
    rules: &NormalizationRules,
) -> Result<BuiltPayload, NormalizeError> {
    let row = resolved.row_index;
    let mut notes = Vec::new();
    let mut payload = Payload::new();

    for (field, raw) in resolved.payload.iter() {
        let trimmed = raw.trim();
        let value = match rules.rule(field) {
            Some(rule) => {
                let value = canonicalize(row, field, trimmed, rule, &mut notes);
                if let Some(max) = rule.max_length {
                    let length = value.chars().count();
                    if length > max {
                        return Err(NormalizeError::ValueTooLong {
                            row,
                            field: field.to_string(),
                            length,
                            max,
                        });
                    }
                }
                value
            }
            None => trimmed.to_string(),
        };
        payload.push(field, value);
    }

    Ok(BuiltPayload {
        row_index: row,
        payload,
        notes,
    })
}

fn canonicalize(
    row: RowIndex,
    field: &str,
    value: &str,
    rule: &FieldRule,
    notes: &mut Vec<NormalizationNote>,
) -> String {
    if value.is_empty() || (rule.choices.is_empty() && rule.aliases.is_empty()) {
        return value.to_string();
    }
    if rule.choices.iter().any(|c| c == value) {
        return value.to_string();
    }

    let lowered = value.to_lowercase();
    let matched = rule
        .choices
        .iter()
        .find(|c| c.to_lowercase() == lowered)
        .or_else(|| {
            rule.aliases
                .iter()
                .find(|(alias, _)| *alias == lowered)
                .map(|(_, canonical)| canonical)
        })
        .or_else(|| {
            // Longest alias prefix wins so "strongly disagree" beats "strongly".
            rule.aliases
                .iter()
                .filter(|(alias, _)| !alias.is_empty() && lowered.starts_with(alias.as_str()))
                .max_by_key(|(alias, _)| alias.len())
                .map(|(_, canonical)| canonical)
        });

    match matched {
        Some(canonical) => {
            if canonical != value {
                notes.push(NormalizationNote::Canonicalized {
                    row,
                    field: field.to_string(),
                    from: value.to_string(),
                    to: canonical.clone(),
                });
            }
            canonical.clone()
        }
        None => {
            notes.push(NormalizationNote::Unmatched {
                row,
                field: field.to_string(),
                value: value.to_string(),
            });
            value.to_string()
        }
    }
}
