//! Header -> field identifier resolution.
use std::collections::BTreeSet;

use crate::types::{Payload, Row, RowIndex, RowIndexed};

const PLACEHOLDER_MARKERS: &[&str] = &["YOUR_ENTRY_ID", "YOUR_FORM_ID"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub header: String,
    pub field_id: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("row {row}: header {header:?} has no field identifier in the mapping")]
    UnmappedHeader { header: String, row: RowIndex },
    #[error("row {row}: required header {header:?} is missing")]
    MissingRequiredField { header: String, row: RowIndex },
    #[error("header {0:?} is mapped more than once")]
    DuplicateHeader(String),
    #[error("field identifier {0:?} is targeted by more than one header")]
    DuplicateFieldId(String),
    #[error("header {0:?} is not part of the mapping")]
    UnknownHeader(String),
}

impl MappingError {
    /// The header the diagnostic is about.
    pub fn header(&self) -> &str {
        match self {
            MappingError::UnmappedHeader { header, .. }
            | MappingError::MissingRequiredField { header, .. }
            | MappingError::DuplicateHeader(header)
            | MappingError::UnknownHeader(header) => header,
            MappingError::DuplicateFieldId(field) => field,
        }
    }
}

/// Ordered header -> field identifier table.
///
/// Headers listed as ignored may appear in the dataset without being submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderMapping {
    entries: Vec<MappingEntry>,
    ignored: BTreeSet<String>,
}

impl HeaderMapping {
    pub fn new<H, F>(pairs: impl IntoIterator<Item = (H, F)>) -> Result<Self, MappingError>
    where
        H: Into<String>,
        F: Into<String>,
    {
        let mut mapping = Self::default();
        for (header, field_id) in pairs {
            mapping.insert(header.into(), field_id.into())?;
        }
        Ok(mapping)
    }

    fn insert(&mut self, header: String, field_id: String) -> Result<(), MappingError> {
        if self.entries.iter().any(|e| e.header == header) {
            return Err(MappingError::DuplicateHeader(header));
        }
        if self.entries.iter().any(|e| e.field_id == field_id) {
            return Err(MappingError::DuplicateFieldId(field_id));
        }
        self.entries.push(MappingEntry {
            header,
            field_id,
            required: false,
        });
        Ok(())
    }

    /// Mark a mapped header as required.
    pub fn require(mut self, header: &str) -> Result<Self, MappingError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.header == header)
            .ok_or_else(|| MappingError::UnknownHeader(header.to_string()))?;
        entry.required = true;
        Ok(self)
    }

    /// Let a dataset column through without submitting it.
    pub fn ignore(mut self, header: impl Into<String>) -> Self {
        self.ignored.insert(header.into());
        self
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn field_id(&self, header: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.header == header)
            .map(|e| e.field_id.as_str())
    }

    pub fn is_ignored(&self, header: &str) -> bool {
        self.ignored.contains(header)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field identifiers still holding a template placeholder.
    pub fn placeholder_field_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.field_id.as_str())
            .filter(|id| contains_placeholder(id))
            .collect()
    }

    /// Fails on the first dataset header that is neither mapped nor ignored.
    ///
    /// Row 0 is reported since every row shares the header line.
    pub fn check_headers<'a>(
        &self,
        headers: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), MappingError> {
        for header in headers {
            if self.field_id(header).is_none() && !self.is_ignored(header) {
                return Err(MappingError::UnmappedHeader {
                    header: header.to_string(),
                    row: 0,
                });
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> FormSchema {
        FormSchema {
            required: self
                .entries
                .iter()
                .filter(|e| e.required)
                .map(|e| e.field_id.clone())
                .collect(),
            known: self.entries.iter().map(|e| e.field_id.clone()).collect(),
        }
    }
}

pub fn contains_placeholder(value: &str) -> bool {
    PLACEHOLDER_MARKERS.iter().any(|m| value.contains(m))
}

/// Field identifiers the form accepts, and which of them must carry a value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormSchema {
    pub required: BTreeSet<String>,
    pub known: BTreeSet<String>,
}

impl FormSchema {
    /// Required identifiers that are absent or blank, then identifiers outside the form.
    pub fn check(&self, payload: &Payload) -> (Vec<String>, Vec<String>) {
        let missing = self
            .required
            .iter()
            .filter(|id| payload.get(id).map_or(true, |v| v.trim().is_empty()))
            .cloned()
            .collect();
        let unexpected = payload
            .field_ids()
            .filter(|id| !self.known.contains(*id))
            .map(str::to_string)
            .collect();
        (missing, unexpected)
    }
}

/// A row translated to field identifiers, still tied to its dataset position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRow {
    pub row_index: RowIndex,
    pub payload: Payload,
}

impl RowIndexed for ResolvedRow {
    fn row_index(&self) -> RowIndex {
        self.row_index
    }
}

/// Translate a header-keyed row into a payload keyed by field identifier.
pub fn resolve(row: &Row, mapping: &HeaderMapping) -> Result<ResolvedRow, MappingError> {
    for header in row.headers() {
        if mapping.field_id(header).is_none() && !mapping.is_ignored(header) {
            return Err(MappingError::UnmappedHeader {
                header: header.to_string(),
                row: row.index(),
            });
        }
    }

    let mut payload = Payload::new();
    for entry in mapping.entries() {
        let value = match row.get(&entry.header) {
            Some(value) => value,
            None if entry.required => {
                return Err(MappingError::MissingRequiredField {
                    header: entry.header.clone(),
                    row: row.index(),
                });
            }
            None => "",
        };
        payload.push(entry.field_id.clone(), value);
    }

    Ok(ResolvedRow {
        row_index: row.index(),
        payload,
    })
}
