use std::collections::HashSet;
use std::fs;
use std::path::Path;

use formpost_core::Row;
use pipeline_logging::pipeline_info;

use crate::decode::{decode_text, DecodeError};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("cannot read dataset {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset has no header row")]
    MissingHeader,
    #[error("column {0} has an empty header")]
    EmptyHeader(usize),
    #[error("header {0:?} appears more than once")]
    DuplicateHeader(String),
}

/// Header line plus rows, each carrying its 0-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    pub encoding_label: String,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn load_csv(path: &Path, encoding_label: Option<&str>) -> Result<Dataset, DatasetError> {
    let bytes = fs::read(path).map_err(|source| DatasetError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let dataset = parse_csv(&bytes, encoding_label)?;
    pipeline_info!(
        "Loaded {} rows ({} columns, {}) from {:?}",
        dataset.len(),
        dataset.headers.len(),
        dataset.encoding_label,
        path
    );
    Ok(dataset)
}

/// Parse CSV bytes. Header names are trimmed; every cell is kept as text.
pub fn parse_csv(bytes: &[u8], encoding_label: Option<&str>) -> Result<Dataset, DatasetError> {
    let decoded = decode_text(bytes, encoding_label)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(decoded.text.as_bytes());

    let header_record = reader.headers()?.clone();
    if header_record.is_empty() {
        return Err(DatasetError::MissingHeader);
    }

    let mut headers = Vec::with_capacity(header_record.len());
    let mut seen = HashSet::new();
    for (column, raw) in header_record.iter().enumerate() {
        let header = raw.trim().to_string();
        if header.is_empty() {
            return Err(DatasetError::EmptyHeader(column));
        }
        if !seen.insert(header.clone()) {
            return Err(DatasetError::DuplicateHeader(header));
        }
        headers.push(header);
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let cells = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(Row::new(index, cells));
    }

    Ok(Dataset {
        headers,
        rows,
        encoding_label: decoded.encoding_label,
    })
}
