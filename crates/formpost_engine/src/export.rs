//! CSV exports of prepared payloads: chunk files for inspection and failed rows for follow-up.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use formpost_core::{BuiltPayload, Chunk, Row, RowIndex};
use serde::Serialize;

use crate::persist::{AtomicFileWriter, PersistError};

const ROW_INDEX_COLUMN: &str = "row_index";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub chunk_prefix: String,
    pub manifest_filename: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            chunk_prefix: "chunk_".to_string(),
            manifest_filename: Some("manifest.json".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub row_count: usize,
    pub chunk_files: Vec<PathBuf>,
    pub manifest_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    file: String,
    chunk_index: usize,
    start_row: RowIndex,
    end_row: RowIndex,
    rows: usize,
}

#[derive(Debug, Serialize)]
struct Manifest {
    chunk_count: usize,
    row_count: usize,
    chunks: Vec<ManifestEntry>,
}

/// One CSV per chunk (`chunk_1.csv`, ...), keyed by field identifier with the row index first.
pub fn export_chunks(
    output_dir: &Path,
    chunks: &[Chunk<BuiltPayload>],
    options: &ExportOptions,
) -> Result<ExportSummary, ExportError> {
    let writer = AtomicFileWriter::new(output_dir.to_path_buf())?;
    let mut chunk_files = Vec::with_capacity(chunks.len());
    let mut entries = Vec::with_capacity(chunks.len());
    let mut row_count = 0;

    for chunk in chunks {
        let filename = format!("{}{}.csv", options.chunk_prefix, chunk.index + 1);
        let content = rows_to_csv(chunk.rows.iter())?;
        chunk_files.push(writer.write(&filename, &content)?);
        row_count += chunk.len();
        entries.push(ManifestEntry {
            file: filename,
            chunk_index: chunk.index,
            start_row: chunk.start_row,
            end_row: chunk.end_row,
            rows: chunk.len(),
        });
    }

    let manifest_path = match &options.manifest_filename {
        Some(name) => {
            let manifest = Manifest {
                chunk_count: entries.len(),
                row_count,
                chunks: entries,
            };
            Some(writer.write_json(name, &manifest)?)
        }
        None => None,
    };

    Ok(ExportSummary {
        row_count,
        chunk_files,
        manifest_path,
    })
}

/// Write the prepared payloads of `failed` rows to a single CSV.
/// Returns the number of rows written.
pub fn export_failed_rows(
    path: &Path,
    chunks: &[Chunk<BuiltPayload>],
    failed: &[RowIndex],
) -> Result<usize, ExportError> {
    let wanted: BTreeSet<RowIndex> = failed.iter().copied().collect();
    let rows: Vec<&BuiltPayload> = chunks
        .iter()
        .flat_map(|c| c.rows.iter())
        .filter(|r| wanted.contains(&r.row_index))
        .collect();

    let content = rows_to_csv(rows.iter().copied())?;
    write_single(path, "failed_rows.csv", &content)?;
    Ok(rows.len())
}

/// Write the selected rows as they appear in the source CSV, under the dataset's own headers.
pub fn export_source_rows(
    path: &Path,
    headers: &[String],
    rows: &[Row],
    selected: &[RowIndex],
) -> Result<usize, ExportError> {
    let wanted: BTreeSet<RowIndex> = selected.iter().copied().collect();
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    let mut written = 0;
    for row in rows.iter().filter(|r| wanted.contains(&r.index())) {
        let record: Vec<&str> = headers
            .iter()
            .map(|h| row.get(h).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
        written += 1;
    }
    let content = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    write_single(path, "missing_rows.csv", &content)?;
    Ok(written)
}

fn write_single(
    path: &Path,
    fallback_name: &str,
    content: &[u8],
) -> Result<PathBuf, ExportError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback_name.to_string());
    Ok(AtomicFileWriter::new(dir.to_path_buf())?.write(&filename, content)?)
}

fn rows_to_csv<'a>(rows: impl Iterator<Item = &'a BuiltPayload>) -> Result<Vec<u8>, ExportError> {
    let mut rows = rows.peekable();
    let mut writer = csv::Writer::from_writer(Vec::new());
    if let Some(first) = rows.peek() {
        let mut header = vec![ROW_INDEX_COLUMN];
        header.extend(first.payload.field_ids());
        writer.write_record(&header)?;
    }
    for row in rows {
        let mut record = vec![row.row_index.to_string()];
        record.extend(row.payload.iter().map(|(_, v)| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}
