//! Append-only JSON Lines record of every submission attempt.
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use formpost_core::{Mode, OutcomeFilter, ResumeLedger, RowIndex, SubmissionOutcome};
use pipeline_logging::{pipeline_info, pipeline_warn};

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("outcome log io error at {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("outcome log {path} line {line} is not a valid record: {source}")]
    Corrupt {
        path: String,
        line: usize,
        source: serde_json::Error,
    },
    #[error("cannot serialize outcome: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("outcome log writer task failed: {0}")]
    Task(String),
}

struct LogInner {
    file: Option<File>,
    records: Vec<SubmissionOutcome>,
}

/// Appends are serialized through one lock, so each record lands whole and in order.
pub struct OutcomeLog {
    path: Option<PathBuf>,
    inner: Mutex<LogInner>,
}

impl OutcomeLog {
    /// A log that only lives for this process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(LogInner {
                file: None,
                records: Vec::new(),
            }),
        }
    }

    /// Open (or create) a log file, loading the records already in it.
    ///
    /// A torn final line from an interrupted write is dropped with a warning.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let io_err = |source| LogError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_err)?;
        let mut text = String::new();
        file.read_to_string(&mut text).map_err(io_err)?;

        let (records, torn_at) = parse_records(path, &text)?;
        if let Some(offset) = torn_at {
            file.set_len(offset as u64).map_err(io_err)?;
        } else if !text.is_empty() && !text.ends_with('\n') {
            file.write_all(b"\n").map_err(io_err)?;
        }
        pipeline_info!("Outcome log {:?}: {} existing records", path, records.len());

        Ok(Self {
            path: Some(path.to_path_buf()),
            inner: Mutex::new(LogInner {
                file: Some(file),
                records,
            }),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, outcome: SubmissionOutcome) -> Result<(), LogError> {
        let mut line = serde_json::to_string(&outcome)?;
        line.push('\n');

        let mut inner = self.lock();
        if let Some(file) = inner.file.as_mut() {
            if let Err(source) = write_record(file, line.as_bytes()) {
                return Err(LogError::Io {
                    path: self
                        .path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    source,
                });
            }
        }
        inner.records.push(outcome);
        Ok(())
    }

    /// `append` from async code. The write and fsync run on the blocking pool so they never
    /// hold a runtime worker.
    pub async fn append_async(
        self: Arc<Self>,
        outcome: SubmissionOutcome,
    ) -> Result<(), LogError> {
        tokio::task::spawn_blocking(move || self.append(outcome))
            .await
            .map_err(|err| LogError::Task(err.to_string()))?
    }

    pub fn query(&self, filter: &OutcomeFilter) -> Vec<SubmissionOutcome> {
        self.lock()
            .records
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resume_ledger(&self, mode: Mode) -> ResumeLedger {
        let inner = self.lock();
        ResumeLedger::from_outcomes(mode, inner.records.iter())
    }

    /// Most recent outcome per row for a mode.
    pub fn latest_by_row(&self, mode: Mode) -> BTreeMap<RowIndex, SubmissionOutcome> {
        let mut latest = BTreeMap::new();
        for outcome in self.query(&OutcomeFilter::all().mode(mode)) {
            latest.insert(outcome.row_index, outcome);
        }
        latest
    }

    fn lock(&self) -> MutexGuard<'_, LogInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_record(file: &mut File, line: &[u8]) -> io::Result<()> {
    file.write_all(line)?;
    file.flush()?;
    file.sync_data()
}

/// Parsed records plus the byte offset of a torn final line, if any.
fn parse_records(
    path: &Path,
    text: &str,
) -> Result<(Vec<SubmissionOutcome>, Option<usize>), LogError> {
    let mut records = Vec::new();
    let mut offset = 0;
    for (number, line) in text.split_inclusive('\n').enumerate() {
        let start = offset;
        offset += line.len();
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(source) if !line.ends_with('\n') => {
                pipeline_warn!(
                    "Dropping torn last line {} of outcome log {:?}: {}",
                    number + 1,
                    path,
                    source
                );
                return Ok((records, Some(start)));
            }
            Err(source) => {
                return Err(LogError::Corrupt {
                    path: path.display().to_string(),
                    line: number + 1,
                    source,
                })
            }
        }
    }
    Ok((records, None))
}
