use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 0-based position of a row in the original dataset.
pub type RowIndex = usize;
pub type ChunkIndex = usize;

/// Anything that carries the row index assigned at load time.
pub trait RowIndexed {
    fn row_index(&self) -> RowIndex;
}

/// One dataset row keyed by header, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    index: RowIndex,
    cells: Vec<(String, String)>,
}

impl Row {
    pub fn new(index: RowIndex, cells: Vec<(String, String)>) -> Self {
        Self { index, cells }
    }

    pub fn index(&self) -> RowIndex {
        self.index
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(h, _)| h.as_str())
    }
}

impl RowIndexed for Row {
    fn row_index(&self) -> RowIndex {
        self.index
    }
}

/// Field identifier -> value, in mapping order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    fields: Vec<(String, String)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, field_id: impl Into<String>, value: impl Into<String>) {
        self.fields.push((field_id.into(), value.into()));
    }

    pub fn get(&self, field_id: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(f, _)| f == field_id)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(f, v)| (f.as_str(), v.as_str()))
    }

    pub fn field_ids(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(f, _)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Hex SHA-256 over the ordered field/value pairs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (field, value) in &self.fields {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
            hasher.update(value.as_bytes());
            hasher.update([0x1eu8]);
        }
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in digest.iter() {
            use std::fmt::Write;
            let _ = write!(&mut hex, "{byte:02x}");
        }
        hex
    }

    /// Single-line rendering with each value cut to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(f, v)| {
                let mut shown: String = v.chars().take(max_chars).collect();
                if v.chars().count() > max_chars {
                    shown.push('…');
                }
                format!("{f}={shown:?}")
            })
            .collect();
        format!("{{{}}}", parts.join(", "))
    }
}

/// Whether submissions actually go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    DryRun,
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::DryRun => write!(f, "dry-run"),
            Mode::Live => write!(f, "live"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Timeout,
    Connect,
    InvalidUrl,
    Network,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Connect => write!(f, "connect"),
            TransportKind::InvalidUrl => write!(f, "invalid url"),
            TransportKind::Network => write!(f, "network"),
        }
    }
}

/// Result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success {
        code: u16,
    },
    HttpFailure {
        code: u16,
    },
    TransportFailure {
        transport: TransportKind,
        message: String,
    },
    DryRunOk,
    DryRunInvalid {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

impl OutcomeStatus {
    pub fn kind(&self) -> StatusKind {
        match self {
            OutcomeStatus::Success { .. } => StatusKind::Success,
            OutcomeStatus::HttpFailure { .. } => StatusKind::HttpFailure,
            OutcomeStatus::TransportFailure { .. } => StatusKind::TransportFailure,
            OutcomeStatus::DryRunOk => StatusKind::DryRunOk,
            OutcomeStatus::DryRunInvalid { .. } => StatusKind::DryRunInvalid,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success { .. } | OutcomeStatus::DryRunOk)
    }

    /// Transport failures and 5xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            OutcomeStatus::TransportFailure { .. } => true,
            OutcomeStatus::HttpFailure { code } => (500..600).contains(code),
            _ => false,
        }
    }

    /// Label used when summarizing failures, e.g. `http_500` or `transport_timeout`.
    pub fn failure_label(&self) -> Option<String> {
        match self {
            OutcomeStatus::HttpFailure { code } => Some(format!("http_{code}")),
            OutcomeStatus::TransportFailure { transport, .. } => {
                Some(format!("transport_{}", transport.to_string().replace(' ', "_")))
            }
            OutcomeStatus::DryRunInvalid { .. } => Some("dry_run_invalid".to_string()),
            OutcomeStatus::Success { .. } | OutcomeStatus::DryRunOk => None,
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Success { code } => write!(f, "success ({code})"),
            OutcomeStatus::HttpFailure { code } => write!(f, "http failure ({code})"),
            OutcomeStatus::TransportFailure { transport, message } => {
                write!(f, "transport failure ({transport}): {message}")
            }
            OutcomeStatus::DryRunOk => write!(f, "dry-run ok"),
            OutcomeStatus::DryRunInvalid {
                missing,
                unexpected,
            } => write!(
                f,
                "dry-run invalid (missing [{}], unexpected [{}])",
                missing.join(", "),
                unexpected.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Success,
    HttpFailure,
    TransportFailure,
    DryRunOk,
    DryRunInvalid,
}

/// One recorded submission attempt. Never edited after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub row_index: RowIndex,
    pub chunk_index: ChunkIndex,
    pub attempt: u32,
    pub mode: Mode,
    pub status: OutcomeStatus,
    pub payload_digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    InProgress,
    Completed,
    PartiallyFailed,
    /// Cancellation stopped the chunk before every row was attempted.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Pending,
    Sent,
    Acked,
    Failed,
}

/// Aggregate of one chunk's outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk_index: ChunkIndex,
    pub state: ChunkState,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_rows: Vec<RowIndex>,
    pub unattempted_rows: Vec<RowIndex>,
}

impl ChunkResult {
    pub fn new(chunk_index: ChunkIndex) -> Self {
        Self {
            chunk_index,
            state: ChunkState::Pending,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failed_rows: Vec::new(),
            unattempted_rows: Vec::new(),
        }
    }

    pub fn record(&mut self, row: RowIndex, state: RowState) {
        match state {
            RowState::Acked => self.succeeded += 1,
            RowState::Failed => {
                self.failed += 1;
                self.failed_rows.push(row);
            }
            RowState::Pending | RowState::Sent => self.unattempted_rows.push(row),
        }
    }

    /// Settle the final state once every row has been handled or cancellation stopped the chunk.
    pub fn finish(&mut self) {
        self.failed_rows.sort_unstable();
        self.unattempted_rows.sort_unstable();
        self.state = if !self.unattempted_rows.is_empty() {
            ChunkState::Interrupted
        } else if self.failed > 0 {
            ChunkState::PartiallyFailed
        } else {
            ChunkState::Completed
        };
    }

    /// A chunk the run never reached: rows `skip` accepts count as skipped, the rest stay
    /// unattempted and the chunk stays `Pending`.
    pub fn not_started(
        chunk_index: ChunkIndex,
        rows: impl IntoIterator<Item = RowIndex>,
        skip: impl Fn(RowIndex) -> bool,
    ) -> Self {
        let mut result = Self::new(chunk_index);
        for row in rows {
            if skip(row) {
                result.skipped += 1;
            } else {
                result.record(row, RowState::Pending);
            }
        }
        result.finish();
        if !result.unattempted_rows.is_empty() {
            result.state = ChunkState::Pending;
        }
        result
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.unattempted_rows.len()
    }
}
