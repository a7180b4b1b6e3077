use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use formpost_core::{
    ChunkIndex, ChunkResult, Mode, NormalizationNote, RowIndex, RowState, RunSummary,
    SubmissionOutcome, TransportKind,
};

/// Source of outcome timestamps; swapped for a fixed clock in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Prepared {
        rows: usize,
        chunks: usize,
    },
    ChunkStarted {
        chunk_index: ChunkIndex,
        rows: usize,
    },
    RowSkipped {
        row_index: RowIndex,
    },
    Attempt(SubmissionOutcome),
    /// `Sent` before the first attempt, then `Acked` or `Failed`.
    RowChanged {
        row_index: RowIndex,
        state: RowState,
    },
    ChunkFinished(ChunkResult),
    Cancelled {
        chunk_index: ChunkIndex,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportKind,
    pub message: String,
}

impl TransportError {
    pub(crate) fn new(kind: TransportKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Everything a finished (or cancelled) run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub mode: Mode,
    pub chunks: Vec<ChunkResult>,
    pub cancelled: bool,
    pub summary: RunSummary,
    pub notes: Vec<NormalizationNote>,
}

impl RunReport {
    pub fn failed_rows(&self) -> Vec<RowIndex> {
        self.chunks
            .iter()
            .flat_map(|c| c.failed_rows.iter().copied())
            .collect()
    }
}
