use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::{ChunkResult, ChunkState, Mode, OutcomeStatus};

/// End-of-run totals, printed for the operator and optionally written as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub unattempted: usize,
    pub cancelled: bool,
    pub chunks_completed: usize,
    pub chunks_partially_failed: usize,
    pub chunks_interrupted: usize,
    /// Chunks the run never reached; their rows count as unattempted.
    pub chunks_not_started: usize,
    /// Final status label of each failed row -> number of rows.
    pub failures_by_kind: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn new(mode: Mode, chunks: &[ChunkResult], cancelled: bool) -> Self {
        let mut summary = Self {
            mode,
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            unattempted: 0,
            cancelled,
            chunks_completed: 0,
            chunks_partially_failed: 0,
            chunks_interrupted: 0,
            chunks_not_started: 0,
            failures_by_kind: BTreeMap::new(),
        };
        for chunk in chunks {
            summary.total += chunk.total();
            summary.succeeded += chunk.succeeded;
            summary.failed += chunk.failed;
            summary.skipped += chunk.skipped;
            summary.unattempted += chunk.unattempted_rows.len();
            match chunk.state {
                ChunkState::Completed => summary.chunks_completed += 1,
                ChunkState::PartiallyFailed => summary.chunks_partially_failed += 1,
                ChunkState::Interrupted => summary.chunks_interrupted += 1,
                ChunkState::Pending => summary.chunks_not_started += 1,
                ChunkState::InProgress => {}
            }
        }
        summary
    }

    /// Count the final status of a failed row.
    pub fn count_failure(&mut self, status: &OutcomeStatus) {
        if let Some(label) = status.failure_label() {
            *self.failures_by_kind.entry(label).or_insert(0) += 1;
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.unattempted == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} run: total={} succeeded={} failed={} skipped={} unattempted={}",
            self.mode, self.total, self.succeeded, self.failed, self.skipped, self.unattempted
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        if !self.failures_by_kind.is_empty() {
            let kinds: Vec<String> = self
                .failures_by_kind
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect();
            write!(f, " failures[{}]", kinds.join(", "))?;
        }
        Ok(())
    }
}
