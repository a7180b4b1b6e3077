use std::collections::BTreeMap;

use crate::types::{Mode, RowIndex, SubmissionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStatus {
    Pending,
    Failed,
    Succeeded,
}

/// Standing of every row index seen in a prior run, for one mode.
///
/// Success is sticky: a row that went through once is never submitted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeLedger {
    mode: Mode,
    rows: BTreeMap<RowIndex, ResumeStatus>,
}

impl ResumeLedger {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            rows: BTreeMap::new(),
        }
    }

    /// Rebuild from recorded outcomes; outcomes of another mode are ignored.
    pub fn from_outcomes<'a>(
        mode: Mode,
        outcomes: impl IntoIterator<Item = &'a SubmissionOutcome>,
    ) -> Self {
        let mut ledger = Self::new(mode);
        for outcome in outcomes {
            ledger.observe(outcome);
        }
        ledger
    }

    pub fn observe(&mut self, outcome: &SubmissionOutcome) {
        if outcome.mode != self.mode {
            return;
        }
        let next = if outcome.status.is_success() {
            ResumeStatus::Succeeded
        } else {
            ResumeStatus::Failed
        };
        let slot = self
            .rows
            .entry(outcome.row_index)
            .or_insert(ResumeStatus::Pending);
        if *slot != ResumeStatus::Succeeded {
            *slot = next;
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self, row: RowIndex) -> ResumeStatus {
        self.rows.get(&row).copied().unwrap_or(ResumeStatus::Pending)
    }

    pub fn should_skip(&self, row: RowIndex) -> bool {
        self.status(row) == ResumeStatus::Succeeded
    }

    pub fn succeeded(&self) -> impl Iterator<Item = RowIndex> + '_ {
        self.with_status(ResumeStatus::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = RowIndex> + '_ {
        self.with_status(ResumeStatus::Failed)
    }

    fn with_status(&self, status: ResumeStatus) -> impl Iterator<Item = RowIndex> + '_ {
        self.rows
            .iter()
            .filter(move |(_, s)| **s == status)
            .map(|(row, _)| *row)
    }
}
