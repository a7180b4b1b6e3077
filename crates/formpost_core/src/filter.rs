use std::ops::Range;

use crate::types::{Mode, RowIndex, StatusKind, SubmissionOutcome};

/// Conjunctive filter over recorded outcomes. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeFilter {
    pub mode: Option<Mode>,
    pub kinds: Option<Vec<StatusKind>>,
    pub rows: Option<Range<RowIndex>>,
}

impl OutcomeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn kind(mut self, kind: StatusKind) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    pub fn rows(mut self, rows: Range<RowIndex>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn matches(&self, outcome: &SubmissionOutcome) -> bool {
        if self.mode.is_some_and(|m| m != outcome.mode) {
            return false;
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&outcome.status.kind()) {
                return false;
            }
        }
        if let Some(rows) = &self.rows {
            if !rows.contains(&outcome.row_index) {
                return false;
            }
        }
        true
    }
}
