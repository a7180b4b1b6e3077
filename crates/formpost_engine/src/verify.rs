//! Cross-check of the outcome log against the prepared dataset.
use std::collections::BTreeMap;
use std::fmt;

use formpost_core::{BuiltPayload, Chunk, Mode, OutcomeFilter, OutcomeStatus, RowIndex};
use serde::Serialize;

use crate::outcome_log::OutcomeLog;

/// A dataset row with no successful submission in the checked mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsubmittedRow {
    pub row_index: RowIndex,
    /// Most recent recorded attempt, `None` if the row was never attempted.
    pub last_status: Option<OutcomeStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadMismatch {
    /// The log names a row the dataset does not have.
    UnknownRow { row_index: RowIndex, attempt: u32 },
    /// The recorded payload differs from the one rebuilt from the dataset.
    Digest {
        row_index: RowIndex,
        attempt: u32,
        recorded: String,
        expected: String,
        /// Field ids whose values differ; empty when the payload itself was not recorded.
        fields: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub mode: Mode,
    pub dataset_rows: usize,
    pub log_entries: usize,
    pub successful_entries: usize,
    pub failed_entries: usize,
    pub unsubmitted: Vec<UnsubmittedRow>,
    pub mismatches: Vec<PayloadMismatch>,
}

impl VerifyReport {
    pub fn unsubmitted_rows(&self) -> Vec<RowIndex> {
        self.unsubmitted.iter().map(|r| r.row_index).collect()
    }

    /// Every row succeeded and every successful payload matches the dataset.
    pub fn is_complete(&self) -> bool {
        self.unsubmitted.is_empty() && self.mismatches.is_empty()
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} verification: rows={} log_entries={} successful={} failed={}",
            self.mode,
            self.dataset_rows,
            self.log_entries,
            self.successful_entries,
            self.failed_entries
        )?;
        write!(
            f,
            " unsubmitted={} mismatches={}",
            self.unsubmitted.len(),
            self.mismatches.len()
        )
    }
}

/// Compare every logged outcome of `mode` with the payloads rebuilt from the dataset.
///
/// Only successful attempts are checked for payload drift.
pub fn verify(log: &OutcomeLog, chunks: &[Chunk<BuiltPayload>], mode: Mode) -> VerifyReport {
    let expected: BTreeMap<RowIndex, &BuiltPayload> = chunks
        .iter()
        .flat_map(|c| c.rows.iter())
        .map(|r| (r.row_index, r))
        .collect();
    let outcomes = log.query(&OutcomeFilter::all().mode(mode));
    let ledger = log.resume_ledger(mode);
    let latest = log.latest_by_row(mode);

    let mut mismatches = Vec::new();
    let mut successful_entries = 0;
    for outcome in &outcomes {
        if !outcome.status.is_success() {
            continue;
        }
        successful_entries += 1;
        let Some(row) = expected.get(&outcome.row_index) else {
            mismatches.push(PayloadMismatch::UnknownRow {
                row_index: outcome.row_index,
                attempt: outcome.attempt,
            });
            continue;
        };
        let digest = row.payload.digest();
        if digest == outcome.payload_digest {
            continue;
        }
        let fields = outcome
            .payload
            .as_ref()
            .map(|recorded| {
                row.payload
                    .iter()
                    .filter(|(field, value)| recorded.get(field) != Some(*value))
                    .map(|(field, _)| field.to_string())
                    .collect()
            })
            .unwrap_or_default();
        mismatches.push(PayloadMismatch::Digest {
            row_index: outcome.row_index,
            attempt: outcome.attempt,
            recorded: outcome.payload_digest.clone(),
            expected: digest,
            fields,
        });
    }

    let unsubmitted = expected
        .keys()
        .filter(|row| !ledger.should_skip(**row))
        .map(|row| UnsubmittedRow {
            row_index: *row,
            last_status: latest.get(row).map(|o| o.status.clone()),
        })
        .collect();

    VerifyReport {
        mode,
        dataset_rows: expected.len(),
        log_entries: outcomes.len(),
        successful_entries,
        failed_entries: outcomes.len() - successful_entries,
        unsubmitted,
        mismatches,
    }
}
