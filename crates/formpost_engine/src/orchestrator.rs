//! Drives prepared payloads through the submission client, chunk by chunk.
use std::sync::Arc;
use std::time::Duration;

use formpost_core::{
    build, resolve, row_jitter, BuiltPayload, Chunk, ChunkIndex, ChunkResult, ChunkState,
    HeaderMapping, MappingError, Mode, NormalizationNote, NormalizationRules, NormalizeError,
    OutcomeStatus, ResumeLedger, RetryDecision, RetryPolicy, RetrySchedule, Row, RowIndex,
    RowState, RunSummary,
};
use futures_util::{future, stream, StreamExt};
use pipeline_logging::{pipeline_info, pipeline_warn};
use tokio_util::sync::CancellationToken;

use crate::client::{SubmissionClient, SubmissionRequest};
use crate::outcome_log::{LogError, OutcomeLog};
use crate::types::{PipelineEvent, RunReport};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),
    #[error("normalization error: {0}")]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Log(#[from] LogError),
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: PipelineEvent) {}
}

/// Waits between rows and before retries.
#[async_trait::async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait::async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub inter_row_delay: Duration,
    pub jitter: Duration,
    pub retry: RetryPolicy,
    /// Chunks before this index are left alone.
    pub start_chunk: ChunkIndex,
    /// Stop after this many rows have been submitted.
    pub row_limit: Option<usize>,
    /// Rows this ledger marks as succeeded are skipped.
    pub skip: Option<ResumeLedger>,
    /// Rows in flight at once; only honoured in live mode.
    pub concurrency: usize,
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            inter_row_delay: Duration::from_millis(1500),
            jitter: Duration::from_millis(600),
            retry: RetryPolicy::default(),
            start_chunk: 0,
            row_limit: None,
            skip: None,
            concurrency: 1,
            cancel: CancellationToken::new(),
        }
    }
}

impl RunOptions {
    fn skips(&self, row: RowIndex) -> bool {
        self.skip
            .as_ref()
            .is_some_and(|ledger| ledger.should_skip(row))
    }
}

struct RowReport {
    state: RowState,
    last_status: OutcomeStatus,
}

/// Mutable bookkeeping for one run.
struct RunProgress {
    budget: Option<usize>,
    submitted_any: bool,
    failures: Vec<OutcomeStatus>,
}

impl RunProgress {
    fn exhausted(&self) -> bool {
        self.budget == Some(0)
    }

    fn take_one(&mut self) {
        if let Some(left) = self.budget.as_mut() {
            *left = left.saturating_sub(1);
        }
    }
}

/// Resolve and normalize every row up front, so configuration defects surface
/// before anything is sent.
pub fn prepare_chunks(
    chunks: &[Chunk<Row>],
    mapping: &HeaderMapping,
    rules: &NormalizationRules,
) -> Result<(Vec<Chunk<BuiltPayload>>, Vec<NormalizationNote>), RunError> {
    let mut prepared = Vec::with_capacity(chunks.len());
    let mut notes = Vec::new();
    for chunk in chunks {
        let built = chunk.try_map_rows(|row| -> Result<BuiltPayload, RunError> {
            let resolved = resolve(row, mapping)?;
            Ok(build(&resolved, rules)?)
        })?;
        notes.extend(built.rows.iter().flat_map(|r| r.notes.iter().cloned()));
        prepared.push(built);
    }
    for note in &notes {
        match note {
            NormalizationNote::Canonicalized { .. } => pipeline_info!("normalized {}", note),
            NormalizationNote::Unmatched { .. } => pipeline_warn!("{}", note),
        }
    }
    Ok((prepared, notes))
}

pub struct Orchestrator {
    client: SubmissionClient,
    log: Arc<OutcomeLog>,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn ProgressSink>,
}

impl Orchestrator {
    pub fn new(client: SubmissionClient, log: Arc<OutcomeLog>) -> Self {
        Self {
            client,
            log,
            sleeper: Arc::new(TokioSleeper),
            sink: Arc::new(NoopProgressSink),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn log(&self) -> &OutcomeLog {
        &self.log
    }

    /// Validate every row, then submit chunk by chunk.
    pub async fn run(
        &self,
        chunks: &[Chunk<Row>],
        mapping: &HeaderMapping,
        rules: &NormalizationRules,
        mode: Mode,
        options: &RunOptions,
    ) -> Result<RunReport, RunError> {
        let (prepared, notes) = prepare_chunks(chunks, mapping, rules)?;
        let mut report = self.run_prepared(&prepared, mode, options).await?;
        report.notes = notes;
        Ok(report)
    }

    pub async fn run_prepared(
        &self,
        chunks: &[Chunk<BuiltPayload>],
        mode: Mode,
        options: &RunOptions,
    ) -> Result<RunReport, RunError> {
        let rows = chunks.iter().map(Chunk::len).sum();
        self.sink.emit(PipelineEvent::Prepared {
            rows,
            chunks: chunks.len(),
        });

        let mut progress = RunProgress {
            budget: options.row_limit,
            submitted_any: false,
            failures: Vec::new(),
        };
        let mut results = Vec::new();
        let mut stopped = false;
        for chunk in chunks.iter().filter(|c| c.index >= options.start_chunk) {
            if !stopped && options.cancel.is_cancelled() {
                pipeline_warn!("Cancelled before chunk {}", chunk.index);
                self.sink.emit(PipelineEvent::Cancelled {
                    chunk_index: chunk.index,
                });
                stopped = true;
            }
            if stopped || progress.exhausted() {
                results.push(ChunkResult::not_started(
                    chunk.index,
                    chunk.rows.iter().map(|r| r.row_index),
                    |row| options.skips(row),
                ));
                continue;
            }
            let result = self.run_chunk(chunk, mode, options, &mut progress).await?;
            results.push(result);
        }

        let cancelled = options.cancel.is_cancelled();
        let mut summary = RunSummary::new(mode, &results, cancelled);
        for status in &progress.failures {
            summary.count_failure(status);
        }
        pipeline_info!("{}", summary);

        Ok(RunReport {
            mode,
            chunks: results,
            cancelled,
            summary,
            notes: Vec::new(),
        })
    }

    async fn run_chunk(
        &self,
        chunk: &Chunk<BuiltPayload>,
        mode: Mode,
        options: &RunOptions,
        progress: &mut RunProgress,
    ) -> Result<ChunkResult, RunError> {
        let mut result = ChunkResult::new(chunk.index);
        result.state = ChunkState::InProgress;
        pipeline_info!(
            "Chunk {} (rows {}..={}, {} rows) started",
            chunk.index,
            chunk.start_row,
            chunk.end_row,
            chunk.len()
        );
        self.sink.emit(PipelineEvent::ChunkStarted {
            chunk_index: chunk.index,
            rows: chunk.len(),
        });

        if mode == Mode::Live && options.concurrency > 1 {
            self.run_rows_concurrently(chunk, options, progress, &mut result)
                .await?;
        } else {
            self.run_rows_sequentially(chunk, mode, options, progress, &mut result)
                .await?;
        }

        result.finish();
        if result.state == ChunkState::Interrupted && options.cancel.is_cancelled() {
            self.sink.emit(PipelineEvent::Cancelled {
                chunk_index: chunk.index,
            });
        }
        pipeline_info!(
            "Chunk {} {:?}: {} ok, {} failed, {} skipped",
            chunk.index,
            result.state,
            result.succeeded,
            result.failed,
            result.skipped
        );
        self.sink.emit(PipelineEvent::ChunkFinished(result.clone()));
        Ok(result)
    }

    async fn run_rows_sequentially(
        &self,
        chunk: &Chunk<BuiltPayload>,
        mode: Mode,
        options: &RunOptions,
        progress: &mut RunProgress,
        result: &mut ChunkResult,
    ) -> Result<(), RunError> {
        let mut rows = chunk.rows.iter();
        while let Some(row) = rows.next() {
            if options.skips(row.row_index) {
                self.skip_row(row, result);
                continue;
            }
            if progress.exhausted() || options.cancel.is_cancelled() {
                self.leave_unattempted(row, rows.by_ref(), options, result);
                break;
            }
            if mode == Mode::Live && progress.submitted_any {
                let delay = options.inter_row_delay + row_jitter(row.row_index, options.jitter);
                self.sleeper.sleep(delay).await;
                if options.cancel.is_cancelled() {
                    self.leave_unattempted(row, rows.by_ref(), options, result);
                    break;
                }
            }

            let report = self.submit_row(chunk.index, row, mode, options).await?;
            progress.submitted_any = true;
            progress.take_one();
            self.finish_row(row, report, progress, result);
        }
        Ok(())
    }

    /// Bounded number of requests in flight; spacing comes from the context's rate limiter.
    async fn run_rows_concurrently(
        &self,
        chunk: &Chunk<BuiltPayload>,
        options: &RunOptions,
        progress: &mut RunProgress,
        result: &mut ChunkResult,
    ) -> Result<(), RunError> {
        let mut to_send = Vec::new();
        let mut rows = chunk.rows.iter();
        while let Some(row) = rows.next() {
            if options.skips(row.row_index) {
                self.skip_row(row, result);
                continue;
            }
            if progress.budget.is_some_and(|left| to_send.len() >= left) {
                self.leave_unattempted(row, rows.by_ref(), options, result);
                break;
            }
            to_send.push(row);
        }

        let chunk_index = chunk.index;
        let cancel = options.cancel.clone();
        let reports: Vec<_> = stream::iter(to_send.iter().copied())
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(move |row| async move {
                (
                    row,
                    self.submit_row(chunk_index, row, Mode::Live, options).await,
                )
            })
            .buffered(options.concurrency)
            .collect()
            .await;

        let attempted = reports.len();
        for (row, report) in reports {
            let report = report?;
            progress.submitted_any = true;
            progress.take_one();
            self.finish_row(row, report, progress, result);
        }
        for row in &to_send[attempted..] {
            result.record(row.row_index, RowState::Pending);
        }
        Ok(())
    }

    /// One row through the retry schedule. Every attempt is logged before the next decision.
    async fn submit_row(
        &self,
        chunk_index: ChunkIndex,
        row: &BuiltPayload,
        mode: Mode,
        options: &RunOptions,
    ) -> Result<RowReport, RunError> {
        let mut schedule = RetrySchedule::new(options.retry.clone());
        self.sink.emit(PipelineEvent::RowChanged {
            row_index: row.row_index,
            state: RowState::Sent,
        });
        loop {
            let request = SubmissionRequest {
                row_index: row.row_index,
                chunk_index,
                attempt: schedule.next_attempt(),
                payload: &row.payload,
            };
            let outcome = self.client.submit(&request, mode).await;
            Arc::clone(&self.log).append_async(outcome.clone()).await?;
            self.sink.emit(PipelineEvent::Attempt(outcome.clone()));

            match schedule.record(&outcome.status) {
                RetryDecision::Accept => {
                    return Ok(RowReport {
                        state: RowState::Acked,
                        last_status: outcome.status,
                    })
                }
                RetryDecision::GiveUp => {
                    pipeline_warn!(
                        "Row {} failed after {} attempt(s): {}",
                        row.row_index,
                        schedule.attempts(),
                        outcome.status
                    );
                    return Ok(RowReport {
                        state: RowState::Failed,
                        last_status: outcome.status,
                    });
                }
                RetryDecision::Retry { attempt, delay } => {
                    if options.cancel.is_cancelled() {
                        pipeline_warn!(
                            "Row {} not retried after cancellation: {}",
                            row.row_index,
                            outcome.status
                        );
                        return Ok(RowReport {
                            state: RowState::Failed,
                            last_status: outcome.status,
                        });
                    }
                    pipeline_info!(
                        "Row {}: {}; attempt {} in {:?}",
                        row.row_index,
                        outcome.status,
                        attempt,
                        delay
                    );
                    self.sleeper.sleep(delay).await;
                }
            }
        }
    }

    fn skip_row(&self, row: &BuiltPayload, result: &mut ChunkResult) {
        result.skipped += 1;
        self.sink.emit(PipelineEvent::RowSkipped {
            row_index: row.row_index,
        });
    }

    fn finish_row(
        &self,
        row: &BuiltPayload,
        report: RowReport,
        progress: &mut RunProgress,
        result: &mut ChunkResult,
    ) {
        if report.state == RowState::Failed {
            progress.failures.push(report.last_status);
        }
        result.record(row.row_index, report.state);
        self.sink.emit(PipelineEvent::RowChanged {
            row_index: row.row_index,
            state: report.state,
        });
    }

    /// `first` and everything after it in the chunk are not attempted in this run.
    fn leave_unattempted<'a>(
        &self,
        first: &'a BuiltPayload,
        rest: impl Iterator<Item = &'a BuiltPayload>,
        options: &RunOptions,
        result: &mut ChunkResult,
    ) {
        for row in std::iter::once(first).chain(rest) {
            if options.skips(row.row_index) {
                self.skip_row(row, result);
            } else {
                result.record(row.row_index, RowState::Pending);
            }
        }
    }
}
