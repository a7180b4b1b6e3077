use std::sync::atomic::{AtomicUsize, Ordering};

use formpost_core::RowState;
use formpost_engine::{PipelineEvent, ProgressSink};
use pipeline_logging::{pipeline_debug, pipeline_info, pipeline_warn};

/// Turns pipeline events into a running row counter on the log.
#[derive(Debug, Default)]
pub struct LoggingSink {
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ProgressSink for LoggingSink {
    fn emit(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Prepared { rows, chunks } => {
                self.total.store(rows, Ordering::Relaxed);
                pipeline_info!("{} rows in {} chunks", rows, chunks);
            }
            PipelineEvent::RowSkipped { row_index } => {
                self.done.fetch_add(1, Ordering::Relaxed);
                pipeline_debug!("row {} already submitted, skipped", row_index);
            }
            PipelineEvent::RowChanged {
                row_index,
                state: RowState::Sent,
            } => {
                pipeline_debug!("row {} sent", row_index);
            }
            PipelineEvent::RowChanged { row_index, state } => {
                let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
                pipeline_info!(
                    "[{}/{}] row {}: {:?}",
                    done,
                    self.total.load(Ordering::Relaxed),
                    row_index,
                    state
                );
            }
            PipelineEvent::Attempt(outcome) if !outcome.status.is_success() => {
                pipeline_debug!(
                    "row {} attempt {}: {}",
                    outcome.row_index,
                    outcome.attempt,
                    outcome.status
                );
            }
            PipelineEvent::Cancelled { chunk_index } => {
                pipeline_warn!("Run cancelled at chunk {}", chunk_index);
            }
            _ => {}
        }
    }
}
