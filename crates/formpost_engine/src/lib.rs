//! Submission engine: dataset loading, HTTP transport, outcome log and the run orchestrator.
mod client;
mod config;
mod dataset;
mod decode;
mod export;
mod orchestrator;
mod outcome_log;
mod persist;
mod types;
mod verify;

pub use client::{
    encode_form, referer_for, ClientSettings, FormTransport, RateLimiter, SubmissionClient,
    SubmissionContext, SubmissionRequest,
};
pub use config::{ConfigError, FormConfig, SubmissionSettings};
pub use dataset::{load_csv, parse_csv, Dataset, DatasetError};
pub use decode::{decode_text, DecodeError, DecodedText};
pub use export::{
    export_chunks, export_failed_rows, export_source_rows, ExportError, ExportOptions,
    ExportSummary,
};
pub use orchestrator::{
    prepare_chunks, NoopProgressSink, Orchestrator, ProgressSink, RunError, RunOptions, Sleeper,
    TokioSleeper,
};
pub use outcome_log::{LogError, OutcomeLog};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use types::{system_clock, Clock, PipelineEvent, RunReport, TransportError};
pub use verify::{verify, PayloadMismatch, UnsubmittedRow, VerifyReport};
