//! Formpost core: pure mapping, chunking, normalization and retry logic.
mod chunk;
mod filter;
mod mapping;
mod normalize;
mod resume;
mod retry;
mod summary;
mod types;

pub use chunk::{chunk, Chunk, ChunkError};
pub use filter::OutcomeFilter;
pub use mapping::{
    contains_placeholder, resolve, FormSchema, HeaderMapping, MappingEntry, MappingError,
    ResolvedRow,
};
pub use normalize::{
    build, BuiltPayload, FieldRule, NormalizationNote, NormalizationRules, NormalizeError,
};
pub use resume::{ResumeLedger, ResumeStatus};
pub use retry::{row_jitter, RetryDecision, RetryPolicy, RetrySchedule};
pub use summary::RunSummary;
pub use types::{
    ChunkIndex, ChunkResult, ChunkState, Mode, OutcomeStatus, Payload, Row, RowIndex, RowIndexed,
    RowState, StatusKind, SubmissionOutcome, TransportKind,
};
