//! The crate-boundary typed error enum (spec §7 + SPEC_FULL §7's ambient
//! layer). Internal code threads `anyhow::Result`; `run_job` and the action
//! methods convert the terminal failure into one of these variants.

use thiserror::Error;

/// Errors surfaced across the crate boundary from a job run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A bug in the operator graph itself (type mismatch, missing
    /// partitioner, malformed wide-op wiring) rather than a runtime failure.
    #[error("programmer error: {0}")]
    ProgrammerError(String),

    /// A source failed to split or read (spec §4.7).
    #[error("source error: {0}")]
    SourceError(#[source] anyhow::Error),

    /// A task failed during execution; conservatively fails the whole job
    /// (spec §7, §9 — no silent partial results).
    #[error("task failed in stage {stage}, partition {partition}: {source}")]
    TaskError {
        stage: usize,
        partition: usize,
        #[source]
        source: anyhow::Error,
    },

    /// A shuffle write or read failed; fatal per spec §4.5 ("a failure
    /// during shuffle write aborts the job").
    #[error("shuffle I/O error: {0}")]
    ShuffleIoError(#[source] anyhow::Error),

    /// A `save`/`stream` export failed for one partition; logged and
    /// non-fatal — the per-partition callback still fires (spec §7).
    #[error("upload error for partition {partition}: {source}")]
    UploadError {
        partition: usize,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;
