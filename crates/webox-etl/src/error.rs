//! Error types for the ETL pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for ETL operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Errors raised while ingesting one source file.
///
/// Everything here aborts the current file's job only; the orchestrator
/// records the message in `etl_jobs.error_message` and the process moves on.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("malformed row {linha}: {reason}")]
    MalformedRow { linha: usize, reason: String },

    #[error("schema evolution rejected: {0}")]
    SchemaEvolution(String),

    #[error("source file has no data rows")]
    EmptyFile,

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("job {0} is already finalized")]
    JobAlreadyFinished(Uuid),

    #[error("database error: {0}")]
    Transaction(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
