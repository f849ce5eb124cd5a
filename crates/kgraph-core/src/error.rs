use thiserror::Error;

/// Error kinds mirror the pipeline's failure taxonomy: connection and schema
/// errors are fatal for a run, the rest are recorded per-file or
/// per-placeholder and do not abort the stage.
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("ingest error for {path}: {reason}")]
    IngestFile { path: String, reason: String },

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("write error for {id}: {message}")]
    Write { id: String, message: String },

    #[error("resolve error for {id}: {message}")]
    Resolve { id: String, message: String },

    #[error("invariant violated: {0}")]
    Bug(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
