use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures of the conversion stages. Field-level parse problems are
/// not errors; they surface as rejected records in the validation summary.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to open source table {path:?}: {source}")]
    SourceOpen { path: PathBuf, source: csv::Error },
    #[error("source table is missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("failed to read source row at line {line}: {source}")]
    SourceRow { line: u64, source: csv::Error },
    #[error("failed to read parquet source {path:?}: {source}")]
    Parquet {
        path: PathBuf,
        source: parquet::errors::ParquetError,
    },
    #[error("failed to encode feature collection: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to read back {path:?}: {reason}")]
    ReadBack { path: PathBuf, reason: String },
}

/// Failures of the external tile generator. Stdout and stderr are carried
/// verbatim so the caller can surface them.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("failed to start {program}: {source}")]
    Spawn { program: String, source: io::Error },
    #[error("{program} did not finish within {secs}s\nstdout: {stdout}\nstderr: {stderr}")]
    TimedOut {
        program: String,
        secs: u64,
        stdout: String,
        stderr: String,
    },
    #[error("{program} exited with status {}\nstdout: {stdout}\nstderr: {stderr}", describe_status(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}
