use thiserror::Error;

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no GPU context available: {0}")]
    Unavailable(String),
    #[error("program `{entry}` failed to compile: {message}")]
    Compile { entry: &'static str, message: String },
    #[error("GPU dispatch failed: {0}")]
    Dispatch(String),
    #[error("unknown program handle {0}")]
    UnknownProgram(u32),
}

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("failed to read analysis file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed analysis JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("analysis timeline has no frames")]
    Empty,
}

#[derive(Debug, Error)]
pub enum TuningError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },
}
