//! Fatal error type for a judging run.
//!
//! Anything represented here aborts the whole run. Per-test outcomes
//! (TLE, MLE, RE, WA) and compile failures are ordinary values, not errors.

use std::path::PathBuf;

use thiserror::Error;

/// Unrecoverable judge error.
#[derive(Error, Debug)]
pub enum JudgeError {
    /// Problem configuration is malformed or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// A file the run depends on does not exist
    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// Checker produced output that breaks its contract
    #[error("Checker error: {0}")]
    Checker(String),

    /// Spawning or supervising a child process failed
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Startup capability check failed
    #[error("Capability check failed: {0}")]
    Capability(String),

    /// Scoring engine rejected an update
    #[error("Scoring error: {0}")]
    Scoring(String),

    /// File I/O error
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl JudgeError {
    /// Returns the error code string for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            JudgeError::Config(_) => "CONFIGURATION_ERROR",
            JudgeError::MissingFile(_) => "MISSING_FILE",
            JudgeError::Checker(_) => "CHECKER_ERROR",
            JudgeError::Sandbox(_) => "SANDBOX_ERROR",
            JudgeError::Capability(_) => "CAPABILITY_ERROR",
            JudgeError::Scoring(_) => "SCORING_ERROR",
            JudgeError::Io(_) => "FILE_ERROR",
            JudgeError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        JudgeError::Config(msg.into())
    }
}

/// Result type alias using JudgeError
pub type JudgeResult<T> = Result<T, JudgeError>;
