//! Judge configuration management
//!
//! Runtime settings loaded from environment variables (and an optional `.env`
//! file). Problem-specific settings live in the problem config file instead,
//! see [`crate::problem`].

use std::env;
use std::path::PathBuf;

use crate::constants::{
    DEFAULT_CHECKER_LOG_LINES, DEFAULT_COMPILE_TIMEOUT_MS, DEFAULT_MAX_SOURCE_BYTES,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PROBLEM_CONFIG, MAX_TESTS, SCORE_FILE, SCRATCH_DIR_NAME,
};

/// Main judge configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub execution: ExecutionConfig,
}

/// File locations
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Problem config file read when no path is given on the command line
    pub problem_config: PathBuf,
    /// Scratch directory for build products and per-test staging
    pub scratch_path: PathBuf,
    /// File receiving the unrounded final score
    pub score_file: PathBuf,
}

/// Execution limits and tunables
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Interval between resource samples in milliseconds
    pub poll_interval_ms: u64,
    /// Source size ceiling in bytes
    pub max_source_bytes: u64,
    /// Checker diagnostic lines kept per test
    pub checker_log_lines: usize,
    /// Hard cap on discovered tests
    pub max_tests: usize,
    /// Wall-clock budget for one compiler invocation
    pub compile_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            storage: StorageConfig::from_env()?,
            execution: ExecutionConfig::from_env()?,
        })
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scratch_path = env::var("THEMIS_SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join(SCRATCH_DIR_NAME));

        Ok(Self {
            problem_config: PathBuf::from(
                env::var("THEMIS_PROBLEM_CONFIG")
                    .unwrap_or_else(|_| DEFAULT_PROBLEM_CONFIG.to_string()),
            ),
            score_file: env::var("THEMIS_SCORE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| scratch_path.join(SCORE_FILE)),
            scratch_path,
        })
    }
}

impl ExecutionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            poll_interval_ms: parse_var("THEMIS_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            max_source_bytes: parse_var("THEMIS_MAX_SOURCE_BYTES", DEFAULT_MAX_SOURCE_BYTES)?,
            checker_log_lines: parse_var("THEMIS_CHECKER_LOG_LINES", DEFAULT_CHECKER_LOG_LINES)?,
            max_tests: parse_var("THEMIS_MAX_TESTS", MAX_TESTS)?,
            compile_timeout_ms: parse_var("THEMIS_COMPILE_TIMEOUT_MS", DEFAULT_COMPILE_TIMEOUT_MS)?,
        })
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            checker_log_lines: DEFAULT_CHECKER_LOG_LINES,
            max_tests: MAX_TESTS,
            compile_timeout_ms: DEFAULT_COMPILE_TIMEOUT_MS,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
