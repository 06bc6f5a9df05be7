//! Judge-wide constants
//!
//! Defaults for every tunable live here; `config.rs` reads overrides from the
//! environment.

// =============================================================================
// TEST LAYOUT
// =============================================================================

/// Hard cap on the number of discovered tests
pub const MAX_TESTS: usize = 500;

/// Extension of stdio-mode input files
pub const INPUT_EXTENSION: &str = "in";

/// Extension of stdio-mode answer files
pub const ANSWER_EXTENSION: &str = "ans";

// =============================================================================
// EXECUTION DEFAULTS
// =============================================================================

/// Default interval between resource samples, in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

/// Default source size ceiling (10 KB)
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 10 * 1024;

/// Default number of checker diagnostic lines kept per test
pub const DEFAULT_CHECKER_LOG_LINES: usize = 3;

/// Default wall-clock budget for one compiler invocation
pub const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 60_000;

// =============================================================================
// FILES
// =============================================================================

/// Default problem configuration file
pub const DEFAULT_PROBLEM_CONFIG: &str = "themisv2.cfg";

/// Scratch directory name under the system temp dir
pub const SCRATCH_DIR_NAME: &str = "themis";

/// Marker line a communication stub must contain
pub const STUB_MARKER: &str = "// Your code goes here";

/// Staged input file name (stdio mode)
pub const STAGED_INPUT: &str = "input.in";

/// Staged answer file name (stdio mode)
pub const STAGED_ANSWER: &str = "answer.ans";

/// Produced output file name (stdio mode)
pub const STAGED_OUTPUT: &str = "output.out";

/// Report file written next to the score file
pub const REPORT_FILE: &str = "report.json";

/// Score file name under the scratch directory
pub const SCORE_FILE: &str = "score.txt";
