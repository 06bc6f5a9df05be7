//! Common types used across Themis crates.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JudgeError;

/// How the submission is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemMode {
    /// Submission is compiled and run on its own
    Normal,
    /// Submission is spliced into a judge stub and run as one program
    Communication,
}

impl FromStr for ProblemMode {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ProblemMode::Normal),
            "communication" => Ok(ProblemMode::Communication),
            other => Err(JudgeError::config(format!("Invalid problem mode: {other:?}"))),
        }
    }
}

impl std::fmt::Display for ProblemMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProblemMode::Normal => write!(f, "normal"),
            ProblemMode::Communication => write!(f, "communication"),
        }
    }
}

/// Scoring policy declared by the problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringPolicy {
    /// Sum of per-test scores
    #[serde(rename = "normal")]
    Normal,
    /// First failing test stops the run
    #[serde(rename = "ACM")]
    Acm,
}

impl FromStr for ScoringPolicy {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ScoringPolicy::Normal),
            "ACM" => Ok(ScoringPolicy::Acm),
            other => Err(JudgeError::config(format!("Invalid scoring mode: {other:?}"))),
        }
    }
}

impl std::fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringPolicy::Normal => write!(f, "normal"),
            ScoringPolicy::Acm => write!(f, "ACM"),
        }
    }
}

/// Where the submission reads input and writes output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoMode {
    /// Standard input and output
    Stdio,
    /// Fixed file names in the working directory
    Fixedio,
}

impl FromStr for IoMode {
    type Err = JudgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdio" => Ok(IoMode::Stdio),
            "fixedio" => Ok(IoMode::Fixedio),
            other => Err(JudgeError::config(format!("Unsupported I/O mode: {other:?}"))),
        }
    }
}

impl std::fmt::Display for IoMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoMode::Stdio => write!(f, "stdio"),
            IoMode::Fixedio => write!(f, "fixedio"),
        }
    }
}

/// Why a supervised process stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationCause {
    /// Exited on its own
    Normal,
    /// Killed at the wall-clock deadline
    TimedOut,
    /// Killed for crossing the memory ceiling
    MemoryExceeded,
}

/// Verdict for a single test case
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Checker awarded a positive fraction of the test's share
    Accepted { score: f64 },
    /// Checker awarded nothing
    WrongAnswer,
    /// Exceeded time limit
    TimeLimitExceeded,
    /// Exceeded memory limit
    MemoryLimitExceeded,
    /// Program crashed or non-zero exit
    RuntimeError { exit_code: i32 },
}

impl Verdict {
    /// Build a verdict from a checker score in `[0, 1]`
    pub fn from_checker_score(score: f64) -> Self {
        if score > 0.0 {
            Verdict::Accepted { score }
        } else {
            Verdict::WrongAnswer
        }
    }

    /// Get short code for verdict
    pub fn code(&self) -> &'static str {
        match self {
            Verdict::Accepted { score } if *score < 1.0 => "PC",
            Verdict::Accepted { .. } => "AC",
            Verdict::WrongAnswer => "WA",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::RuntimeError { .. } => "RE",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Accepted { score } if *score < 1.0 => {
                write!(f, "Partially accepted ({score})")
            }
            Verdict::Accepted { .. } => write!(f, "Accepted"),
            Verdict::WrongAnswer => write!(f, "Wrong answer"),
            Verdict::TimeLimitExceeded => write!(f, "Time limit exceeded"),
            Verdict::MemoryLimitExceeded => write!(f, "Memory limit exceeded"),
            Verdict::RuntimeError { exit_code } => {
                write!(f, "Runtime error (exit code {exit_code})")
            }
        }
    }
}

/// Category of a failed compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompileFailureKind {
    /// Toolchain rejected the source
    CompileError,
    /// Source file exceeds the size ceiling
    SourceTooLarge,
    /// No toolchain for the source's extension
    UnsupportedLanguage,
}

impl std::fmt::Display for CompileFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileFailureKind::CompileError => write!(f, "Compilation error"),
            CompileFailureKind::SourceTooLarge => write!(f, "Source file too large"),
            CompileFailureKind::UnsupportedLanguage => write!(f, "Unsupported language"),
        }
    }
}

/// Which program was being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStage {
    Solution,
    Checker,
    Stub,
}

impl std::fmt::Display for CompileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileStage::Solution => write!(f, "solution"),
            CompileStage::Checker => write!(f, "checker"),
            CompileStage::Stub => write!(f, "solution (with stub)"),
        }
    }
}

/// Terminal outcome of a judging run, mapped onto the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    /// Every executed test earned its full share
    Passed,
    /// At least one test scored below its full share
    Failed,
    CompileError,
    SourceTooLarge,
    UnsupportedLanguage,
    /// Unrecoverable judge-side failure
    InternalError,
}

impl RunOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Passed => 0,
            RunOutcome::Failed => 1,
            RunOutcome::CompileError => 2,
            RunOutcome::SourceTooLarge => 3,
            RunOutcome::UnsupportedLanguage => 4,
            RunOutcome::InternalError => 5,
        }
    }

    /// Outcome for a compile failure at the given stage.
    ///
    /// A checker that does not build is the judge's fault, not the contestant's.
    pub fn for_compile_failure(stage: CompileStage, kind: CompileFailureKind) -> Self {
        match (stage, kind) {
            (CompileStage::Checker, _) => RunOutcome::InternalError,
            (_, CompileFailureKind::CompileError) => RunOutcome::CompileError,
            (_, CompileFailureKind::SourceTooLarge) => RunOutcome::SourceTooLarge,
            (_, CompileFailureKind::UnsupportedLanguage) => RunOutcome::UnsupportedLanguage,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Passed => write!(f, "PASSED"),
            RunOutcome::Failed => write!(f, "FAILED"),
            RunOutcome::CompileError => write!(f, "COMPILE_ERROR"),
            RunOutcome::SourceTooLarge => write!(f, "SOURCE_TOO_LARGE"),
            RunOutcome::UnsupportedLanguage => write!(f, "UNSUPPORTED_LANGUAGE"),
            RunOutcome::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}
