//! Score report: rendering and persistence

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use themis_common::{
    CompileFailureKind, CompileStage, JudgeResult, ProblemMode, RunOutcome, ScoringPolicy,
    Verdict,
};
use uuid::Uuid;

use crate::compiler::CompileFailure;

/// Outcome of one executed test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestRecord {
    pub id: usize,
    pub subtask: Option<usize>,
    pub verdict: Verdict,
    /// Full share of the maximum score
    pub share: f64,
    /// Points actually earned
    pub raw_score: f64,
    pub time_ms: u64,
    pub memory_kb: u64,
    pub checker_log: Vec<String>,
}

/// A compilation that stopped the run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileFailureRecord {
    pub stage: CompileStage,
    pub kind: CompileFailureKind,
    pub log: String,
}

impl CompileFailureRecord {
    pub fn new(stage: CompileStage, failure: CompileFailure) -> Self {
        Self {
            stage,
            kind: failure.kind,
            log: failure.log,
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub problem: PathBuf,
    pub mode: ProblemMode,
    pub scoring: ScoringPolicy,
    pub tests: Vec<TestRecord>,
    /// Unrounded final score
    pub final_score: f64,
    pub max_score: f64,
    /// Test after which an ACM run stopped
    pub halted_at: Option<usize>,
    /// Pass flag of each subtask, empty when subtasks are not used
    pub subtask_passed: Vec<bool>,
    pub outcome: RunOutcome,
    pub compile_failure: Option<CompileFailureRecord>,
}

/// Round to two decimal places for display
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

/// Human-readable report
impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(
            f,
            "Problem: {} ({} mode, {} scoring)",
            self.problem.display(),
            self.mode,
            self.scoring
        )?;

        if let Some(failure) = &self.compile_failure {
            writeln!(f, "Compiling {}: {}", failure.stage, failure.kind)?;
            if !failure.log.trim().is_empty() {
                writeln!(f, "Logs\n---")?;
                writeln!(f, "{}", failure.log.trim_end())?;
                writeln!(f, "---")?;
            }
        }

        for test in &self.tests {
            write!(
                f,
                "Test {:02}: {:<3} {:>8.2}/{:.2}  {} ms  {} KB",
                test.id,
                test.verdict.code(),
                round_score(test.raw_score),
                round_score(test.share),
                test.time_ms,
                test.memory_kb
            )?;
            if let Some(subtask) = test.subtask {
                write!(f, "  [subtask {subtask}]")?;
            }
            writeln!(f)?;
            if let Verdict::RuntimeError { exit_code } = test.verdict {
                writeln!(f, "    Process returned exit code {exit_code}")?;
            }
            for line in &test.checker_log {
                writeln!(f, "    {line}")?;
            }
        }

        if let Some(id) = self.halted_at {
            writeln!(f, "Stopped after test {id:02}")?;
        }
        for (id, passed) in self.subtask_passed.iter().enumerate() {
            writeln!(
                f,
                "Subtask {id}: {}",
                if *passed { "passed" } else { "failed" }
            )?;
        }

        writeln!(
            f,
            "Your score: {:.2}/{:.2}",
            round_score(self.final_score),
            self.max_score
        )?;
        writeln!(f, "Outcome: {}", self.outcome)
    }
}

impl ScoreReport {
    /// Write the unrounded final score to `path`
    pub async fn write_score(&self, path: &Path) -> JudgeResult<()> {
        ensure_parent(path).await?;
        tokio::fs::write(path, format!("{}\n", self.final_score)).await?;
        Ok(())
    }

    /// Write the full report as pretty JSON to `path`
    pub async fn write_json(&self, path: &Path) -> JudgeResult<()> {
        ensure_parent(path).await?;
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

async fn ensure_parent(path: &Path) -> JudgeResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ScoreReport {
        let now = Utc::now();
        ScoreReport {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            problem: PathBuf::from("/p/themisv2.cfg"),
            mode: ProblemMode::Normal,
            scoring: ScoringPolicy::Normal,
            tests: vec![
                TestRecord {
                    id: 0,
                    subtask: None,
                    verdict: Verdict::Accepted { score: 1.0 },
                    share: 10.0 / 3.0,
                    raw_score: 10.0 / 3.0,
                    time_ms: 12,
                    memory_kb: 2048,
                    checker_log: vec!["ok".to_string()],
                },
                TestRecord {
                    id: 1,
                    subtask: None,
                    verdict: Verdict::RuntimeError { exit_code: -11 },
                    share: 10.0 / 3.0,
                    raw_score: 0.0,
                    time_ms: 3,
                    memory_kb: 512,
                    checker_log: Vec::new(),
                },
            ],
            final_score: 10.0 / 3.0,
            max_score: 10.0,
            halted_at: None,
            subtask_passed: Vec::new(),
            outcome: RunOutcome::Failed,
            compile_failure: None,
        }
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(3.33333), 3.33);
        assert_eq!(round_score(6.666), 6.67);
        assert_eq!(round_score(20.0), 20.0);
    }

    #[test]
    fn test_display_report() {
        let text = sample().to_string();
        assert!(text.contains("Test 00: AC"));
        assert!(text.contains("Test 01: RE"));
        assert!(text.contains("Process returned exit code -11"));
        assert!(text.contains("    ok"));
        assert!(text.contains("Your score: 3.33/10.00"));
        assert!(text.contains("Outcome: FAILED"));
    }

    #[test]
    fn test_display_compile_failure() {
        let mut report = sample();
        report.tests.clear();
        report.final_score = 0.0;
        report.outcome = RunOutcome::CompileError;
        report.compile_failure = Some(CompileFailureRecord {
            stage: CompileStage::Solution,
            kind: CompileFailureKind::CompileError,
            log: "sol.cpp:1: error: expected ';'\n".to_string(),
        });

        let text = report.to_string();
        assert!(text.contains("Compiling solution: Compilation error"));
        assert!(text.contains("expected ';'"));
        assert!(text.contains("Outcome: COMPILE_ERROR"));
    }

    #[tokio::test]
    async fn test_persist_unrounded_score_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample();

        let score_path = dir.path().join("out").join("score.txt");
        report.write_score(&score_path).await.unwrap();
        let written: f64 = std::fs::read_to_string(&score_path)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(written, 10.0 / 3.0);

        let json_path = dir.path().join("report.json");
        report.write_json(&json_path).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(json_path).unwrap()).unwrap();
        assert_eq!(value["outcome"], "FAILED");
        assert_eq!(value["tests"][1]["verdict"]["kind"], "RUNTIME_ERROR");
        assert_eq!(value["tests"][1]["verdict"]["exit_code"], -11);
    }
}
