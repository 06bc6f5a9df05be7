//! Checker invocation
//!
//! The checker is trusted: it runs without time or memory ceilings and is
//! called as `checker <input> <output> <answer>`. The first whitespace token
//! of its first stdout line is the score in `[0, 1]`; the following lines are
//! free-form diagnostics.

use std::path::Path;
use std::process::Stdio;

use serde::Serialize;
use themis_common::{JudgeError, JudgeResult};
use tokio::process::Command;

/// What the checker said about one output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckerReport {
    /// Fraction of the test's share, in `[0, 1]`
    pub score: f64,
    pub log: Vec<String>,
    /// Logged only, never affects the score
    pub exit_code: Option<i32>,
}

/// Runs a compiled checker and parses its stdout
#[derive(Debug, Clone)]
pub struct CheckerInvoker {
    max_log_lines: usize,
}

impl CheckerInvoker {
    pub fn new(max_log_lines: usize) -> Self {
        Self { max_log_lines }
    }

    /// Check `output` against `answer` for the test described by `input`
    pub async fn check(
        &self,
        checker: &Path,
        input: &Path,
        output: &Path,
        answer: &Path,
        working_dir: &Path,
    ) -> JudgeResult<CheckerReport> {
        let result = Command::new(checker)
            .arg(input)
            .arg(output)
            .arg(answer)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                JudgeError::Checker(format!("Failed to run {}: {}", checker.display(), e))
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        let (score, log) = parse_checker_output(&stdout, self.max_log_lines)?;
        let exit_code = result.status.code();

        tracing::debug!(score, exit_code = ?exit_code, "Checker finished");
        if !result.status.success() {
            tracing::warn!(exit_code = ?exit_code, "Checker exited with non-zero status");
        }

        Ok(CheckerReport {
            score,
            log,
            exit_code,
        })
    }
}

/// Split checker stdout into the score and at most `max_log_lines` diagnostics
pub fn parse_checker_output(stdout: &str, max_log_lines: usize) -> JudgeResult<(f64, Vec<String>)> {
    let mut lines = stdout.lines();

    let first = lines
        .next()
        .ok_or_else(|| JudgeError::Checker("Checker printed nothing".to_string()))?;
    let token = first
        .split_whitespace()
        .next()
        .ok_or_else(|| JudgeError::Checker("Checker's first line is empty".to_string()))?;
    let score: f64 = token
        .parse()
        .map_err(|_| JudgeError::Checker(format!("Unparsable score: {token:?}")))?;

    if !(0.0..=1.0).contains(&score) {
        return Err(JudgeError::Checker(format!(
            "Given score is not in range [0, 1]: {score}"
        )));
    }

    let log = lines
        .take(max_log_lines)
        .map(|line| line.trim_end().to_string())
        .collect();

    Ok((score, log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_parse_score_and_log() {
        let (score, log) = parse_checker_output("0.5 partial\nline a\nline b\n", 3).unwrap();
        assert_eq!(score, 0.5);
        assert_eq!(log, vec!["line a", "line b"]);
    }

    #[test]
    fn test_log_is_bounded() {
        let (_, log) = parse_checker_output("1\na\nb\nc\nd\ne\n", 3).unwrap();
        assert_eq!(log, vec!["a", "b", "c"]);

        let (_, log) = parse_checker_output("1\na\n", 0).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_rejects_bad_scores() {
        assert!(parse_checker_output("", 3).is_err());
        assert!(parse_checker_output("   \n", 3).is_err());
        assert!(parse_checker_output("ok\n", 3).is_err());
        assert!(parse_checker_output("1.5\n", 3).is_err());
        assert!(parse_checker_output("-0.1\n", 3).is_err());
        assert!(parse_checker_output("NaN\n", 3).is_err());
    }

    #[tokio::test]
    async fn test_check_runs_script() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let answer = dir.path().join("ans");
        std::fs::write(&input, "1 2\n").unwrap();
        std::fs::write(&output, "3\n").unwrap();
        std::fs::write(&answer, "3\n").unwrap();

        let checker = write_script(
            dir.path(),
            "checker",
            r#"if cmp -s "$2" "$3"; then echo 1; echo same; else echo 0; echo differ; fi"#,
        );

        let invoker = CheckerInvoker::new(3);
        let report = invoker
            .check(&checker, &input, &output, &answer, dir.path())
            .await
            .unwrap();
        assert_eq!(report.score, 1.0);
        assert_eq!(report.log, vec!["same"]);
        assert_eq!(report.exit_code, Some(0));

        std::fs::write(&output, "4\n").unwrap();
        let report = invoker
            .check(&checker, &input, &output, &answer, dir.path())
            .await
            .unwrap();
        assert_eq!(report.score, 0.0);
        assert_eq!(report.log, vec!["differ"]);
    }

    #[tokio::test]
    async fn test_exit_status_does_not_affect_score() {
        let dir = tempfile::tempdir().unwrap();
        let checker = write_script(dir.path(), "checker", "echo 0.25; exit 7");

        let report = CheckerInvoker::new(3)
            .check(&checker, dir.path(), dir.path(), dir.path(), dir.path())
            .await
            .unwrap();
        assert_eq!(report.score, 0.25);
        assert_eq!(report.exit_code, Some(7));
    }

    #[tokio::test]
    async fn test_garbage_output_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let checker = write_script(dir.path(), "checker", "echo looks good");

        let err = CheckerInvoker::new(3)
            .check(&checker, dir.path(), dir.path(), dir.path(), dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CHECKER_ERROR");
    }
}
