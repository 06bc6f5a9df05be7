//! Test plan resolution
//!
//! Scans the tests directory, checks the declared per-test arrays against the
//! real test count, validates subtask coverage and computes score shares.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use themis_common::{IoMode, JudgeError, JudgeResult, ScoringPolicy};
use themis_scoring::{Policy, equal_shares, proportional_shares};

use crate::constants::{ANSWER_EXTENSION, INPUT_EXTENSION};
use crate::problem::{ProblemConfig, Strengths};

/// Where a test's files live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestLayout {
    /// `<dir>/<id>.in` and `<dir>/<id>.ans`
    Stdio,
    /// `<dir>/<id>/<input_name>` and `<dir>/<id>/<output_name>`
    Fixed {
        input_name: String,
        output_name: String,
    },
}

impl TestLayout {
    /// Layout implied by a problem config
    pub fn for_problem(config: &ProblemConfig) -> JudgeResult<Self> {
        match config.io_mode {
            IoMode::Stdio => Ok(TestLayout::Stdio),
            IoMode::Fixedio => match (&config.fixed_input, &config.fixed_output) {
                (Some(input), Some(output)) => Ok(TestLayout::Fixed {
                    input_name: input.clone(),
                    output_name: output.clone(),
                }),
                _ => Err(JudgeError::config("fixedio mode needs fixed input and output names")),
            },
        }
    }

    /// Path of a test's input file
    pub fn input_path(&self, dir: &Path, id: usize) -> PathBuf {
        match self {
            TestLayout::Stdio => dir.join(format!("{id:02}.{INPUT_EXTENSION}")),
            TestLayout::Fixed { input_name, .. } => dir.join(format!("{id:02}")).join(input_name),
        }
    }

    /// Path of a test's answer file
    pub fn answer_path(&self, dir: &Path, id: usize) -> PathBuf {
        match self {
            TestLayout::Stdio => dir.join(format!("{id:02}.{ANSWER_EXTENSION}")),
            TestLayout::Fixed { output_name, .. } => {
                dir.join(format!("{id:02}")).join(output_name)
            }
        }
    }
}

/// A single resolved test
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub id: usize,
    /// Full share of the maximum score
    pub share: f64,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
    pub subtask: Option<usize>,
    pub input_path: PathBuf,
    pub answer_path: PathBuf,
}

/// Resolved, validated set of tests
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub tests: Vec<TestCase>,
    pub layout: TestLayout,
    pub max_score: f64,
    /// Aggregation policy handed to the scoring engine
    pub policy: Policy,
}

impl TestPlan {
    /// Scan the tests directory and validate the config against it
    pub async fn resolve(config: &ProblemConfig, max_tests: usize) -> JudgeResult<Self> {
        let layout = TestLayout::for_problem(config)?;
        let count = discover_tests(&config.tests_dir, &layout, max_tests).await?;
        tracing::info!(count, tests_dir = %config.tests_dir.display(), "Discovered tests");
        Self::build(config, layout, count)
    }

    /// Build a plan for `count` tests known to exist
    pub fn build(config: &ProblemConfig, layout: TestLayout, count: usize) -> JudgeResult<Self> {
        if count == 0 {
            return Err(JudgeError::config("No valid test found"));
        }

        check_count("tests' strength", config.strengths.len(), count)?;
        check_count("time limits", config.time_limits_ms.len(), count)?;
        check_count("memory limits", config.memory_limits_kb.len(), count)?;

        let shares = match &config.strengths {
            Strengths::Equal(n) => equal_shares(config.max_score, *n),
            Strengths::Weighted(values) => proportional_shares(config.max_score, values),
        };

        let policy = match (&config.subtasks, config.scoring) {
            (_, ScoringPolicy::Acm) => Policy::Acm,
            (None, ScoringPolicy::Normal) => Policy::Normal,
            (Some(spec), ScoringPolicy::Normal) => {
                check_count("subtasks", spec.assignment.len(), count)?;
                let subtask_count = validate_subtask_ids(&spec.assignment)?;
                if spec.weights.len() != subtask_count {
                    return Err(JudgeError::config(format!(
                        "Number of counted subtasks ({subtask_count}) is different from your number of subtasks ({})",
                        spec.weights.len()
                    )));
                }
                Policy::Subtask {
                    assignment: spec.assignment.clone(),
                    weights: proportional_shares(config.max_score, &spec.weights),
                }
            }
        };

        let subtask_of = |id: usize| match &policy {
            Policy::Subtask { assignment, .. } => Some(assignment[id]),
            _ => None,
        };

        let tests = (0..count)
            .map(|id| TestCase {
                id,
                share: shares[id],
                time_limit_ms: config.time_limits_ms[id],
                memory_limit_kb: config.memory_limits_kb[id],
                subtask: subtask_of(id),
                input_path: layout.input_path(&config.tests_dir, id),
                answer_path: layout.answer_path(&config.tests_dir, id),
            })
            .collect();

        Ok(Self {
            tests,
            layout,
            max_score: config.max_score,
            policy,
        })
    }

    /// Full shares in test order
    pub fn shares(&self) -> Vec<f64> {
        self.tests.iter().map(|t| t.share).collect()
    }
}

fn check_count(what: &str, declared: usize, found: usize) -> JudgeResult<()> {
    if declared != found {
        return Err(JudgeError::config(format!(
            "Number of verified tests ({found}) is different from your number of {what} ({declared})"
        )));
    }
    Ok(())
}

/// Count tests by probing ids from 0 until a file pair is missing.
pub async fn discover_tests(dir: &Path, layout: &TestLayout, max_tests: usize) -> JudgeResult<usize> {
    let mut count = 0;
    while count < max_tests {
        let input = layout.input_path(dir, count);
        let answer = layout.answer_path(dir, count);
        if !is_file(&input).await || !is_file(&answer).await {
            break;
        }
        count += 1;
    }
    Ok(count)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Check that subtask ids cover exactly `0..k` and return `k`.
pub fn validate_subtask_ids(ids: &[usize]) -> JudgeResult<usize> {
    let distinct: BTreeSet<usize> = ids.iter().copied().collect();
    let mut previous: i64 = -1;
    for &id in &distinct {
        if id as i64 - previous != 1 {
            return Err(JudgeError::config(format!(
                "Wrong subtask form: subtask ids must be 0, 1, 2, ... without gaps (found {id} after {previous})"
            )));
        }
        previous = id as i64;
    }
    Ok(distinct.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::SubtaskSpec;
    use themis_common::ProblemMode;

    fn config(n: usize, tests_dir: &Path) -> ProblemConfig {
        ProblemConfig {
            mode: ProblemMode::Normal,
            scoring: ScoringPolicy::Normal,
            solution: PathBuf::from("sol.cpp"),
            checker: PathBuf::from("chk.cpp"),
            io_mode: IoMode::Stdio,
            fixed_input: None,
            fixed_output: None,
            tests_dir: tests_dir.to_path_buf(),
            strengths: Strengths::Weighted(vec![1.0; n]),
            max_score: 30.0,
            time_limits_ms: vec![1000; n],
            memory_limits_kb: vec![65536; n],
            stub: None,
            subtasks: None,
        }
    }

    #[test]
    fn test_validate_subtask_ids() {
        assert_eq!(validate_subtask_ids(&[0, 1, 2]).unwrap(), 3);
        assert_eq!(validate_subtask_ids(&[2, 0, 1, 1, 0]).unwrap(), 3);
        assert!(validate_subtask_ids(&[0, 2]).is_err()); // gap
        assert!(validate_subtask_ids(&[1, 2]).is_err()); // does not start at 0
        assert!(validate_subtask_ids(&[0, 1, 3, 4]).is_err());
    }

    #[test]
    fn test_layout_paths() {
        let dir = Path::new("/t");
        assert_eq!(TestLayout::Stdio.input_path(dir, 3), PathBuf::from("/t/03.in"));
        assert_eq!(TestLayout::Stdio.answer_path(dir, 12), PathBuf::from("/t/12.ans"));
        assert_eq!(TestLayout::Stdio.input_path(dir, 123), PathBuf::from("/t/123.in"));

        let fixed = TestLayout::Fixed {
            input_name: "A.INP".to_string(),
            output_name: "A.OUT".to_string(),
        };
        assert_eq!(fixed.input_path(dir, 0), PathBuf::from("/t/00/A.INP"));
        assert_eq!(fixed.answer_path(dir, 7), PathBuf::from("/t/07/A.OUT"));
    }

    #[tokio::test]
    async fn test_discovery_stops_at_first_gap() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["00.in", "00.ans", "01.in", "01.ans", "03.in", "03.ans"] {
            std::fs::write(dir.path().join(name), "1\n").unwrap();
        }
        let count = discover_tests(dir.path(), &TestLayout::Stdio, 500).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_discovery_requires_both_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("00.in"), "1\n").unwrap();
        std::fs::write(dir.path().join("00.ans"), "1\n").unwrap();
        std::fs::write(dir.path().join("01.in"), "1\n").unwrap();
        assert_eq!(discover_tests(dir.path(), &TestLayout::Stdio, 500).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_discovery_respects_cap() {
        let dir = tempfile::tempdir().unwrap();
        for id in 0..5 {
            std::fs::write(dir.path().join(format!("{id:02}.in")), "").unwrap();
            std::fs::write(dir.path().join(format!("{id:02}.ans")), "").unwrap();
        }
        assert_eq!(discover_tests(dir.path(), &TestLayout::Stdio, 3).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_discovery_fixed_layout() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TestLayout::Fixed {
            input_name: "A.INP".to_string(),
            output_name: "A.OUT".to_string(),
        };
        std::fs::create_dir(dir.path().join("00")).unwrap();
        std::fs::write(dir.path().join("00/A.INP"), "").unwrap();
        std::fs::write(dir.path().join("00/A.OUT"), "").unwrap();
        assert_eq!(discover_tests(dir.path(), &layout, 500).await.unwrap(), 1);
    }

    #[test]
    fn test_build_plan() {
        let cfg = config(3, Path::new("/t"));
        let plan = TestPlan::build(&cfg, TestLayout::Stdio, 3).unwrap();
        assert_eq!(plan.tests.len(), 3);
        assert_eq!(plan.shares(), vec![10.0, 10.0, 10.0]);
        assert_eq!(plan.policy, Policy::Normal);
        assert_eq!(plan.tests[2].input_path, PathBuf::from("/t/02.in"));
    }

    #[test]
    fn test_build_rejects_count_mismatch() {
        let cfg = config(3, Path::new("/t"));
        assert!(TestPlan::build(&cfg, TestLayout::Stdio, 2).is_err());
        assert!(TestPlan::build(&cfg, TestLayout::Stdio, 0).is_err());

        let mut cfg = config(3, Path::new("/t"));
        cfg.memory_limits_kb.pop();
        let err = TestPlan::build(&cfg, TestLayout::Stdio, 3).unwrap_err();
        assert!(err.to_string().contains("memory limits"));
    }

    #[test]
    fn test_build_subtask_policy() {
        let mut cfg = config(3, Path::new("/t"));
        cfg.subtasks = Some(SubtaskSpec {
            assignment: vec![0, 0, 1],
            weights: vec![1.0, 2.0],
        });
        let plan = TestPlan::build(&cfg, TestLayout::Stdio, 3).unwrap();
        assert_eq!(
            plan.policy,
            Policy::Subtask {
                assignment: vec![0, 0, 1],
                weights: vec![10.0, 20.0],
            }
        );
        assert_eq!(plan.tests[2].subtask, Some(1));

        cfg.subtasks = Some(SubtaskSpec {
            assignment: vec![0, 0, 2],
            weights: vec![1.0, 2.0],
        });
        assert!(TestPlan::build(&cfg, TestLayout::Stdio, 3).is_err());

        cfg.subtasks = Some(SubtaskSpec {
            assignment: vec![0, 0, 1],
            weights: vec![1.0, 2.0, 3.0],
        });
        assert!(TestPlan::build(&cfg, TestLayout::Stdio, 3).is_err());
    }

    #[test]
    fn test_acm_plan_ignores_subtasks() {
        let mut cfg = config(2, Path::new("/t"));
        cfg.scoring = ScoringPolicy::Acm;
        let plan = TestPlan::build(&cfg, TestLayout::Stdio, 2).unwrap();
        assert_eq!(plan.policy, Policy::Acm);
    }
}
