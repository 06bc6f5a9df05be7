//! Orchestrator for a judging run.
//!
//! Drives the pipeline from config to report:
//! load and plan, compile the solution (normal mode) or size-check it
//! (communication mode), compile the checker, splice and compile the stub
//! (communication mode), run every test in ascending order, aggregate, report. A compile failure skips straight to the report. Fatal
//! errors abort the run before or between tests.

use std::path::{Path, PathBuf};

use chrono::Utc;
use themis_common::{
    CompileStage, JudgeError, JudgeResult, ProblemMode, RunOutcome, TerminationCause, Verdict,
};
use themis_scoring::{Flow, ScoreAccumulator};
use uuid::Uuid;

use crate::checker::CheckerInvoker;
use crate::compiler::{self, CompileResult, Compiler, NativeToolchain};
use crate::config::Config;
use crate::constants::{REPORT_FILE, STAGED_ANSWER, STAGED_INPUT, STAGED_OUTPUT, STUB_MARKER};
use crate::plan::{TestCase, TestLayout, TestPlan};
use crate::problem::ProblemConfig;
use crate::report::{CompileFailureRecord, ScoreReport, TestRecord};
use crate::sandbox::{ProcessGroupRunner, RunRequest, SandboxRunner};
use crate::stub;

const SPLICED_NAME: &str = "solutionwithstub";

/// Judging pipeline with pluggable toolchain and sandbox
pub struct Judge {
    config: Config,
    compiler: Box<dyn Compiler>,
    runner: Box<dyn SandboxRunner>,
    checker: CheckerInvoker,
}

/// Everything fixed once the problem has been loaded
struct RunContext<'a> {
    problem: &'a ProblemConfig,
    plan: &'a TestPlan,
    run_dir: &'a Path,
    /// What actually runs for each test
    program: &'a Path,
    checker: &'a Path,
}

/// Mutable state threaded through the test loop
struct RunState {
    accumulator: ScoreAccumulator,
    records: Vec<TestRecord>,
}

impl RunState {
    fn new(plan: &TestPlan) -> JudgeResult<Self> {
        let accumulator = ScoreAccumulator::new(plan.policy.clone(), plan.shares())
            .map_err(|e| JudgeError::Scoring(e.to_string()))?;
        Ok(Self {
            accumulator,
            records: Vec::with_capacity(plan.tests.len()),
        })
    }

    fn record(&mut self, record: TestRecord) -> JudgeResult<Flow> {
        let flow = self
            .accumulator
            .record(record.id, record.raw_score)
            .map_err(|e| JudgeError::Scoring(e.to_string()))?;
        self.records.push(record);
        Ok(flow)
    }
}

impl Judge {
    /// Create a judge from its parts
    pub fn new(config: Config, compiler: Box<dyn Compiler>, runner: Box<dyn SandboxRunner>) -> Self {
        let checker = CheckerInvoker::new(config.execution.checker_log_lines);
        Self {
            config,
            compiler,
            runner,
            checker,
        }
    }

    /// Judge backed by host compilers and the process-group sandbox
    pub fn native(config: Config) -> Self {
        let compiler = NativeToolchain::new(
            config.execution.max_source_bytes,
            config.execution.compile_timeout_ms,
        );
        let runner = ProcessGroupRunner::new(config.execution.poll_interval_ms);
        Self::new(config, Box::new(compiler), Box::new(runner))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Judge the problem described by the config file at `problem_path`
    pub async fn run(&self, problem_path: &Path) -> JudgeResult<ScoreReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let problem = ProblemConfig::load(problem_path).await?;
        let plan = TestPlan::resolve(&problem, self.config.execution.max_tests).await?;

        tracing::info!(
            run_id = %run_id,
            mode = %problem.mode,
            scoring = %problem.scoring,
            tests = plan.tests.len(),
            max_score = plan.max_score,
            "Judging started"
        );

        tokio::fs::create_dir_all(&self.config.storage.scratch_path).await?;
        let run_dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(&self.config.storage.scratch_path)?;

        let mut report = ScoreReport {
            run_id,
            started_at,
            finished_at: started_at,
            problem: problem_path.to_path_buf(),
            mode: problem.mode,
            scoring: problem.scoring,
            tests: Vec::new(),
            final_score: 0.0,
            max_score: plan.max_score,
            halted_at: None,
            subtask_passed: Vec::new(),
            outcome: RunOutcome::Passed,
            compile_failure: None,
        };

        let build_dir = run_dir.path().join("build");

        // A communication solution is a fragment; only the spliced program compiles.
        let solution = match problem.mode {
            ProblemMode::Normal => match self
                .compile(CompileStage::Solution, &problem.solution, &build_dir.join("solution"))
                .await?
            {
                Ok(path) => Some(path),
                Err(failure) => return Ok(finish_with_failure(report, failure)),
            },
            ProblemMode::Communication => {
                let limit = self.config.execution.max_source_bytes;
                if let Some(failure) = compiler::check_source_size(&problem.solution, limit).await? {
                    let failure = CompileFailureRecord::new(CompileStage::Solution, failure);
                    return Ok(finish_with_failure(report, failure));
                }
                None
            }
        };

        let checker = match self
            .compile(CompileStage::Checker, &problem.checker, &build_dir.join("checker"))
            .await?
        {
            Ok(path) => path,
            Err(failure) => return Ok(finish_with_failure(report, failure)),
        };

        let program = match solution {
            Some(solution) => solution,
            None => {
                let stub_path = problem
                    .stub
                    .as_deref()
                    .ok_or_else(|| JudgeError::config("Communication problem must have stub"))?;
                let spliced = stub::splice_files(
                    stub_path,
                    &problem.solution,
                    run_dir.path(),
                    SPLICED_NAME,
                    STUB_MARKER,
                )
                .await?;
                match self
                    .compile(CompileStage::Stub, &spliced, &build_dir.join("stub"))
                    .await?
                {
                    Ok(path) => path,
                    Err(failure) => return Ok(finish_with_failure(report, failure)),
                }
            }
        };

        let ctx = RunContext {
            problem: &problem,
            plan: &plan,
            run_dir: run_dir.path(),
            program: &program,
            checker: &checker,
        };

        let mut state = RunState::new(&plan)?;
        for test in &plan.tests {
            let record = self.run_test(&ctx, test).await?;
            if state.record(record)? == Flow::Halt {
                tracing::info!(test_id = test.id, "ACM run stopped at first failed test");
                break;
            }
        }

        let aggregate = state.accumulator.finish();
        report.tests = state.records;
        report.final_score = aggregate.final_score;
        report.halted_at = aggregate.halted_at;
        report.subtask_passed = aggregate.subtask_passed;
        report.outcome = if aggregate.failed {
            RunOutcome::Failed
        } else {
            RunOutcome::Passed
        };
        report.finished_at = Utc::now();

        tracing::info!(
            run_id = %run_id,
            final_score = report.final_score,
            outcome = %report.outcome,
            "Judging finished"
        );

        Ok(report)
    }

    /// Write the score file and the JSON report
    pub async fn persist(&self, report: &ScoreReport) -> JudgeResult<()> {
        report.write_score(&self.config.storage.score_file).await?;
        report
            .write_json(&self.config.storage.scratch_path.join(REPORT_FILE))
            .await?;
        Ok(())
    }

    async fn compile(
        &self,
        stage: CompileStage,
        source: &Path,
        out_dir: &Path,
    ) -> JudgeResult<Result<PathBuf, CompileFailureRecord>> {
        tracing::info!(stage = %stage, source = %source.display(), "Compiling");
        tokio::fs::create_dir_all(out_dir).await?;

        match self.compiler.compile(source, out_dir).await? {
            CompileResult::Compiled(path) => Ok(Ok(path)),
            CompileResult::Failed(failure) => {
                tracing::warn!(stage = %stage, kind = %failure.kind, "Compilation failed");
                Ok(Err(CompileFailureRecord::new(stage, failure)))
            }
        }
    }

    async fn run_test(&self, ctx: &RunContext<'_>, test: &TestCase) -> JudgeResult<TestRecord> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("test-{:02}-", test.id))
            .tempdir_in(ctx.run_dir)?;
        let work = scratch.path().join("work");
        tokio::fs::create_dir(&work).await?;

        let (input_name, output_name) = match &ctx.plan.layout {
            TestLayout::Stdio => (STAGED_INPUT, STAGED_OUTPUT),
            TestLayout::Fixed {
                input_name,
                output_name,
            } => (input_name.as_str(), output_name.as_str()),
        };
        let input = work.join(input_name);
        let output = work.join(output_name);
        let answer = scratch.path().join(STAGED_ANSWER);

        tokio::fs::copy(&test.input_path, &input).await?;
        tokio::fs::copy(&test.answer_path, &answer).await?;

        let mut request = RunRequest::new(
            ctx.program,
            &work,
            test.time_limit_ms,
            test.memory_limit_kb,
        );
        if ctx.plan.layout == TestLayout::Stdio {
            request.stdin = Some(input.clone());
            request.stdout = Some(output.clone());
        }
        if ctx.problem.mode == ProblemMode::Communication {
            request.args = vec![input.clone().into_os_string(), answer.clone().into_os_string()];
        }

        tracing::debug!(test_id = test.id, "Running");
        let usage = self.runner.run(&request).await?;

        let early = match usage.cause {
            TerminationCause::TimedOut => Some(Verdict::TimeLimitExceeded),
            TerminationCause::MemoryExceeded => Some(Verdict::MemoryLimitExceeded),
            TerminationCause::Normal if usage.exit_code != 0 => Some(Verdict::RuntimeError {
                exit_code: usage.exit_code,
            }),
            TerminationCause::Normal => None,
        };

        let (verdict, raw_score, checker_log) = match early {
            Some(verdict) => (verdict, 0.0, Vec::new()),
            None => {
                if !tokio::fs::try_exists(&output).await? {
                    tokio::fs::write(&output, b"").await?;
                }
                let report = self
                    .checker
                    .check(ctx.checker, &input, &output, &answer, &work)
                    .await?;
                (
                    Verdict::from_checker_score(report.score),
                    test.share * report.score,
                    report.log,
                )
            }
        };

        tracing::info!(
            test_id = test.id,
            verdict = verdict.code(),
            raw_score,
            share = test.share,
            time_ms = usage.time_ms.min(test.time_limit_ms),
            memory_kb = usage.memory_kb,
            "Test finished"
        );

        Ok(TestRecord {
            id: test.id,
            subtask: test.subtask,
            verdict,
            share: test.share,
            raw_score,
            time_ms: usage.time_ms,
            memory_kb: usage.memory_kb,
            checker_log,
        })
    }
}

fn finish_with_failure(mut report: ScoreReport, failure: CompileFailureRecord) -> ScoreReport {
    report.outcome = RunOutcome::for_compile_failure(failure.stage, failure.kind);
    report.compile_failure = Some(failure);
    report.finished_at = Utc::now();
    tracing::info!(run_id = %report.run_id, outcome = %report.outcome, "Judging finished");
    report
}
