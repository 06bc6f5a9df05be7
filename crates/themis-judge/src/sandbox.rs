//! Resource-limited process execution
//!
//! Every supervised program starts in its own process group and the judge
//! marks itself a child subreaper, so descendants that detach with `setsid`
//! or a double fork are re-parented to the judge instead of init. A poll loop
//! walks `/proc` for the leader's process tree, samples its memory and kills
//! every member with SIGKILL the moment the wall-clock deadline or the memory
//! ceiling is crossed. The tree is swept and reaped again after the leader
//! exits so no descendant outlives the step.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill, killpg};
use nix::sys::wait::{WaitPidFlag, waitpid};
use nix::unistd::Pid;
use serde::Serialize;
use themis_common::{JudgeError, JudgeResult, TerminationCause};
use tokio::process::Command;
use tokio::time::{Instant, MissedTickBehavior};

/// Upper bound on kill-and-rescan rounds when sweeping a finished step
const SWEEP_ROUNDS: usize = 50;

/// One supervised execution
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    /// File connected to the child's stdin (null when absent)
    pub stdin: Option<PathBuf>,
    /// File receiving the child's stdout (null when absent)
    pub stdout: Option<PathBuf>,
    pub time_limit_ms: u64,
    pub memory_limit_kb: u64,
}

impl RunRequest {
    /// Request with no arguments and null stdio
    pub fn new(program: &Path, working_dir: &Path, time_limit_ms: u64, memory_limit_kb: u64) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
            working_dir: working_dir.to_path_buf(),
            stdin: None,
            stdout: None,
            time_limit_ms,
            memory_limit_kb,
        }
    }
}

/// Observed usage of a supervised execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunUsage {
    /// Exit code, or the negated signal number when killed by a signal
    pub exit_code: i32,
    pub time_ms: u64,
    /// Peak sampled memory of the process tree
    pub memory_kb: u64,
    pub cause: TerminationCause,
}

impl RunUsage {
    /// Exited on its own with status 0
    pub fn is_clean_exit(&self) -> bool {
        self.cause == TerminationCause::Normal && self.exit_code == 0
    }
}

/// Capability to spawn a program under time and memory ceilings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Run to completion or until a ceiling is crossed
    async fn run(&self, request: &RunRequest) -> JudgeResult<RunUsage>;
}

/// Linux runner built on process trees and `/proc` sampling
#[derive(Debug, Clone)]
pub struct ProcessGroupRunner {
    poll_interval: Duration,
}

impl ProcessGroupRunner {
    pub fn new(poll_interval_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }
}

#[async_trait]
impl SandboxRunner for ProcessGroupRunner {
    async fn run(&self, request: &RunRequest) -> JudgeResult<RunUsage> {
        nix::sys::prctl::set_child_subreaper(true).map_err(|e| {
            JudgeError::Sandbox(format!("Failed to become child subreaper: {e}"))
        })?;

        let stdin = match &request.stdin {
            Some(path) => Stdio::from(std::fs::File::open(path)?),
            None => Stdio::null(),
        };
        let stdout = match &request.stdout {
            Some(path) => Stdio::from(std::fs::File::create(path)?),
            None => Stdio::null(),
        };

        let start = Instant::now();
        let mut child = Command::new(&request.program)
            .args(&request.args)
            .current_dir(&request.working_dir)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                JudgeError::Sandbox(format!(
                    "Failed to execute {}: {}",
                    request.program.display(),
                    e
                ))
            })?;

        let leader = child
            .id()
            .ok_or_else(|| JudgeError::Sandbox("Child exited before it was tracked".to_string()))?
            as i32;
        let mut tree = ProcessTree::new(leader);

        let deadline = start + Duration::from_millis(request.time_limit_ms);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut peak_kb = 0u64;
        let mut cause = TerminationCause::Normal;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = tokio::time::sleep_until(deadline) => {
                    cause = TerminationCause::TimedOut;
                    peak_kb = peak_kb.max(tree.memory_kb());
                    tree.kill_all();
                    break child.wait().await?;
                }
                _ = ticker.tick() => {
                    peak_kb = peak_kb.max(tree.memory_kb());
                    if peak_kb > request.memory_limit_kb {
                        cause = TerminationCause::MemoryExceeded;
                        tree.kill_all();
                        break child.wait().await?;
                    }
                }
            }
        };
        let elapsed = start.elapsed();

        // Leader is gone; anything it left behind goes too.
        tree.sweep().await;

        let exit_code = status
            .code()
            .or_else(|| status.signal().map(|signal| -signal))
            .unwrap_or(-1);

        let usage = RunUsage {
            exit_code,
            time_ms: elapsed.as_millis() as u64,
            memory_kb: peak_kb,
            cause,
        };

        tracing::debug!(
            program = %request.program.display(),
            exit_code = usage.exit_code,
            time_ms = usage.time_ms,
            memory_kb = usage.memory_kb,
            cause = ?usage.cause,
            "Process finished"
        );

        Ok(usage)
    }
}

/// One row of `/proc/<pid>/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcStat {
    pid: i32,
    state: char,
    ppid: i32,
    pgrp: i32,
    session: i32,
}

impl ProcStat {
    fn is_live(&self) -> bool {
        !matches!(self.state, 'Z' | 'X')
    }
}

/// Every process spawned on behalf of one leader.
///
/// A process belongs to the tree when its parent or process group does, or
/// when it was re-parented to the judge after leaving the judge's session.
/// Members stay tracked by pid once seen, so re-parenting cannot hide them.
#[derive(Debug)]
struct ProcessTree {
    leader: i32,
    judge: i32,
    judge_session: Option<i32>,
    members: BTreeSet<i32>,
}

impl ProcessTree {
    fn new(leader: i32) -> Self {
        let judge = std::process::id() as i32;
        let judge_session = read_stat(judge).map(|stat| stat.session);
        Self {
            leader,
            judge,
            judge_session,
            members: BTreeSet::from([leader]),
        }
    }

    /// Rescan `/proc` and return the live members
    fn refresh(&mut self) -> Vec<ProcStat> {
        let table = read_proc_table();
        loop {
            let before = self.members.len();
            for stat in &table {
                if stat.pid != self.judge && self.belongs(stat) {
                    self.members.insert(stat.pid);
                }
            }
            if self.members.len() == before {
                break;
            }
        }
        table
            .into_iter()
            .filter(|stat| self.members.contains(&stat.pid) && stat.is_live())
            .collect()
    }

    fn belongs(&self, stat: &ProcStat) -> bool {
        self.members.contains(&stat.pid)
            || self.members.contains(&stat.ppid)
            || stat.pgrp == self.leader
            || (stat.ppid == self.judge && Some(stat.session) != self.judge_session)
    }

    /// Resident memory of the live tree in KB, folded with the leader's
    /// kernel high-water mark so spikes between samples are not lost
    fn memory_kb(&mut self) -> u64 {
        let mut resident = 0u64;
        let mut leader_peak = 0u64;
        for stat in self.refresh() {
            let Some(memory) = read_memory(stat.pid) else {
                continue;
            };
            resident += memory.resident_kb;
            if stat.pid == self.leader {
                leader_peak = memory.peak_kb;
            }
        }
        resident.max(leader_peak)
    }

    /// SIGKILL every live member; returns how many were signalled
    fn kill_all(&mut self) -> usize {
        if let Err(e) = killpg(Pid::from_raw(self.leader), Signal::SIGKILL) {
            if e != Errno::ESRCH {
                tracing::warn!("Failed to kill process group {}: {}", self.leader, e);
            }
        }

        let live = self.refresh();
        for stat in &live {
            if let Err(e) = kill(Pid::from_raw(stat.pid), Signal::SIGKILL) {
                if e != Errno::ESRCH {
                    tracing::warn!("Failed to kill process {}: {}", stat.pid, e);
                }
            }
        }
        live.len()
    }

    /// Kill until nothing in the tree is alive, then reap adopted members
    async fn sweep(&mut self) {
        for _ in 0..SWEEP_ROUNDS {
            if self.kill_all() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        // The leader belongs to tokio; adopted descendants are ours to reap.
        for &pid in &self.members {
            if pid != self.leader {
                let _ = waitpid(Pid::from_raw(pid), Some(WaitPidFlag::WNOHANG));
            }
        }
    }
}

fn read_proc_table() -> Vec<ProcStat> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .filter_map(read_stat)
        .collect()
}

fn read_stat(pid: i32) -> Option<ProcStat> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat(&stat)
}

fn parse_stat(stat: &str) -> Option<ProcStat> {
    let pid = stat.split_whitespace().next()?.parse().ok()?;
    // comm may contain spaces and parentheses; fields resume after the last ')'
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let ppid = fields.next()?.parse().ok()?;
    let pgrp = fields.next()?.parse().ok()?;
    let session = fields.next()?.parse().ok()?;
    Some(ProcStat {
        pid,
        state,
        ppid,
        pgrp,
        session,
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
struct MemoryStatus {
    resident_kb: u64,
    peak_kb: u64,
}

fn read_memory(pid: i32) -> Option<MemoryStatus> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    Some(parse_status_memory(&status))
}

fn parse_status_memory(status: &str) -> MemoryStatus {
    let mut memory = MemoryStatus::default();
    for line in status.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb = value
            .split_whitespace()
            .next()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        match key {
            "VmRSS" => memory.resident_kb = kb,
            "VmHWM" => memory.peak_kb = kb,
            _ => {}
        }
    }
    memory
}
