//! Problem configuration file.
//!
//! The file is a fixed sequence of plain-text lines. An empty (or missing)
//! line marks an optional field as unused:
//!
//! ```text
//! mode                 normal | communication
//! scoring policy       normal | ACM
//! solution path
//! checker path
//! i/o mode             stdio | fixedio
//! fixed input name     (fixedio only)
//! fixed output name    (fixedio only)
//! tests directory
//! N s_1 .. s_N         test strengths ("N" alone = equal strengths)
//! max score
//! N tl_1 .. tl_N       time limits in ms
//! N ml_1 .. ml_N       memory limits in KB
//! stub path            (communication only)
//! N id_1 .. id_N       subtask of each test (optional, normal policy only)
//! K w_1 .. w_K         subtask weights (required with subtasks)
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use themis_common::{IoMode, JudgeError, JudgeResult, ProblemMode, ScoringPolicy};

/// Per-test strengths as declared
#[derive(Debug, Clone, PartialEq)]
pub enum Strengths {
    /// Only a count was given; every test weighs the same
    Equal(usize),
    /// Explicit relative strengths
    Weighted(Vec<f64>),
}

impl Strengths {
    /// Declared number of tests
    pub fn len(&self) -> usize {
        match self {
            Strengths::Equal(n) => *n,
            Strengths::Weighted(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Subtask grouping as declared
#[derive(Debug, Clone, PartialEq)]
pub struct SubtaskSpec {
    /// Subtask id of each test
    pub assignment: Vec<usize>,
    /// Relative weight of each subtask
    pub weights: Vec<f64>,
}

/// Parsed problem configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemConfig {
    pub mode: ProblemMode,
    pub scoring: ScoringPolicy,
    pub solution: PathBuf,
    pub checker: PathBuf,
    pub io_mode: IoMode,
    pub fixed_input: Option<String>,
    pub fixed_output: Option<String>,
    pub tests_dir: PathBuf,
    pub strengths: Strengths,
    pub max_score: f64,
    pub time_limits_ms: Vec<u64>,
    pub memory_limits_kb: Vec<u64>,
    pub stub: Option<PathBuf>,
    pub subtasks: Option<SubtaskSpec>,
}

impl ProblemConfig {
    /// Read and parse a problem config file
    pub async fn load(path: &Path) -> JudgeResult<Self> {
        if !tokio::fs::try_exists(path).await? {
            return Err(JudgeError::MissingFile(path.to_path_buf()));
        }
        let text = tokio::fs::read_to_string(path).await?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&text, base_dir)
    }

    /// Parse config text, resolving relative paths against `base_dir`
    pub fn parse(text: &str, base_dir: &Path) -> JudgeResult<Self> {
        let mut lines = Lines::new(text);

        let mode: ProblemMode = lines.required("problem mode")?.parse()?;
        let scoring: ScoringPolicy = lines.required("scoring mode")?.parse()?;
        let solution = base_dir.join(lines.required("solution's destination")?);
        let checker = base_dir.join(lines.required("checker's destination")?);
        let io_mode: IoMode = lines.required("I/O mode")?.parse()?;

        let fixed_input = lines.optional();
        let fixed_output = lines.optional();
        if io_mode == IoMode::Fixedio {
            if fixed_input.is_none() {
                return Err(JudgeError::config("Unable to get fixed input name"));
            }
            if fixed_output.is_none() {
                return Err(JudgeError::config("Unable to get fixed output name"));
            }
        }

        let tests_dir = base_dir.join(lines.required("tests' destination")?);
        let strengths = parse_strengths(lines.required("tests' strength")?)?;

        let max_score: f64 = parse_value(lines.required("max score")?, "max score")?;
        if !max_score.is_finite() || max_score < 0.0 {
            return Err(JudgeError::config(format!("Invalid max score: {max_score}")));
        }

        let time_limits_ms: Vec<u64> = parse_counted(lines.required("time limits")?, "time limits")?;
        if time_limits_ms.contains(&0) {
            return Err(JudgeError::config("Time limits must be positive"));
        }
        let memory_limits_kb: Vec<u64> =
            parse_counted(lines.required("memory limits")?, "memory limits")?;
        if memory_limits_kb.contains(&0) {
            return Err(JudgeError::config("Memory limits must be positive"));
        }

        let stub = lines.optional().map(|p| base_dir.join(p));
        if mode == ProblemMode::Communication && stub.is_none() {
            return Err(JudgeError::config("Communication problem must have stub"));
        }

        let subtask_line = lines.optional();
        let weight_line = lines.optional();
        let subtasks = match (scoring, subtask_line) {
            (_, None) => None,
            (ScoringPolicy::Acm, Some(_)) => {
                tracing::warn!("Subtask scoring is ignored under the ACM scoring mode");
                None
            }
            (ScoringPolicy::Normal, Some(line)) => {
                let assignment: Vec<usize> = parse_counted(line, "subtasks")?;
                let weight_line = weight_line
                    .ok_or_else(|| JudgeError::config("Unable to get subtasks' scores"))?;
                let weights: Vec<f64> = parse_counted(weight_line, "subtasks' scores")?;
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(JudgeError::config("Subtask scores must be non-negative"));
                }
                Some(SubtaskSpec { assignment, weights })
            }
        };

        Ok(Self {
            mode,
            scoring,
            solution,
            checker,
            io_mode,
            fixed_input: fixed_input.map(str::to_string),
            fixed_output: fixed_output.map(str::to_string),
            tests_dir,
            strengths,
            max_score,
            time_limits_ms,
            memory_limits_kb,
            stub,
            subtasks,
        })
    }
}

/// Cursor over config lines; running off the end yields empty lines.
struct Lines<'a> {
    inner: std::str::Lines<'a>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self { inner: text.lines() }
    }

    fn next_trimmed(&mut self) -> &'a str {
        self.inner.next().map(str::trim).unwrap_or("")
    }

    fn required(&mut self, what: &str) -> JudgeResult<&'a str> {
        match self.next_trimmed() {
            "" => Err(JudgeError::config(format!("Unable to get {what}"))),
            line => Ok(line),
        }
    }

    fn optional(&mut self) -> Option<&'a str> {
        match self.next_trimmed() {
            "" => None,
            line => Some(line),
        }
    }
}

fn parse_value<T: FromStr>(token: &str, what: &str) -> JudgeResult<T> {
    token
        .parse()
        .map_err(|_| JudgeError::config(format!("Invalid value {token:?} in {what}")))
}

/// Parse an `"N v_1 .. v_N"` line, requiring exactly N values.
fn parse_counted<T: FromStr>(line: &str, what: &str) -> JudgeResult<Vec<T>> {
    let mut tokens = line.split_whitespace();
    let declared: usize = parse_value(tokens.next().unwrap_or(""), what)?;
    let values = tokens
        .map(|t| parse_value(t, what))
        .collect::<JudgeResult<Vec<T>>>()?;
    if values.len() != declared {
        return Err(JudgeError::config(format!(
            "Invalid number of {what}: declared {declared}, found {}",
            values.len()
        )));
    }
    Ok(values)
}

/// `N s1 .. sN`, or `N` alone for equal strengths (a Themis extension)
fn parse_strengths(line: &str) -> JudgeResult<Strengths> {
    let mut tokens = line.split_whitespace();
    let declared: usize = parse_value(tokens.next().unwrap_or(""), "tests' strength")?;
    if tokens.next().is_none() {
        return Ok(Strengths::Equal(declared));
    }

    let values: Vec<f64> = parse_counted(line, "tests' strength")?;
    if values.iter().any(|s| !s.is_finite() || *s < 0.0) {
        return Err(JudgeError::config("Test strengths must be non-negative"));
    }
    Ok(Strengths::Weighted(values))
}
