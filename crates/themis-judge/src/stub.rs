//! Communication-mode stub splicing
//!
//! The submission is inserted into a judge-provided stub at the marker line.
//! Only the first line equal to the marker (ignoring surrounding whitespace)
//! is replaced.

use std::path::{Path, PathBuf};

use themis_common::{JudgeError, JudgeResult};

/// Replace the first marker line in `stub` with `submission`.
///
/// Returns `None` when no line matches the marker.
pub fn splice_at_marker(stub: &[String], submission: &[String], marker: &str) -> Option<Vec<String>> {
    let marker = marker.trim();
    let at = stub.iter().position(|line| line.trim() == marker)?;

    let mut spliced = Vec::with_capacity(stub.len() + submission.len());
    spliced.extend_from_slice(&stub[..at]);
    spliced.extend_from_slice(submission);
    spliced.extend_from_slice(&stub[at + 1..]);
    Some(spliced)
}

/// Stub and submission must be built by the same toolchain
pub fn ensure_same_language(stub: &Path, solution: &Path) -> JudgeResult<()> {
    if stub.extension() != solution.extension() {
        return Err(JudgeError::config(format!(
            "Stub {} and solution {} are written in different languages",
            stub.display(),
            solution.display()
        )));
    }
    Ok(())
}

/// Splice `solution` into `stub`, writing `<out_dir>/<name>.<ext>`
pub async fn splice_files(
    stub: &Path,
    solution: &Path,
    out_dir: &Path,
    name: &str,
    marker: &str,
) -> JudgeResult<PathBuf> {
    ensure_same_language(stub, solution)?;

    let stub_lines = read_lines(stub).await?;
    let solution_lines = read_lines(solution).await?;

    let spliced = splice_at_marker(&stub_lines, &solution_lines, marker).ok_or_else(|| {
        JudgeError::config(format!(
            "Stub {} has no {:?} line",
            stub.display(),
            marker
        ))
    })?;

    let mut dest = out_dir.join(name);
    if let Some(ext) = solution.extension() {
        dest.set_extension(ext);
    }

    let mut text = spliced.join("\n");
    text.push('\n');
    tokio::fs::write(&dest, text).await?;

    tracing::debug!(
        stub = %stub.display(),
        spliced = %dest.display(),
        lines = spliced.len(),
        "Spliced solution into stub"
    );

    Ok(dest)
}

async fn read_lines(path: &Path) -> JudgeResult<Vec<String>> {
    if !tokio::fs::try_exists(path).await? {
        return Err(JudgeError::MissingFile(path.to_path_buf()));
    }
    let text = tokio::fs::read_to_string(path).await?;
    Ok(text.lines().map(str::to_string).collect())
}
