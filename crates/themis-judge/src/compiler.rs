//! Compilation stage.
//!
//! Turns a source file into an executable, or into a structured
//! [`CompileFailure`] when the toolchain rejects it. The language is picked
//! from the file extension. Oversized and unsupported sources are rejected
//! before any toolchain runs.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use themis_common::{CompileFailureKind, JudgeError, JudgeResult};
use tokio::process::Command;

/// Why a source did not produce an executable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileFailure {
    pub kind: CompileFailureKind,
    /// Toolchain output, or a one-line reason for pre-checks
    pub log: String,
}

/// Result of one compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    /// Path of the produced executable
    Compiled(PathBuf),
    Failed(CompileFailure),
}

impl CompileResult {
    pub fn failed(kind: CompileFailureKind, log: impl Into<String>) -> Self {
        CompileResult::Failed(CompileFailure {
            kind,
            log: log.into(),
        })
    }
}

/// Capability to build a source file into an executable
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `source`, placing the executable in `out_dir`
    async fn compile(&self, source: &Path, out_dir: &Path) -> JudgeResult<CompileResult>;
}

/// Languages the native toolchain knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cpp,
    C,
    Pascal,
    Rust,
}

impl Language {
    /// Detect the language from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            "c" => Some(Language::C),
            "pas" => Some(Language::Pascal),
            "rs" => Some(Language::Rust),
            _ => None,
        }
    }

    /// Program and arguments building `source` into `binary`
    fn command(&self, source: &Path, binary: &Path) -> (&'static str, Vec<OsString>) {
        match self {
            Language::Cpp => (
                "g++",
                vec![
                    "-O2".into(),
                    "-Wall".into(),
                    "-std=c++17".into(),
                    "-DTHEMIS".into(),
                    source.into(),
                    "-o".into(),
                    binary.into(),
                ],
            ),
            Language::C => (
                "gcc",
                vec![
                    "-O2".into(),
                    "-std=c11".into(),
                    "-DTHEMIS".into(),
                    source.into(),
                    "-o".into(),
                    binary.into(),
                    "-lm".into(),
                ],
            ),
            Language::Pascal => {
                // fpc takes the output path glued to the flag
                let mut output_flag = OsString::from("-o");
                output_flag.push(binary);
                (
                    "fpc",
                    vec![
                        "-O2".into(),
                        "-vewnh".into(),
                        "-Sm".into(),
                        "-Sc".into(),
                        "-Mfpc".into(),
                        output_flag,
                        source.into(),
                    ],
                )
            }
            Language::Rust => (
                "rustc",
                vec![
                    "-O".into(),
                    "--edition=2021".into(),
                    source.into(),
                    "-o".into(),
                    binary.into(),
                ],
            ),
        }
    }
}

/// Compiles with host toolchains found on `PATH`
#[derive(Debug, Clone)]
pub struct NativeToolchain {
    max_source_bytes: u64,
    timeout: Duration,
}

impl NativeToolchain {
    pub fn new(max_source_bytes: u64, timeout_ms: u64) -> Self {
        Self {
            max_source_bytes,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Pre-compilation checks shared by every toolchain.
///
/// Returns the detected language, or the failure to report without running
/// anything.
pub async fn precheck(
    source: &Path,
    max_source_bytes: u64,
) -> JudgeResult<Result<Language, CompileFailure>> {
    if !tokio::fs::try_exists(source).await? {
        return Err(JudgeError::MissingFile(source.to_path_buf()));
    }

    let Some(language) = Language::from_path(source) else {
        return Ok(Err(CompileFailure {
            kind: CompileFailureKind::UnsupportedLanguage,
            log: format!("No toolchain for {}", source.display()),
        }));
    };

    match check_source_size(source, max_source_bytes).await? {
        Some(failure) => Ok(Err(failure)),
        None => Ok(Ok(language)),
    }
}

/// Reject a source over `max_source_bytes`; a missing source is fatal
pub async fn check_source_size(
    source: &Path,
    max_source_bytes: u64,
) -> JudgeResult<Option<CompileFailure>> {
    let metadata = match tokio::fs::metadata(source).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(JudgeError::MissingFile(source.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let size = metadata.len();
    if size > max_source_bytes {
        return Ok(Some(CompileFailure {
            kind: CompileFailureKind::SourceTooLarge,
            log: format!("Source is {size} bytes, limit is {max_source_bytes}"),
        }));
    }
    Ok(None)
}

/// Executable name for a source: its file stem inside `out_dir`
pub fn binary_path(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| OsString::from("program"));
    out_dir.join(stem)
}

#[async_trait]
impl Compiler for NativeToolchain {
    async fn compile(&self, source: &Path, out_dir: &Path) -> JudgeResult<CompileResult> {
        let language = match precheck(source, self.max_source_bytes).await? {
            Ok(language) => language,
            Err(failure) => return Ok(CompileResult::Failed(failure)),
        };

        tokio::fs::create_dir_all(out_dir).await?;
        let binary = binary_path(source, out_dir);
        let (program, args) = language.command(source, &binary);

        tracing::debug!(
            source = %source.display(),
            compiler = program,
            "Invoking compiler"
        );

        let child = Command::new(program)
            .args(&args)
            .current_dir(out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CompileResult::failed(
                    CompileFailureKind::UnsupportedLanguage,
                    format!("Compiler {program} is not installed"),
                ));
            }
            Err(e) => {
                return Err(JudgeError::Sandbox(format!(
                    "Failed to start {program}: {e}"
                )));
            }
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Ok(CompileResult::failed(
                    CompileFailureKind::CompileError,
                    format!("Compilation timed out after {} ms", self.timeout.as_millis()),
                ));
            }
        };

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Ok(CompileResult::failed(CompileFailureKind::CompileError, log));
        }

        Ok(CompileResult::Compiled(binary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a.cpp")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("dir/b.cc")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("sol.pas")), Some(Language::Pascal));
        assert_eq!(Language::from_path(Path::new("main.rs")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("main.py")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_compile_command() {
        let (program, args) =
            Language::Cpp.command(Path::new("/w/sol.cpp"), Path::new("/w/out/sol"));
        assert_eq!(program, "g++");
        assert!(args.contains(&OsString::from("-DTHEMIS")));
        assert_eq!(args.last(), Some(&OsString::from("/w/out/sol")));

        let (program, args) =
            Language::Pascal.command(Path::new("/w/sol.pas"), Path::new("/w/out/sol"));
        assert_eq!(program, "fpc");
        assert!(args.contains(&OsString::from("-o/w/out/sol")));
    }

    #[test]
    fn test_binary_path() {
        assert_eq!(
            binary_path(Path::new("/src/checker.cpp"), Path::new("/build")),
            PathBuf::from("/build/checker")
        );
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.py");
        std::fs::write(&source, "print(1)\n").unwrap();

        let toolchain = NativeToolchain::new(10240, 1000);
        let result = toolchain.compile(&source, dir.path()).await.unwrap();
        match result {
            CompileResult::Failed(failure) => {
                assert_eq!(failure.kind, CompileFailureKind::UnsupportedLanguage)
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("big.cpp");
        std::fs::write(&source, vec![b' '; 10241]).unwrap();

        let toolchain = NativeToolchain::new(10240, 1000);
        let result = toolchain.compile(&source, dir.path()).await.unwrap();
        match result {
            CompileResult::Failed(failure) => {
                assert_eq!(failure.kind, CompileFailureKind::SourceTooLarge)
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_source_at_limit_passes_precheck() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("edge.c");
        std::fs::write(&source, vec![b' '; 10240]).unwrap();

        let language = precheck(&source, 10240).await.unwrap().unwrap();
        assert_eq!(language, Language::C);
    }

    #[tokio::test]
    async fn test_missing_source_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = NativeToolchain::new(10240, 1000);
        let err = toolchain
            .compile(&dir.path().join("gone.cpp"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::MissingFile(_)));
    }

    #[tokio::test]
    async fn test_size_check_ignores_language() {
        let dir = tempfile::tempdir().unwrap();
        // solution fragments need not compile, or even have a known extension
        let fragment = dir.path().join("fragment.txt");
        std::fs::write(&fragment, "solve() {\n").unwrap();
        assert!(check_source_size(&fragment, 100).await.unwrap().is_none());

        let failure = check_source_size(&fragment, 4).await.unwrap().unwrap();
        assert_eq!(failure.kind, CompileFailureKind::SourceTooLarge);

        let err = check_source_size(&dir.path().join("gone.cpp"), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::MissingFile(_)));
    }
}
