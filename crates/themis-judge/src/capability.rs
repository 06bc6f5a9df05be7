//! Startup host capability check

use std::io::Write;
use std::path::{Path, PathBuf};

use themis_common::{JudgeError, JudgeResult};

/// Something the host must provide before any judging starts
pub trait CapabilityCheck {
    fn verify(&self) -> JudgeResult<()>;
}

/// Linux host requirements: readable `/proc` and a writable scratch directory
#[derive(Debug, Clone)]
pub struct HostCapabilities {
    proc_root: PathBuf,
    scratch: PathBuf,
}

impl HostCapabilities {
    pub fn new(scratch: &Path) -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            scratch: scratch.to_path_buf(),
        }
    }

    fn verify_proc(&self) -> JudgeResult<()> {
        let status = std::fs::read_to_string(self.proc_root.join("self").join("status"))
            .map_err(|e| {
                JudgeError::Capability(format!(
                    "{} is not readable: {}",
                    self.proc_root.display(),
                    e
                ))
            })?;

        if !status.lines().any(|line| line.starts_with("VmRSS:")) {
            return Err(JudgeError::Capability(
                "Process status does not report resident memory".to_string(),
            ));
        }
        Ok(())
    }

    fn verify_scratch(&self) -> JudgeResult<()> {
        let unwritable = |e: std::io::Error| {
            JudgeError::Capability(format!(
                "Scratch directory {} is not writable: {}",
                self.scratch.display(),
                e
            ))
        };

        std::fs::create_dir_all(&self.scratch).map_err(unwritable)?;
        let mut marker = tempfile::NamedTempFile::new_in(&self.scratch).map_err(unwritable)?;
        marker.write_all(b"themis").map_err(unwritable)?;
        Ok(())
    }
}

impl CapabilityCheck for HostCapabilities {
    fn verify(&self) -> JudgeResult<()> {
        self.verify_proc()?;
        self.verify_scratch()?;
        tracing::debug!(scratch = %self.scratch.display(), "Host capabilities verified");
        Ok(())
    }
}
