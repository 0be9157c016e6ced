//! Idempotent unified-diff application.
//!
//! Every applicator follows the same decision order:
//!
//! 1. Reverse check: if the reversed patch applies cleanly, the source already
//!    looks patched and the result is [`PatchOutcome::AlreadyApplied`].
//! 2. Forward dry run: if the patch does not apply cleanly the source is left
//!    untouched and [`PatchError::ContextMismatch`] is returned.
//! 3. Apply, then bump the source mtime so the build tool recompiles.
//!
//! Pre-build hooks run on every incremental build, so step 1 is what keeps a
//! second invocation from failing or double-applying.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

/// Result of a successful application.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchOutcome should be checked for applied/already-applied"]
pub enum PatchOutcome {
    /// Patch was applied (or, from `check`, would be applied)
    Applied { file: PathBuf },
    /// Source already carries the patch; nothing was written
    AlreadyApplied { file: PathBuf },
}

impl PatchOutcome {
    pub fn file(&self) -> &Path {
        match self {
            PatchOutcome::Applied { file } | PatchOutcome::AlreadyApplied { file } => file,
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("patch file not found: {0}")]
    PatchFileMissing(PathBuf),

    #[error("source file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("malformed patch {patch}: {reason}")]
    MalformedPatch { patch: PathBuf, reason: String },

    #[error("patch {patch} does not apply cleanly to {source_file}: {detail}")]
    ContextMismatch {
        patch: PathBuf,
        source_file: PathBuf,
        detail: String,
    },

    #[error("failed to run patch tool `{program}`: {source}")]
    ToolUnavailable {
        program: String,
        source: std::io::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Applies one patch file to one source file.
pub trait PatchApplicator {
    /// Apply `patch` to `source` in place.
    fn apply(&self, patch: &Path, source: &Path) -> Result<PatchOutcome, PatchError>;

    /// Decide what [`apply`](Self::apply) would do without touching the
    /// source. `Applied` means "would apply".
    fn check(&self, patch: &Path, source: &Path) -> Result<PatchOutcome, PatchError>;
}

fn ensure_inputs(patch: &Path, source: &Path) -> Result<(), PatchError> {
    if !patch.is_file() {
        return Err(PatchError::PatchFileMissing(patch.to_path_buf()));
    }
    if !source.is_file() {
        return Err(PatchError::SourceMissing(source.to_path_buf()));
    }
    Ok(())
}

fn touch(path: &Path) -> Result<(), PatchError> {
    filetime::set_file_mtime(path, filetime::FileTime::now()).map_err(|source| PatchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Drives an external `patch(1)`-compatible tool.
#[derive(Debug, Clone)]
pub struct PatchTool {
    program: String,
    strip: u32,
}

impl Default for PatchTool {
    fn default() -> Self {
        Self {
            program: "patch".to_string(),
            strip: 1,
        }
    }
}

impl PatchTool {
    pub fn new(program: impl Into<String>, strip: u32) -> Self {
        Self {
            program: program.into(),
            strip,
        }
    }

    fn run(&self, patch: &Path, source: &Path, extra: &[&str]) -> Result<Output, PatchError> {
        let mut command = Command::new(&self.program);
        command
            .arg(format!("-p{}", self.strip))
            .args([
                "--force",
                "--silent",
                "--fuzz=0",
                "--no-backup-if-mismatch",
                "-r",
                "-",
            ])
            .args(extra)
            .arg("-i")
            .arg(patch)
            .arg(source);

        tracing::trace!(?command, "invoking patch tool");

        command.output().map_err(|source| PatchError::ToolUnavailable {
            program: self.program.clone(),
            source,
        })
    }

    fn already_applied(&self, patch: &Path, source: &Path) -> Result<bool, PatchError> {
        let output = self.run(patch, source, &["--reverse", "--dry-run"])?;
        Ok(output.status.success())
    }

    fn forward(&self, patch: &Path, source: &Path, dry_run: bool) -> Result<(), PatchError> {
        let extra: &[&str] = if dry_run {
            &["--forward", "--dry-run"]
        } else {
            &["--forward"]
        };
        let output = self.run(patch, source, extra)?;
        if output.status.success() {
            return Ok(());
        }

        let mut detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !detail.is_empty() {
                detail.push('\n');
            }
            detail.push_str(stderr.trim());
        }
        if detail.is_empty() {
            detail = format!("{} exited with {}", self.program, output.status);
        }

        Err(PatchError::ContextMismatch {
            patch: patch.to_path_buf(),
            source_file: source.to_path_buf(),
            detail,
        })
    }
}

impl PatchApplicator for PatchTool {
    fn apply(&self, patch: &Path, source: &Path) -> Result<PatchOutcome, PatchError> {
        match self.check(patch, source)? {
            already @ PatchOutcome::AlreadyApplied { .. } => Ok(already),
            PatchOutcome::Applied { file } => {
                self.forward(patch, source, false)?;
                touch(source)?;
                Ok(PatchOutcome::Applied { file })
            }
        }
    }

    fn check(&self, patch: &Path, source: &Path) -> Result<PatchOutcome, PatchError> {
        ensure_inputs(patch, source)?;

        if self.already_applied(patch, source)? {
            return Ok(PatchOutcome::AlreadyApplied {
                file: source.to_path_buf(),
            });
        }

        self.forward(patch, source, true)?;
        Ok(PatchOutcome::Applied {
            file: source.to_path_buf(),
        })
    }
}

/// Applies unified diffs without an external tool.
///
/// The whole result is computed in memory and written with tempfile + fsync +
/// rename, so a failed application never leaves a partially patched source.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcess;

impl InProcess {
    fn read(path: &Path) -> Result<String, PatchError> {
        fs::read_to_string(path).map_err(|source| PatchError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the patched text, or `None` when the source already carries
    /// the patch.
    fn patched_text(&self, patch: &Path, source: &Path) -> Result<Option<String>, PatchError> {
        ensure_inputs(patch, source)?;

        let diff_text = Self::read(patch)?;
        let diff = diffy::Patch::from_str(&diff_text).map_err(|e| PatchError::MalformedPatch {
            patch: patch.to_path_buf(),
            reason: e.to_string(),
        })?;
        let content = Self::read(source)?;

        if diffy::apply(&content, &diff.reverse()).is_ok() {
            return Ok(None);
        }

        diffy::apply(&content, &diff)
            .map(Some)
            .map_err(|e| PatchError::ContextMismatch {
                patch: patch.to_path_buf(),
                source_file: source.to_path_buf(),
                detail: e.to_string(),
            })
    }
}

impl PatchApplicator for InProcess {
    fn apply(&self, patch: &Path, source: &Path) -> Result<PatchOutcome, PatchError> {
        let Some(patched) = self.patched_text(patch, source)? else {
            return Ok(PatchOutcome::AlreadyApplied {
                file: source.to_path_buf(),
            });
        };

        atomic_write(source, patched.as_bytes()).map_err(|e| PatchError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        touch(source)?;

        Ok(PatchOutcome::Applied {
            file: source.to_path_buf(),
        })
    }

    fn check(&self, patch: &Path, source: &Path) -> Result<PatchOutcome, PatchError> {
        let file = source.to_path_buf();
        Ok(match self.patched_text(patch, source)? {
            Some(_) => PatchOutcome::Applied { file },
            None => PatchOutcome::AlreadyApplied { file },
        })
    }
}

/// Atomic file write: tempfile in the same directory, fsync, rename.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
