//! Font compiler invocation: one FontForge run per job.
//!
//! The compiler is driven through a shipped Python script
//! (`resources/generate_font.py`) that FontForge executes with its embedded
//! interpreter. The service never parses the script; the argument vector is
//! fixed: language-select flag, script-select flag, script path, the
//! workspace holding the per-glyph SVGs, and the output font path.
//!
//! Unlike the tracer, the compiler's combined output goes to a log *file*
//! in the workspace rather than a pipe: FontForge is chatty, the log is a
//! first-class diagnostic artifact on failure, and a file redirect survives
//! the process being killed at the deadline.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::FontGenError;
use crate::tools::ToolConfig;

/// In-workspace name of the produced font.
pub const OUTPUT_FONT_NAME: &str = "output_font.ttf";
/// In-workspace name of the compiler log.
pub const COMPILER_LOG_NAME: &str = "fontforge.log";

/// Outcome of a successful compile.
#[derive(Debug)]
pub struct CompileOutcome {
    /// The font file inside the workspace.
    pub font_path: PathBuf,
    /// The log file, present regardless of outcome.
    pub log_path: PathBuf,
}

/// Run the font compiler over the workspace's SVG set.
///
/// Success requires exit code zero AND the output file existing. Any other
/// outcome is a `compile-error` carrying the log path so the caller can
/// preserve it in the artifact store.
pub async fn compile_font(
    tools: &ToolConfig,
    workspace: &Path,
    deadline: Instant,
) -> Result<CompileOutcome, FontGenError> {
    let font_path = workspace.join(OUTPUT_FONT_NAME);
    let log_path = workspace.join(COMPILER_LOG_NAME);

    let log_file = std::fs::File::create(&log_path)
        .map_err(|e| FontGenError::Internal(format!("failed to create compiler log: {e}")))?;
    let log_for_stderr = log_file
        .try_clone()
        .map_err(|e| FontGenError::Internal(format!("failed to clone log handle: {e}")))?;

    info!(workspace = %workspace.display(), "starting font compiler");
    let mut child = Command::new(&tools.compiler)
        .arg("-lang=py")
        .arg("-script")
        .arg(&tools.script)
        .arg(workspace)
        .arg(&font_path)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(log_for_stderr))
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| FontGenError::Internal(format!("failed to spawn font compiler: {e}")))?;

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(result) => result
            .map_err(|e| FontGenError::Internal(format!("failed to wait for compiler: {e}")))?,
        Err(_) => {
            // Deadline hit; dropping `child` kills the compiler. The caller
            // converts this into the job-level timeout error.
            warn!("font compiler exceeded the job deadline");
            return Err(FontGenError::Timeout { secs: 0, stage: "compile" });
        }
    };

    if !status.success() || !font_path.is_file() {
        warn!(exit_code = ?status.code(), "font compiler failed");
        return Err(FontGenError::CompileError {
            exit_code: status.code(),
            log: Some(log_path),
        });
    }

    debug!(font = %font_path.display(), "font compiled");
    Ok(CompileOutcome {
        font_path,
        log_path,
    })
}
