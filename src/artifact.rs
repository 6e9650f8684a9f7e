//! Artifact store: durable per-job archival of inputs and outputs.
//!
//! The workspace is scratch — deleted the moment a job reaches a terminal
//! state — so anything worth keeping must be copied out first. The store is
//! a flat shared directory; filenames are prefixed with the job id to keep
//! concurrent jobs from colliding. Copies overwrite, which makes repeated
//! archival idempotent.
//!
//! Every copy except the success-path font copy is best-effort: losing a
//! reference SVG to a full disk is an operational annoyance, but demoting a
//! successfully compiled font to `failed` over it would punish the client
//! for a server-side bookkeeping problem. The font copy is the exception
//! because it is the only durable home of the result.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::FontGenError;
use crate::job::JobId;
use crate::pipeline::compile::COMPILER_LOG_NAME;

/// Handle on the shared artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open (creating if needed) the store rooted at `root`.
    ///
    /// An uncreatable root is a fatal configuration error: the service
    /// cannot honor its durability contract without it.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FontGenError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| FontGenError::StorageUnavailable {
            path: root.clone(),
            source: e,
        })?;
        Ok(ArtifactStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Destination path for a per-job artifact.
    fn dest(&self, job: &JobId, file_name: &str) -> PathBuf {
        self.root.join(format!("{job}_{file_name}"))
    }

    /// Copy the uploaded archive for post-hoc inspection. Best-effort.
    pub async fn stage_input(&self, job: &JobId, archive: &Path) {
        let name = archive
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("input.zip");
        self.copy_best_effort(archive, &self.dest(job, name)).await;
    }

    /// Copy every `*.svg` in the workspace. Best-effort.
    pub async fn archive_vectors(&self, job: &JobId, workspace: &Path) {
        let entries = match std::fs::read_dir(workspace) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(job = %job, error = %e, "cannot list workspace for archival");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_svg = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
            if !is_svg {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                self.copy_best_effort(&path, &self.dest(job, name)).await;
            }
        }
    }

    /// Copy the compiler log, if one was produced. Best-effort.
    pub async fn archive_log(&self, job: &JobId, workspace: &Path) {
        let log = workspace.join(COMPILER_LOG_NAME);
        if log.is_file() {
            self.copy_best_effort(&log, &self.dest(job, COMPILER_LOG_NAME))
                .await;
        }
    }

    /// Copy the compiled font into the store and return its durable path.
    ///
    /// This copy is *required*: the workspace is about to be deleted, so a
    /// failure here would destroy the job's only output.
    pub async fn archive_font(&self, job: &JobId, font: &Path) -> Result<PathBuf, FontGenError> {
        let name = font
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("output_font.ttf");
        let dest = self.dest(job, name);
        tokio::fs::copy(font, &dest)
            .await
            .map_err(|e| FontGenError::Internal(format!("failed to archive font: {e}")))?;
        debug!(job = %job, dest = %dest.display(), "font archived");
        Ok(dest)
    }

    async fn copy_best_effort(&self, from: &Path, to: &Path) {
        match tokio::fs::copy(from, to).await {
            Ok(_) => debug!(from = %from.display(), to = %to.display(), "artifact archived"),
            Err(e) => warn!(from = %from.display(), error = %e, "artifact copy failed"),
        }
    }
}
