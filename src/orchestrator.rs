//! Job orchestration: admission control, execution, and a pollable registry.
//!
//! The orchestrator is the long-lived face of the service. Submitting an
//! archive returns a [`JobId`] immediately; the pipeline runs on a spawned
//! task behind a semaphore that caps concurrent executions at
//! `max_concurrent_jobs`. Waiters beyond the cap queue FIFO, and the wait
//! counts against the job's own deadline — a job that spends its whole
//! budget queued fails with `timeout` without ever running.
//!
//! Job records live behind `watch` channels: the worker publishes every
//! state change, pollers snapshot the latest value, and [`wait`] blocks
//! until the record turns terminal without polling.
//!
//! [`wait`]: JobOrchestrator::wait

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock, Semaphore};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::ServiceConfig;
use crate::error::FontGenError;
use crate::generate::{self, WORKSPACE_PREFIX};
use crate::job::{Job, JobId, JobStatus};
use crate::tools::ToolConfig;

/// Long-lived job manager for the font-generation service.
///
/// Cheap to clone; all clones share the registry and the admission
/// semaphore.
#[derive(Clone)]
pub struct JobOrchestrator {
    config: Arc<ServiceConfig>,
    tools: ToolConfig,
    store: ArtifactStore,
    slots: Arc<Semaphore>,
    // Receivers only: the worker task owns the lone sender, so a finished
    // (or crashed) worker is observable through the channel state.
    jobs: Arc<RwLock<HashMap<JobId, watch::Receiver<Job>>>>,
}

impl JobOrchestrator {
    /// Build the orchestrator: resolve tools, open the artifact store, and
    /// sweep stale workspaces.
    ///
    /// Fails fast on anything a job could never recover from — a missing
    /// tracer or compiler, an unwritable storage root.
    pub fn new(config: ServiceConfig) -> Result<Self, FontGenError> {
        let tools = ToolConfig::resolve(&config)?;
        let store = ArtifactStore::open(&config.storage_dir)?;

        if config.cleanup_on_startup {
            sweep_stale_workspaces(&config);
        }

        info!(
            max_concurrent_jobs = config.max_concurrent_jobs,
            timeout_secs = config.timeout_secs,
            storage = %config.storage_dir.display(),
            "orchestrator ready"
        );

        Ok(JobOrchestrator {
            slots: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config: Arc::new(config),
            tools,
            store,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Admit an archive and return its job id without waiting for the run.
    ///
    /// The deadline clock starts now; queue wait is part of the budget.
    pub async fn submit(&self, archive: impl Into<PathBuf>) -> JobId {
        let archive = archive.into();
        let id = JobId::generate();
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);

        let (tx, rx) = watch::channel(Job::new(id.clone(), archive.clone()));
        self.jobs.write().await.insert(id.clone(), rx);
        info!(job = %id, archive = %archive.display(), "job admitted");

        let this = self.clone();
        let job_id = id.clone();
        tokio::spawn(async move {
            this.run_job(job_id, archive, tx, deadline).await;
        });

        id
    }

    /// Snapshot the current record for a job, if it exists.
    pub async fn job(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).map(|rx| rx.borrow().clone())
    }

    /// Wait until the job reaches a terminal state and return its record.
    ///
    /// Returns `None` for an unknown id.
    pub async fn wait(&self, id: &JobId) -> Option<Job> {
        let mut rx = self.jobs.read().await.get(id)?.clone();
        // The worker publishes a terminal state before dropping its sender,
        // so this resolves unless the worker panicked mid-run; either way
        // the latest published snapshot is the answer.
        let _ = rx.wait_for(|job| job.status.is_terminal()).await;
        let job = rx.borrow().clone();
        Some(job)
    }

    /// Drop records for terminal jobs, returning how many were removed.
    ///
    /// Artifacts in the store are untouched; only the in-memory registry
    /// shrinks.
    pub async fn prune_finished(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, rx| !rx.borrow().status.is_terminal());
        before - jobs.len()
    }

    async fn run_job(
        &self,
        id: JobId,
        archive: PathBuf,
        tx: watch::Sender<Job>,
        deadline: Instant,
    ) {
        // ── Admission: wait for a slot, bounded by the deadline ──────────
        let permit = match tokio::time::timeout_at(deadline, self.slots.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                // Semaphore closed; only happens if the process is tearing
                // down mid-flight.
                let err = FontGenError::Internal("job queue closed".to_string());
                tx.send_modify(|job| {
                    job.fail(&err);
                });
                return;
            }
            Err(_) => {
                warn!(job = %id, "deadline elapsed while queued");
                let err = FontGenError::Timeout {
                    secs: self.config.timeout_secs,
                    stage: "queue",
                };
                tx.send_modify(|job| {
                    job.fail(&err);
                });
                return;
            }
        };

        tx.send_modify(|job| {
            job.transition(JobStatus::Running);
        });

        // ── Execute the pipeline under the remaining budget ──────────────
        let result = generate::generate_in(
            &id,
            &archive,
            &self.config,
            &self.tools,
            &self.store,
            deadline,
        )
        .await;
        drop(permit);

        match result {
            Ok(output) => {
                tx.send_modify(|job| {
                    if job.transition(JobStatus::Succeeded) {
                        job.font_path = Some(output.font_path.clone());
                        job.glyph_errors = output.glyph_errors();
                    }
                });
            }
            Err(err) => {
                error!(job = %id, error = %err, "job failed");
                tx.send_modify(|job| {
                    job.fail(&err);
                });
            }
        }
    }
}

/// Remove leftover `font_work_*` directories from the workspace root.
///
/// Failures are logged and ignored: a stuck directory should not block
/// startup.
fn sweep_stale_workspaces(config: &ServiceConfig) {
    let root = config
        .temp_dir
        .clone()
        .unwrap_or_else(std::env::temp_dir);
    let entries = match std::fs::read_dir(&root) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    let mut swept = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_workspace = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(WORKSPACE_PREFIX));
        if !is_workspace {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => swept += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "failed to sweep stale workspace"),
        }
    }
    if swept > 0 {
        info!(swept, root = %root.display(), "stale workspaces removed");
    }
}
