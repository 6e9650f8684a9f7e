//! Job records and the per-job state machine.
//!
//! A [`Job`] is a plain tagged record, not an opaque handle: callers poll or
//! await it through [`crate::orchestrator::JobOrchestrator`], and tests can
//! assert on the state field directly. The state machine is deliberately
//! tiny — `pending → running → succeeded | failed` — with sticky terminal
//! states so a late timeout can never overwrite a result that already
//! landed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::{FontGenError, GlyphError};

/// Unique identifier for a submitted job.
///
/// Built from the submission wall-clock plus a process-wide counter; the
/// counter disambiguates jobs admitted within the same millisecond. The id
/// doubles as the per-job filename prefix in the artifact store, so it must
/// stay filesystem-safe (digits, underscores).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

static JOB_SEQ: AtomicU64 = AtomicU64::new(0);

impl JobId {
    /// Generate a fresh id: `job_<unix_millis>_<seq>`.
    pub fn generate() -> Self {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let seq = JOB_SEQ.fetch_add(1, Ordering::Relaxed);
        JobId(format!("job_{millis}_{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Admitted, waiting for a worker slot.
    Pending,
    /// A worker is executing the pipeline.
    Running,
    /// Font produced and archived.
    Succeeded,
    /// Terminal failure; see [`Job::failure`].
    Failed,
}

impl JobStatus {
    /// Whether the state is terminal (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Wire-level failure classification.
///
/// Serialized in kebab-case so clients see the documented kind strings
/// (`malformed-input`, `no-valid-glyphs`, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    ConfigError,
    MalformedInput,
    NoValidGlyphs,
    CompileError,
    Timeout,
    InternalError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConfigError => "config-error",
            Self::MalformedInput => "malformed-input",
            Self::NoValidGlyphs => "no-valid-glyphs",
            Self::CompileError => "compile-error",
            Self::Timeout => "timeout",
            Self::InternalError => "internal-error",
        };
        f.write_str(s)
    }
}

/// Failure detail attached to a `failed` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&FontGenError> for JobFailure {
    fn from(err: &FontGenError) -> Self {
        JobFailure {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// The record for one submitted job.
///
/// Created on admission, mutated only by the single worker executing it,
/// snapshot-read by pollers. The workspace directory is not part of the
/// record: it exists only while the job runs and is deleted on the terminal
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// The uploaded archive as received.
    pub archive: PathBuf,
    pub created_at: SystemTime,
    pub status: JobStatus,
    /// Durable font location in the artifact store; set on success.
    pub font_path: Option<PathBuf>,
    /// Non-fatal per-glyph failures observed during the run.
    pub glyph_errors: Vec<GlyphError>,
    /// Set iff `status == Failed`.
    pub failure: Option<JobFailure>,
}

impl Job {
    /// Fresh `pending` record for an admitted archive.
    pub fn new(id: JobId, archive: PathBuf) -> Self {
        Job {
            id,
            archive,
            created_at: SystemTime::now(),
            status: JobStatus::Pending,
            font_path: None,
            glyph_errors: Vec::new(),
            failure: None,
        }
    }

    /// Transition to a new state. Terminal states are sticky: once the job
    /// has succeeded or failed, later transitions are ignored.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    /// Mark the job failed with the given error. No-op if already terminal.
    pub fn fail(&mut self, err: &FontGenError) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.failure = Some(JobFailure::from(err));
        true
    }
}
