//! One-shot generation entry points.
//!
//! [`generate`] drives the complete pipeline for a single archive: allocate
//! a workspace, stage the input, extract, fan the glyphs out through
//! normalize+trace, gate on at least one surviving vector, compile, archive
//! the result, and clean up. The whole run shares a single deadline; when
//! it elapses, in-flight subprocesses die with their dropped futures and
//! the workspace is still removed.
//!
//! [`crate::orchestrator::JobOrchestrator`] wraps this same core with
//! admission control and a pollable job registry; use `generate` directly
//! for CLIs and tests where one caller awaits one font.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::ServiceConfig;
use crate::error::{FontGenError, GlyphError};
use crate::job::JobId;
use crate::pipeline::{compile, extract, normalize, trace};
use crate::tools::ToolConfig;

/// Prefix for per-job workspace directories.
pub const WORKSPACE_PREFIX: &str = "font_work_";

/// Per-glyph outcome, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlyphResult {
    pub code_point: u32,
    /// Produced vector file (workspace-relative lifetime; gone after the
    /// job). `Some` iff the glyph traced successfully.
    pub svg_path: Option<PathBuf>,
    pub duration_ms: u64,
    pub error: Option<GlyphError>,
}

/// Aggregate statistics for one generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_glyphs: usize,
    pub traced_glyphs: usize,
    pub failed_glyphs: usize,
    pub extract_duration_ms: u64,
    pub trace_duration_ms: u64,
    pub compile_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// The result of a successful generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub job_id: JobId,
    /// Durable font location inside the artifact store.
    pub font_path: PathBuf,
    /// Per-glyph outcomes, sorted by code point. Failed glyphs appear here
    /// with their error; the job as a whole still succeeded.
    pub glyphs: Vec<GlyphResult>,
    pub stats: GenerationStats,
}

impl GenerationOutput {
    /// Non-fatal glyph errors recorded during the run.
    pub fn glyph_errors(&self) -> Vec<GlyphError> {
        self.glyphs
            .iter()
            .filter_map(|g| g.error.clone())
            .collect()
    }
}

/// Generate a font from a glyph archive.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `archive` — Path to a ZIP of `glyph_<codepoint>.png` images
/// * `config` — Service configuration
///
/// # Returns
/// `Ok(GenerationOutput)` on success, even if some glyphs failed (check
/// `output.stats.failed_glyphs`).
///
/// # Errors
/// Returns `Err(FontGenError)` only for fatal errors: unresolvable tools,
/// malformed archive, zero surviving glyphs, compiler failure, or the job
/// deadline elapsing.
pub async fn generate(
    archive: impl AsRef<Path>,
    config: &ServiceConfig,
) -> Result<GenerationOutput, FontGenError> {
    let tools = ToolConfig::resolve(config)?;
    let store = ArtifactStore::open(&config.storage_dir)?;
    let job_id = JobId::generate();
    let deadline = Instant::now() + Duration::from_secs(config.timeout_secs);
    generate_in(&job_id, archive.as_ref(), config, &tools, &store, deadline).await
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    archive: impl AsRef<Path>,
    config: &ServiceConfig,
) -> Result<GenerationOutput, FontGenError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FontGenError::Internal(format!("failed to create tokio runtime: {e}")))?
        .block_on(generate(archive, config))
}

/// Pipeline core shared by [`generate`] and the orchestrator.
///
/// The caller supplies resolved tools, an opened store, and the absolute
/// deadline (which, under the orchestrator, already had the queue wait
/// deducted from it).
pub(crate) async fn generate_in(
    job_id: &JobId,
    archive: &Path,
    config: &ServiceConfig,
    tools: &ToolConfig,
    store: &ArtifactStore,
    deadline: Instant,
) -> Result<GenerationOutput, FontGenError> {
    let total_start = Instant::now();
    info!(job = %job_id, archive = %archive.display(), "starting font generation");

    // ── Step 1: Allocate a fresh workspace ───────────────────────────────
    let workspace = create_workspace(config)?;
    debug!(job = %job_id, workspace = %workspace.path().display(), "workspace created");

    // ── Step 2: Stage the input archive (best-effort) ────────────────────
    store.stage_input(job_id, archive).await;

    // ── Steps 3–6: the deadline-bounded pipeline ─────────────────────────
    let result = match tokio::time::timeout_at(
        deadline,
        run_pipeline(archive, workspace.path(), config, tools, deadline),
    )
    .await
    {
        Ok(result) => result.map_err(|e| normalize_timeout(e, config.timeout_secs)),
        Err(_) => Err(FontGenError::Timeout {
            secs: config.timeout_secs,
            stage: "pipeline",
        }),
    };

    // ── Step 7: Archive whatever the run produced ────────────────────────
    // SVGs are archived on every outcome: on failure they are the primary
    // diagnostic, on success the per-glyph reference copies.
    store.archive_vectors(job_id, workspace.path()).await;

    let output = match result {
        Ok(yielded) => {
            let font_path = store.archive_font(job_id, &yielded.font_path).await?;
            let stats = GenerationStats {
                total_glyphs: yielded.glyphs.len(),
                traced_glyphs: yielded.glyphs.iter().filter(|g| g.error.is_none()).count(),
                failed_glyphs: yielded.glyphs.iter().filter(|g| g.error.is_some()).count(),
                extract_duration_ms: yielded.extract_duration_ms,
                trace_duration_ms: yielded.trace_duration_ms,
                compile_duration_ms: yielded.compile_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
            };
            info!(
                job = %job_id,
                traced = stats.traced_glyphs,
                failed = stats.failed_glyphs,
                total_ms = stats.total_duration_ms,
                "font generation complete"
            );
            Ok(GenerationOutput {
                job_id: job_id.clone(),
                font_path,
                glyphs: yielded.glyphs,
                stats,
            })
        }
        Err(err) => {
            store.archive_log(job_id, workspace.path()).await;
            warn!(job = %job_id, error = %err, "font generation failed");
            Err(err)
        }
    };

    // ── Step 8: Workspace removal ────────────────────────────────────────
    // `TempDir` deletes on drop even on the error path; `close` just
    // surfaces deletion problems into the logs instead of swallowing them.
    if let Err(e) = workspace.close() {
        warn!(job = %job_id, error = %e, "workspace cleanup failed");
    }

    output
}

/// What the deadline-bounded section hands back on success.
struct PipelineYield {
    font_path: PathBuf,
    glyphs: Vec<GlyphResult>,
    extract_duration_ms: u64,
    trace_duration_ms: u64,
    compile_duration_ms: u64,
}

/// Extract → fan-out(normalize→trace) → gate → compile.
async fn run_pipeline(
    archive: &Path,
    workspace: &Path,
    config: &ServiceConfig,
    tools: &ToolConfig,
    deadline: Instant,
) -> Result<PipelineYield, FontGenError> {
    // ── Extract ──────────────────────────────────────────────────────────
    let extract_start = Instant::now();
    let sources = extract::extract_archive(archive, workspace).await?;
    let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
    info!(glyphs = sources.len(), "archive extracted");

    // ── Normalize + trace, fanned out across glyphs ──────────────────────
    // Width never exceeds the hardware thread count or the glyph count:
    // each trace is its own subprocess, so oversubscribing buys nothing.
    let width = config
        .effective_trace_concurrency()
        .min(sources.len())
        .max(1);
    let trace_start = Instant::now();
    // Each branch owns its source so the joined future stays `Send` and can
    // cross a `tokio::spawn` boundary in the orchestrator.
    let mut glyphs: Vec<GlyphResult> = stream::iter(sources.into_iter().map(|source| {
        async move { process_glyph(&source, config, tools, deadline).await }
    }))
    .buffer_unordered(width)
    .collect()
    .await;
    glyphs.sort_by_key(|g| g.code_point);
    let trace_duration_ms = trace_start.elapsed().as_millis() as u64;

    // ── Gate: at least one vector must survive ───────────────────────────
    let traced = glyphs.iter().filter(|g| g.svg_path.is_some()).count();
    if traced == 0 {
        let first_error = glyphs
            .iter()
            .find_map(|g| g.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "archive contained no glyph_<codepoint>.png entries".to_string());
        return Err(FontGenError::NoValidGlyphs {
            total: glyphs.len(),
            first_error,
        });
    }

    // ── Compile ──────────────────────────────────────────────────────────
    let compile_start = Instant::now();
    let outcome = compile::compile_font(tools, workspace, deadline).await?;
    let compile_duration_ms = compile_start.elapsed().as_millis() as u64;

    Ok(PipelineYield {
        font_path: outcome.font_path,
        glyphs,
        extract_duration_ms,
        trace_duration_ms,
        compile_duration_ms,
    })
}

/// Normalize then trace one glyph. Never propagates — a failed glyph is a
/// recorded result, and the job continues.
async fn process_glyph(
    source: &extract::GlyphSource,
    config: &ServiceConfig,
    tools: &ToolConfig,
    deadline: Instant,
) -> GlyphResult {
    let start = Instant::now();
    let code_point = source.code_point;

    let bmp_path =
        match normalize::normalize_glyph(source, config.image_min_size, config.image_max_size)
            .await
        {
            Ok(path) => path,
            Err(error) => {
                warn!(code_point, %error, "glyph normalization failed");
                return GlyphResult {
                    code_point,
                    svg_path: None,
                    duration_ms: start.elapsed().as_millis() as u64,
                    error: Some(error),
                };
            }
        };

    match trace::trace_glyph(&tools.tracer, code_point, &bmp_path, deadline).await {
        Ok(outcome) => GlyphResult {
            code_point,
            svg_path: Some(outcome.svg_path),
            duration_ms: start.elapsed().as_millis() as u64,
            error: None,
        },
        Err(error) => {
            warn!(code_point, %error, "glyph trace failed");
            GlyphResult {
                code_point,
                svg_path: None,
                duration_ms: start.elapsed().as_millis() as u64,
                error: Some(error),
            }
        }
    }
}

/// Allocate a workspace directory under the configured temp root.
fn create_workspace(config: &ServiceConfig) -> Result<TempDir, FontGenError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(WORKSPACE_PREFIX);
    let workspace = match &config.temp_dir {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(|e| FontGenError::StorageUnavailable {
                path: root.clone(),
                source: e,
            })?;
            builder.tempdir_in(root)
        }
        None => builder.tempdir(),
    };
    workspace.map_err(|e| FontGenError::Internal(format!("failed to create workspace: {e}")))
}

/// Stage-level timeouts carry a placeholder duration; stamp in the
/// configured one so the client-facing message is accurate.
fn normalize_timeout(err: FontGenError, timeout_secs: u64) -> FontGenError {
    match err {
        FontGenError::Timeout { stage, .. } => FontGenError::Timeout {
            secs: timeout_secs,
            stage,
        },
        other => other,
    }
}
