//! # glyph2font
//!
//! Compile hand-drawn glyph images into a TrueType font.
//!
//! ## Why this crate?
//!
//! Turning a folder of letter drawings into an installable font by hand
//! means driving potrace once per glyph, wiring the outlines into FontForge,
//! and cleaning up after every run. This crate packages that pipeline as a
//! library: hand it a ZIP of `glyph_<codepoint>.png` images and it returns a
//! TTF, surviving bad individual drawings, hung subprocesses, and hostile
//! archives along the way.
//!
//! ## Pipeline Overview
//!
//! ```text
//! glyphs.zip
//!  │
//!  ├─ 1. Extract    expand into a scratch workspace (traversal-safe)
//!  ├─ 2. Normalize  trim the white border, flatten alpha, re-encode as BMP
//!  ├─ 3. Trace      potrace per glyph → SVG outline (concurrent)
//!  ├─ 4. Compile    one FontForge run assembles every SVG into a TTF
//!  └─ 5. Archive    font + vectors copied to durable storage, workspace deleted
//! ```
//!
//! Stages 2–3 fan out across glyphs; a bad drawing costs only its own glyph.
//! The whole job shares one deadline, and hitting it kills any subprocess
//! still running.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use glyph2font::{generate, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // potrace and fontforge auto-detected from platform paths
//!     let config = ServiceConfig::default();
//!     let output = generate("glyphs.zip", &config).await?;
//!     println!("font: {}", output.font_path.display());
//!     eprintln!("glyphs: {} traced / {} failed",
//!         output.stats.traced_glyphs,
//!         output.stats.failed_glyphs);
//!     Ok(())
//! }
//! ```
//!
//! For a long-lived service, use [`JobOrchestrator`] instead: it bounds
//! concurrent jobs, tracks state per [`JobId`], and lets callers poll or
//! await results.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `glyph2font` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! glyph2font = { version = "0.3", default-features = false }
//! ```
//!
//! ## External Tools
//!
//! | Tool | Role | Resolved from |
//! |------|------|---------------|
//! | `potrace`   | bitmap → SVG tracer   | config override or platform probe list |
//! | `fontforge` | SVG set → TTF compiler | config override or platform probe list |
//!
//! Both are resolved once at startup; a missing tool is a fatal
//! `config-error`, never a degraded mode.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod config;
pub mod error;
pub mod generate;
pub mod job;
pub mod orchestrator;
pub mod pipeline;
pub mod service;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::ArtifactStore;
pub use config::{ServiceConfig, ServiceConfigBuilder, ToolOverride};
pub use error::{FontGenError, GlyphError};
pub use generate::{generate, generate_sync, GenerationOutput, GenerationStats, GlyphResult};
pub use job::{FailureKind, Job, JobFailure, JobId, JobStatus};
pub use orchestrator::JobOrchestrator;
pub use service::{validate_upload, UploadRejection};
pub use tools::{ToolConfig, ToolKind};
