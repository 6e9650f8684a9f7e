//! Configuration types for the font-generation service.
//!
//! All pipeline behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config across worker tasks, log it at startup, and
//! diff two deployments to understand why their behaviour differs.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor is unreadable and breaks on every new field. The
//! builder lets callers set only what they care about and rely on documented
//! defaults for the rest.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FontGenError;

/// Default location of the shipped FontForge driver script.
pub const DEFAULT_COMPILER_SCRIPT: &str = "resources/generate_font.py";

/// How an external tool path is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolOverride {
    /// Probe the platform candidate list (default).
    #[default]
    Auto,
    /// Use exactly this executable.
    Path(PathBuf),
}

impl ToolOverride {
    /// Parse the configuration value: the literal `auto` (any case) probes,
    /// anything else is treated as a path.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("auto") {
            ToolOverride::Auto
        } else {
            ToolOverride::Path(PathBuf::from(value))
        }
    }
}

/// Configuration for the glyph-to-font pipeline.
///
/// Built via [`ServiceConfig::builder()`] or using
/// [`ServiceConfig::default()`].
///
/// # Example
/// ```rust
/// use glyph2font::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .storage_dir("/var/lib/glyph2font")
///     .max_concurrent_jobs(4)
///     .timeout_secs(120)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Vector tracer (potrace) location. Default: probe platform paths.
    pub tracer_path: ToolOverride,

    /// Font compiler (fontforge) location. Default: probe platform paths.
    pub compiler_path: ToolOverride,

    /// The FontForge driver script handed to the compiler. The service never
    /// interprets this file; it only checks that it exists at startup.
    pub compiler_script: PathBuf,

    /// Artifact store root: per-job copies of inputs, vectors, and the
    /// produced font (or the compiler log on failure) land here.
    /// Default: `./font-storage`.
    pub storage_dir: PathBuf,

    /// Root for per-job scratch workspaces. Default: the OS temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Purge leftover `font_work_*` workspaces at startup. Default: true.
    ///
    /// A crash mid-job strands its workspace; without the purge these
    /// accumulate until the disk fills. Only directories carrying the
    /// workspace prefix are touched.
    pub cleanup_on_startup: bool,

    /// Maximum jobs executing at once. Default: 3.
    ///
    /// Each job drives up to a machine's worth of tracer subprocesses plus
    /// one FontForge run; three concurrent jobs saturates a typical host
    /// without starving the tracers of cores.
    pub max_concurrent_jobs: usize,

    /// Per-job deadline in seconds, measured from admission. Default: 300.
    ///
    /// The deadline covers queue wait, extraction, every tracer run, and the
    /// compiler. When it elapses, running subprocesses are killed and the
    /// job fails with the `timeout` kind.
    pub timeout_secs: u64,

    /// Minimum accepted glyph dimension (either axis) in pixels. Default: 50.
    ///
    /// Tiny canvases trace into degenerate outlines; rejecting them per
    /// glyph gives the client a precise error instead of a garbage font.
    pub image_min_size: u32,

    /// Maximum accepted glyph dimension in pixels. Default: 2000.
    pub image_max_size: u32,

    /// Width of the per-job normalize+trace fan-out. Default: the number of
    /// hardware threads. Never exceeds the glyph count.
    pub trace_concurrency: Option<usize>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tracer_path: ToolOverride::Auto,
            compiler_path: ToolOverride::Auto,
            compiler_script: PathBuf::from(DEFAULT_COMPILER_SCRIPT),
            storage_dir: PathBuf::from("font-storage"),
            temp_dir: None,
            cleanup_on_startup: true,
            max_concurrent_jobs: 3,
            timeout_secs: 300,
            image_min_size: 50,
            image_max_size: 2000,
            trace_concurrency: None,
        }
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective fan-out width for the normalize+trace stage.
    pub fn effective_trace_concurrency(&self) -> usize {
        self.trace_concurrency.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn tracer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tracer_path = ToolOverride::Path(path.into());
        self
    }

    pub fn compiler_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.compiler_path = ToolOverride::Path(path.into());
        self
    }

    pub fn compiler_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.compiler_script = path.into();
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn cleanup_on_startup(mut self, v: bool) -> Self {
        self.config.cleanup_on_startup = v;
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn image_min_size(mut self, px: u32) -> Self {
        self.config.image_min_size = px.max(1);
        self
    }

    pub fn image_max_size(mut self, px: u32) -> Self {
        self.config.image_max_size = px;
        self
    }

    pub fn trace_concurrency(mut self, n: usize) -> Self {
        self.config.trace_concurrency = Some(n.max(1));
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, FontGenError> {
        let c = &self.config;
        if c.max_concurrent_jobs == 0 {
            return Err(FontGenError::InvalidConfig(
                "max_concurrent_jobs must be ≥ 1".into(),
            ));
        }
        if c.image_min_size == 0 {
            return Err(FontGenError::InvalidConfig(
                "image_min_size must be ≥ 1".into(),
            ));
        }
        if c.image_min_size > c.image_max_size {
            return Err(FontGenError::InvalidConfig(format!(
                "image_min_size ({}) exceeds image_max_size ({})",
                c.image_min_size, c.image_max_size
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let c = ServiceConfig::default();
        assert_eq!(c.max_concurrent_jobs, 3);
        assert_eq!(c.timeout_secs, 300);
        assert_eq!(c.image_min_size, 50);
        assert_eq!(c.image_max_size, 2000);
        assert!(c.cleanup_on_startup);
        assert_eq!(c.tracer_path, ToolOverride::Auto);
    }

    #[test]
    fn builder_clamps_and_validates() {
        // Clamped to 1, not an error.
        let c = ServiceConfig::builder().max_concurrent_jobs(0).build().unwrap();
        assert_eq!(c.max_concurrent_jobs, 1);

        // Inverted bounds are a build error.
        let mut bad = ServiceConfig::default();
        bad.image_min_size = 500;
        bad.image_max_size = 100;
        let err = ServiceConfigBuilder { config: bad }.build().unwrap_err();
        assert!(err.to_string().contains("image_min_size"));
    }

    #[test]
    fn tool_override_parse() {
        assert_eq!(ToolOverride::parse("auto"), ToolOverride::Auto);
        assert_eq!(ToolOverride::parse(" AUTO "), ToolOverride::Auto);
        assert_eq!(
            ToolOverride::parse("/usr/bin/potrace"),
            ToolOverride::Path(PathBuf::from("/usr/bin/potrace"))
        );
    }

    #[test]
    fn effective_concurrency_honours_override() {
        let c = ServiceConfig::builder().trace_concurrency(2).build().unwrap();
        assert_eq!(c.effective_trace_concurrency(), 2);
        let d = ServiceConfig::default();
        assert!(d.effective_trace_concurrency() >= 1);
    }
}
