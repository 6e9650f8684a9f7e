//! External tool resolution: locate the vector tracer and font compiler.
//!
//! ## Why probe instead of relying on `PATH`?
//!
//! The two binaries this service orchestrates (potrace and fontforge) are
//! installed in wildly different places across platforms — Homebrew prefixes
//! on macOS, `Program Files` bundles on Windows, distro paths on Linux — and
//! service managers often start the process with a minimal `PATH`. Walking
//! an explicit, ordered candidate list makes startup deterministic and lets
//! the failure message name every location that was tried.
//!
//! Resolution happens once at startup and the result is immutable for the
//! life of the process. A missing tool is fatal: there is no degraded mode
//! in which the pipeline can run without either binary.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ServiceConfig, ToolOverride};
use crate::error::FontGenError;

/// Which external binary is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    /// Bitmap-to-SVG tracer (potrace).
    Tracer,
    /// SVG-to-TTF compiler (fontforge).
    Compiler,
}

impl ToolKind {
    /// The conventional binary name, used in messages.
    pub fn binary_name(self) -> &'static str {
        match self {
            ToolKind::Tracer => "potrace",
            ToolKind::Compiler => "fontforge",
        }
    }

    /// The configuration key that overrides this tool's path.
    pub fn config_key(self) -> &'static str {
        match self {
            ToolKind::Tracer => "tracer.path",
            ToolKind::Compiler => "compiler.path",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Resolved absolute paths for both external binaries plus the compiler
/// driver script. Built once at startup, immutable thereafter.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub tracer: PathBuf,
    pub compiler: PathBuf,
    pub script: PathBuf,
}

impl ToolConfig {
    /// Resolve both tools and validate the compiler script.
    ///
    /// Any failure here is a `config-error`: the caller is expected to abort
    /// startup rather than accept jobs it can never complete.
    pub fn resolve(config: &ServiceConfig) -> Result<Self, FontGenError> {
        let tracer = resolve_tool(ToolKind::Tracer, &config.tracer_path)?;
        let compiler = resolve_tool(ToolKind::Compiler, &config.compiler_path)?;

        let script = config.compiler_script.clone();
        if !script.is_file() {
            return Err(FontGenError::ScriptNotFound { path: script });
        }

        info!(tracer = %tracer.display(), compiler = %compiler.display(), "external tools resolved");
        Ok(ToolConfig {
            tracer,
            compiler,
            script,
        })
    }
}

/// Resolve one tool: a valid override wins; an invalid override logs a
/// warning and falls through to the platform candidate list.
pub fn resolve_tool(kind: ToolKind, override_: &ToolOverride) -> Result<PathBuf, FontGenError> {
    if let ToolOverride::Path(path) = override_ {
        if is_valid_executable(path) {
            info!(tool = %kind, path = %path.display(), "using configured path");
            return Ok(path.clone());
        }
        warn!(tool = %kind, path = %path.display(), "configured path is not executable, falling back to probing");
    }

    let candidates = candidate_paths(kind);
    for candidate in &candidates {
        let path = Path::new(candidate);
        if is_valid_executable(path) {
            info!(tool = %kind, path = %candidate, "auto-detected");
            return Ok(path.to_path_buf());
        }
    }

    Err(FontGenError::ToolNotFound {
        kind,
        probed: candidates,
    })
}

/// Ordered candidate locations for a tool on the current platform.
pub fn candidate_paths(kind: ToolKind) -> Vec<String> {
    match (kind, std::env::consts::OS) {
        (ToolKind::Compiler, "windows") => vec![
            r"C:\Program Files (x86)\FontForgeBuilds\fontforge.bat".into(),
            r"C:\Program Files\FontForgeBuilds\fontforge.bat".into(),
            r"C:\fontforge\fontforge.bat".into(),
            "fontforge.bat".into(),
            "fontforge".into(),
        ],
        (ToolKind::Compiler, "macos") => vec![
            "/usr/local/bin/fontforge".into(),
            "/opt/homebrew/bin/fontforge".into(),
            "/Applications/FontForge.app/Contents/MacOS/FontForge".into(),
            "fontforge".into(),
        ],
        (ToolKind::Compiler, _) => vec![
            "/usr/bin/fontforge".into(),
            "/usr/local/bin/fontforge".into(),
            "/opt/fontforge/bin/fontforge".into(),
            "fontforge".into(),
        ],
        (ToolKind::Tracer, "windows") => vec![
            r"C:\tools\potrace-1.16.win64\potrace.exe".into(),
            r"C:\Program Files\potrace\potrace.exe".into(),
            r"C:\Program Files (x86)\potrace\potrace.exe".into(),
            "potrace.exe".into(),
            "potrace".into(),
        ],
        (ToolKind::Tracer, "macos") => vec![
            "/usr/local/bin/potrace".into(),
            "/opt/homebrew/bin/potrace".into(),
            "potrace".into(),
        ],
        (ToolKind::Tracer, _) => vec![
            "/usr/bin/potrace".into(),
            "/usr/local/bin/potrace".into(),
            "potrace".into(),
        ],
    }
}

/// True if `path` exists and may be invoked.
///
/// On Windows, `.bat` wrappers report no execute permission yet run fine
/// through the shell, so the extension alone qualifies.
pub fn is_valid_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bat"))
    {
        return true;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match path.metadata() {
            Ok(meta) => meta.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        true
    }
}
