//! Error types for the glyph2font library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FontGenError`] — **Fatal**: the job cannot produce a font at all
//!   (unreadable archive, traversal entry, compiler failure, deadline
//!   exceeded) or the process cannot start (missing external tool).
//!   Returned as `Err(FontGenError)` from the top-level `generate*`
//!   functions and recorded on failed [`crate::job::Job`]s.
//!
//! * [`GlyphError`] — **Non-fatal**: a single glyph failed (bad PNG,
//!   out-of-bounds dimensions, tracer crash) but the remaining glyphs are
//!   fine. Stored inside [`crate::generate::GlyphResult`] so callers can
//!   inspect partial success rather than losing the whole font to one bad
//!   drawing.
//!
//! The separation lets callers decide their own tolerance: a job only fails
//! outright when *zero* glyphs survive ([`FontGenError::NoValidGlyphs`]).

use std::path::PathBuf;
use thiserror::Error;

use crate::job::FailureKind;
use crate::tools::ToolKind;

/// All fatal errors returned by the glyph2font library.
///
/// Per-glyph failures use [`GlyphError`] and are stored in
/// [`crate::generate::GlyphResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum FontGenError {
    // ── Configuration errors (fatal at startup) ───────────────────────────
    /// No candidate location yielded an executable for an external tool.
    #[error("{kind} executable not found. Probed: {}\nInstall {kind} or set the {} override.", probed.join(", "), kind.config_key())]
    ToolNotFound { kind: ToolKind, probed: Vec<String> },

    /// The shipped font-compiler script is missing.
    #[error("Font compiler script not found: '{path}'\nThe service ships it under resources/; set ServiceConfig::compiler_script if relocated.")]
    ScriptNotFound { path: PathBuf },

    /// The artifact store or workspace root cannot be created or written.
    #[error("Storage directory '{path}' is unusable: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input archive could not be opened or is not a ZIP file.
    #[error("Archive '{path}' is not readable as a ZIP file: {detail}")]
    ArchiveUnreadable { path: PathBuf, detail: String },

    /// An archive entry would resolve outside the workspace root.
    #[error("Archive entry '{name}' escapes the extraction directory")]
    TraversalEntry { name: String },

    /// Two archive entries map to the same Unicode code point.
    #[error("Archive contains more than one glyph for code point {code_point}")]
    DuplicateCodePoint { code_point: u32 },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Every glyph failed to normalize or trace; nothing to compile.
    #[error("No glyph produced a usable vector ({total} attempted).\nFirst error: {first_error}")]
    NoValidGlyphs { total: usize, first_error: String },

    /// The font compiler exited non-zero or produced no output file.
    #[error("Font compiler failed (exit: {exit_code:?}); log preserved in the artifact store")]
    CompileError {
        exit_code: Option<i32>,
        log: Option<PathBuf>,
    },

    /// The job deadline elapsed; any running subprocess was terminated.
    #[error("Job exceeded its {secs}s deadline during {stage}")]
    Timeout { secs: u64, stage: &'static str },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected I/O or runtime fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FontGenError {
    /// Map the error to its wire-level failure kind.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ToolNotFound { .. }
            | Self::ScriptNotFound { .. }
            | Self::StorageUnavailable { .. }
            | Self::InvalidConfig(_) => FailureKind::ConfigError,
            Self::ArchiveUnreadable { .. }
            | Self::TraversalEntry { .. }
            | Self::DuplicateCodePoint { .. } => FailureKind::MalformedInput,
            Self::NoValidGlyphs { .. } => FailureKind::NoValidGlyphs,
            Self::CompileError { .. } => FailureKind::CompileError,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Internal(_) => FailureKind::InternalError,
        }
    }
}

/// A non-fatal error for a single glyph.
///
/// Stored alongside [`crate::generate::GlyphResult`] when a glyph fails.
/// The overall job continues unless ALL glyphs fail.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum GlyphError {
    /// The PNG could not be decoded.
    #[error("Glyph U+{code_point:04X}: image decode failed: {detail}")]
    DecodeFailed { code_point: u32, detail: String },

    /// Decoded dimensions fall outside the configured bounds.
    #[error("Glyph U+{code_point:04X}: {width}x{height} px outside accepted range {min}–{max}")]
    BadDimensions {
        code_point: u32,
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },

    /// The tracer exited non-zero, produced no output, or could not spawn.
    #[error("Glyph U+{code_point:04X}: tracer failed (exit: {exit_code:?}): {detail}")]
    TraceFailed {
        code_point: u32,
        exit_code: Option<i32>,
        detail: String,
    },

    /// The job deadline elapsed while this glyph was in flight.
    #[error("Glyph U+{code_point:04X}: abandoned at the job deadline")]
    Timeout { code_point: u32 },
}

impl GlyphError {
    /// The code point this error belongs to.
    pub fn code_point(&self) -> u32 {
        match self {
            Self::DecodeFailed { code_point, .. }
            | Self::BadDimensions { code_point, .. }
            | Self::TraceFailed { code_point, .. }
            | Self::Timeout { code_point } => *code_point,
        }
    }
}
