//! Archive extraction: safely expand the uploaded ZIP into a workspace.
//!
//! ## Why `enclosed_name`?
//!
//! ZIP entry names are attacker-controlled. An entry called `../evil.png`
//! would, naively joined, write outside the workspace. `enclosed_name()`
//! rejects any name containing parent-directory components or an absolute
//! prefix, so every file written here is guaranteed to be a strict
//! descendant of the workspace root. Offending entries fail the whole job
//! as malformed input rather than being silently skipped — a traversal
//! attempt is a hostile archive, not a cosmetic defect.
//!
//! Extraction is synchronous (the `zip` crate reads through `std::io`), so
//! the whole pass runs under `spawn_blocking` to keep it off the async
//! worker threads.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::FontGenError;

/// `glyph_<codepoint>.png`, decimal digits only. The length cap keeps the
/// capture parseable as u32 without overflow surprises; longer digit runs
/// simply fail the parse and the entry is ignored.
static GLYPH_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^glyph_([0-9]{1,10})\.png$").expect("static regex"));

/// One recognized glyph image extracted from the archive.
#[derive(Debug, Clone)]
pub struct GlyphSource {
    /// Unicode code point parsed from the entry name.
    pub code_point: u32,
    /// Extracted PNG inside the workspace.
    pub png_path: PathBuf,
}

/// Parse an entry file name into its code point, if it is a glyph entry.
///
/// Non-matching names — including digit runs that do not fit in 32 bits —
/// return `None` and are ignored by the pipeline.
pub fn parse_glyph_name(file_name: &str) -> Option<u32> {
    let caps = GLYPH_NAME.captures(file_name)?;
    caps[1].parse::<u32>().ok()
}

/// Expand `archive` into `workspace` and collect the glyph entries.
///
/// Directory entries create directories; file entries create their parents
/// and stream bytes. Returns the recognized `glyph_<n>.png` files at the
/// archive root; matching names inside subdirectories are extracted but
/// never treated as glyphs.
///
/// # Errors
/// * [`FontGenError::ArchiveUnreadable`] — not a ZIP, or I/O failure
/// * [`FontGenError::TraversalEntry`] — entry escapes the workspace
/// * [`FontGenError::DuplicateCodePoint`] — two entries, one code point
pub async fn extract_archive(
    archive: &Path,
    workspace: &Path,
) -> Result<Vec<GlyphSource>, FontGenError> {
    let archive = archive.to_path_buf();
    let workspace = workspace.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&archive, &workspace))
        .await
        .map_err(|e| FontGenError::Internal(format!("extract task panicked: {e}")))?
}

/// Blocking implementation of archive extraction.
fn extract_blocking(archive: &Path, workspace: &Path) -> Result<Vec<GlyphSource>, FontGenError> {
    let file = File::open(archive).map_err(|e| FontGenError::ArchiveUnreadable {
        path: archive.to_path_buf(),
        detail: e.to_string(),
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FontGenError::ArchiveUnreadable {
        path: archive.to_path_buf(),
        detail: e.to_string(),
    })?;

    let mut glyphs: Vec<GlyphSource> = Vec::new();
    let mut seen: HashMap<u32, String> = HashMap::new();

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| FontGenError::ArchiveUnreadable {
                path: archive.to_path_buf(),
                detail: e.to_string(),
            })?;

        let raw_name = entry.name().to_string();
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = %raw_name, "rejecting traversal entry");
            return Err(FontGenError::TraversalEntry { name: raw_name });
        };
        let out_path = workspace.join(&relative);
        debug_assert!(out_path.starts_with(workspace));

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io_internal)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_internal)?;
        }
        let mut out = File::create(&out_path).map_err(io_internal)?;
        io::copy(&mut entry, &mut out).map_err(io_internal)?;

        // Only top-level entries can be glyphs: the compiler and the
        // artifact store both scan the workspace root, so a nested
        // `glyph_<n>.png` would be traced and then silently dropped.
        let is_top_level = relative
            .parent()
            .is_none_or(|p| p.as_os_str().is_empty());
        let file_name = relative
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if let Some(code_point) = parse_glyph_name(&file_name).filter(|_| is_top_level) {
            if let Some(previous) = seen.insert(code_point, file_name.clone()) {
                warn!(code_point, first = %previous, second = %file_name, "duplicate glyph entries");
                return Err(FontGenError::DuplicateCodePoint { code_point });
            }
            glyphs.push(GlyphSource {
                code_point,
                png_path: out_path,
            });
        } else {
            debug!(entry = %raw_name, "ignoring non-glyph entry");
        }
    }

    debug!(count = glyphs.len(), "archive extracted");
    Ok(glyphs)
}

fn io_internal(e: io::Error) -> FontGenError {
    FontGenError::Internal(format!("workspace I/O failed: {e}"))
}
