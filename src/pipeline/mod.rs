//! Pipeline stages for glyph-to-font generation.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets tests
//! substitute the external tools with deterministic stubs without touching
//! filesystem code.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ normalize ──▶ trace ──▶ compile
//! (zip)       (trim+bmp)    (potrace) (fontforge)
//! ```
//!
//! 1. [`extract`]   — expand the ZIP into the workspace with traversal
//!    defense; collect the `glyph_<n>.png` entries
//! 2. [`normalize`] — trim the all-white border and re-encode to 24-bit BMP;
//!    runs in `spawn_blocking` because pixel work is CPU-bound
//! 3. [`trace`]     — per-glyph tracer subprocess producing an SVG outline
//! 4. [`compile`]   — single FontForge run assembling all SVGs into a TTF
//!
//! Stages 2 and 3 fan out across glyphs and rejoin before stage 4; glyph
//! failures there are recorded, not propagated.

pub mod compile;
pub mod extract;
pub mod normalize;
pub mod trace;
