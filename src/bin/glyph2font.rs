//! CLI binary for glyph2font.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig`, runs one generation, and reports the result.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use glyph2font::{generate, FailureKind, FontGenError, GenerationOutput, ServiceConfig};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compile an archive of glyph drawings into a font
  glyph2font glyphs.zip

  # Choose where the font lands
  glyph2font glyphs.zip -o my_font.ttf

  # Explicit tool locations (otherwise platform paths are probed)
  glyph2font --tracer /opt/potrace/bin/potrace --compiler /usr/bin/fontforge glyphs.zip

  # Tighter deadline and smaller accepted canvases
  glyph2font --timeout 60 --min-size 20 glyphs.zip

  # Machine-readable result
  glyph2font --json glyphs.zip > result.json

ARCHIVE FORMAT:
  A ZIP whose entries are named glyph_<codepoint>.png, where <codepoint>
  is the decimal Unicode code point the drawing represents:

    glyph_65.png   →  A
    glyph_97.png   →  a
    glyph_228.png  →  ä

  Drawings should be dark strokes on a white or transparent background.
  Entries with other names are ignored.

EXTERNAL TOOLS:
  potrace     traces each bitmap into an SVG outline
  fontforge   compiles the outlines into the TTF

  Both must be installed; the exit message names every probed location
  when one is missing.
"#;

/// Compile hand-drawn glyph images into a TrueType font.
#[derive(Parser, Debug)]
#[command(
    name = "glyph2font",
    version,
    about = "Compile a ZIP of glyph_<codepoint>.png drawings into a TTF",
    long_about = "Compile hand-drawn glyph images into a TrueType font. Each archive entry \
named glyph_<codepoint>.png is trimmed, traced with potrace, and assembled into a single \
font with FontForge. Bad individual drawings are reported but do not fail the run.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// ZIP archive of glyph_<codepoint>.png images.
    input: PathBuf,

    /// Copy the finished font to this path (in addition to the store).
    #[arg(short, long, env = "GLYPH2FONT_OUTPUT")]
    output: Option<PathBuf>,

    /// Path to the potrace executable. Default: probe platform paths.
    #[arg(long, env = "GLYPH2FONT_TRACER")]
    tracer: Option<PathBuf>,

    /// Path to the fontforge executable. Default: probe platform paths.
    #[arg(long, env = "GLYPH2FONT_COMPILER")]
    compiler: Option<PathBuf>,

    /// FontForge driver script handed to the compiler.
    #[arg(long, env = "GLYPH2FONT_SCRIPT")]
    script: Option<PathBuf>,

    /// Artifact store root for fonts, vectors, and logs.
    #[arg(long, env = "GLYPH2FONT_STORAGE", default_value = "font-storage")]
    storage_dir: PathBuf,

    /// Root for scratch workspaces. Default: the OS temp directory.
    #[arg(long, env = "GLYPH2FONT_TEMP")]
    temp_dir: Option<PathBuf>,

    /// Job deadline in seconds.
    #[arg(long, env = "GLYPH2FONT_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Admission bound when embedding this config in a service.
    #[arg(long, env = "GLYPH2FONT_MAX_JOBS", default_value_t = 3)]
    max_concurrent_jobs: usize,

    /// Minimum accepted glyph dimension in pixels.
    #[arg(long, env = "GLYPH2FONT_MIN_SIZE", default_value_t = 50)]
    min_size: u32,

    /// Maximum accepted glyph dimension in pixels.
    #[arg(long, env = "GLYPH2FONT_MAX_SIZE", default_value_t = 2000)]
    max_size: u32,

    /// Concurrent tracer subprocesses. Default: hardware threads.
    #[arg(short = 'j', long, env = "GLYPH2FONT_CONCURRENCY")]
    trace_concurrency: Option<usize>,

    /// Output structured JSON (GenerationOutput) instead of text.
    #[arg(long, env = "GLYPH2FONT_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "GLYPH2FONT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "GLYPH2FONT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            // Map the failure taxonomy onto distinct exit codes so scripts
            // can tell a bad archive from a missing tool.
            let code = err
                .downcast_ref::<FontGenError>()
                .map(|e| match e.kind() {
                    FailureKind::ConfigError => 2,
                    FailureKind::MalformedInput => 3,
                    FailureKind::NoValidGlyphs => 4,
                    FailureKind::CompileError => 5,
                    FailureKind::Timeout => 6,
                    FailureKind::InternalError => 1,
                })
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut builder = ServiceConfig::builder()
        .storage_dir(&cli.storage_dir)
        .timeout_secs(cli.timeout)
        .max_concurrent_jobs(cli.max_concurrent_jobs)
        .image_min_size(cli.min_size)
        .image_max_size(cli.max_size);
    if let Some(path) = &cli.tracer {
        builder = builder.tracer_path(path);
    }
    if let Some(path) = &cli.compiler {
        builder = builder.compiler_path(path);
    }
    if let Some(path) = &cli.script {
        builder = builder.compiler_script(path);
    }
    if let Some(dir) = &cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(n) = cli.trace_concurrency {
        builder = builder.trace_concurrency(n);
    }
    let config = builder.build()?;

    if !cli.input.is_file() {
        anyhow::bail!("input archive '{}' not found", cli.input.display());
    }

    let output = generate(&cli.input, &config).await?;

    if let Some(dest) = &cli.output {
        std::fs::copy(&output.font_path, dest)
            .with_context(|| format!("copying font to '{}'", dest.display()))?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !cli.quiet {
        report(&output, cli.output.as_deref());
    }
    Ok(())
}

fn report(output: &GenerationOutput, copied_to: Option<&std::path::Path>) {
    println!(
        "font: {}",
        copied_to.unwrap_or(output.font_path.as_path()).display()
    );
    println!(
        "glyphs: {} traced, {} failed ({} total)",
        output.stats.traced_glyphs, output.stats.failed_glyphs, output.stats.total_glyphs
    );
    for glyph in &output.glyphs {
        if let Some(error) = &glyph.error {
            println!("  ✗ {error}");
        }
    }
    println!(
        "timing: extract {}ms, trace {}ms, compile {}ms, total {}ms",
        output.stats.extract_duration_ms,
        output.stats.trace_duration_ms,
        output.stats.compile_duration_ms,
        output.stats.total_duration_ms
    );
}
