//! Tracer invocation: one subprocess per glyph, bitmap in, SVG out.
//!
//! ## Why `kill_on_drop`?
//!
//! Every wait here is bounded by the job deadline via `timeout_at`. When
//! the deadline fires, tokio drops the in-flight future — and with
//! `kill_on_drop(true)` the child dies with it instead of lingering as an
//! orphan chewing CPU on a glyph nobody wants anymore.
//!
//! Stdout and stderr are captured together so a failing trace leaves one
//! coherent transcript in the glyph error, mirroring how the compiler stage
//! logs. The tracer's own diagnostics go to stderr; potrace is silent on
//! success.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::GlyphError;

/// Outcome of one tracer run.
#[derive(Debug)]
pub struct TraceOutcome {
    /// The produced vector file, retained for the compiler stage.
    pub svg_path: PathBuf,
    pub exit_code: i32,
}

/// Run the tracer on one normalized bitmap, producing `<stem>.svg`.
///
/// Success requires exit code zero AND a non-empty output file; the bitmap
/// is then deleted. On failure the bitmap and any partial SVG are left in
/// place for post-mortem inspection, and the error carries the merged
/// process output.
pub async fn trace_glyph(
    tracer: &Path,
    code_point: u32,
    bmp_path: &Path,
    deadline: Instant,
) -> Result<TraceOutcome, GlyphError> {
    let svg_path = bmp_path.with_extension("svg");

    let mut child = Command::new(tracer)
        .arg("-s") // SVG backend
        .arg(bmp_path)
        .arg("-o")
        .arg(&svg_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| GlyphError::TraceFailed {
            code_point,
            exit_code: None,
            detail: format!("failed to spawn tracer: {e}"),
        })?;

    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(GlyphError::TraceFailed {
            code_point,
            exit_code: None,
            detail: "tracer pipes unavailable".to_string(),
        });
    };
    let wait = async {
        let mut out = String::new();
        let mut err = String::new();
        // Both pipes drain concurrently with the wait: a tracer writing
        // more than a pipe buffer to either stream must not stall the
        // other read.
        let (status, _, _) = tokio::join!(
            child.wait(),
            stdout.read_to_string(&mut out),
            stderr.read_to_string(&mut err),
        );
        out.push_str(&err);
        (status, out)
    };

    let (status, transcript) = match tokio::time::timeout_at(deadline, wait).await {
        Ok(result) => result,
        Err(_) => {
            // Deadline hit; the drop of `child` kills the process.
            return Err(GlyphError::Timeout { code_point });
        }
    };

    let status = status.map_err(|e| GlyphError::TraceFailed {
        code_point,
        exit_code: None,
        detail: format!("failed to wait for tracer: {e}"),
    })?;
    let exit_code = status.code().unwrap_or(-1);

    let produced = svg_path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    if !status.success() || !produced {
        warn!(code_point, exit_code, "tracer failed");
        return Err(GlyphError::TraceFailed {
            code_point,
            exit_code: status.code(),
            detail: if transcript.trim().is_empty() {
                "no output file produced".to_string()
            } else {
                transcript.trim().to_string()
            },
        });
    }

    // The bitmap was only ever tracer input.
    if let Err(e) = std::fs::remove_file(bmp_path) {
        debug!(code_point, error = %e, "failed to delete bitmap after trace");
    }

    debug!(code_point, exit_code, svg = %svg_path.display(), "glyph traced");
    Ok(TraceOutcome {
        svg_path,
        exit_code,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    fn stub_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn successful_trace_deletes_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        // Args arrive as: -s <bmp> -o <svg>
        let tracer = stub_tool(
            dir.path(),
            "potrace",
            "#!/bin/sh\nprintf '<svg/>' > \"$4\"\n",
        );
        let bmp = dir.path().join("glyph_65.bmp");
        std::fs::write(&bmp, b"BM").unwrap();

        let outcome = trace_glyph(&tracer, 65, &bmp, far_deadline())
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.svg_path.is_file());
        assert!(!bmp.exists());
    }

    #[tokio::test]
    async fn nonzero_exit_keeps_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = stub_tool(
            dir.path(),
            "potrace",
            "#!/bin/sh\necho 'bad bitmap' >&2\nexit 3\n",
        );
        let bmp = dir.path().join("glyph_66.bmp");
        std::fs::write(&bmp, b"BM").unwrap();

        let err = trace_glyph(&tracer, 66, &bmp, far_deadline())
            .await
            .unwrap_err();
        match err {
            GlyphError::TraceFailed {
                code_point,
                exit_code,
                detail,
            } => {
                assert_eq!(code_point, 66);
                assert_eq!(exit_code, Some(3));
                assert!(detail.contains("bad bitmap"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Bitmap retained for inspection.
        assert!(bmp.exists());
    }

    #[tokio::test]
    async fn empty_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = stub_tool(dir.path(), "potrace", "#!/bin/sh\n: > \"$4\"\n");
        let bmp = dir.path().join("glyph_67.bmp");
        std::fs::write(&bmp, b"BM").unwrap();

        let err = trace_glyph(&tracer, 67, &bmp, far_deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, GlyphError::TraceFailed { .. }));
    }

    #[tokio::test]
    async fn large_stderr_does_not_stall_the_trace() {
        let dir = tempfile::tempdir().unwrap();
        // Emit well past a pipe buffer (64 KiB) on stderr before failing.
        let tracer = stub_tool(
            dir.path(),
            "potrace",
            "#!/bin/sh\nhead -c 262144 /dev/zero | tr '\\000' 'e' >&2\nexit 3\n",
        );
        let bmp = dir.path().join("glyph_69.bmp");
        std::fs::write(&bmp, b"BM").unwrap();

        let started = std::time::Instant::now();
        let err = trace_glyph(&tracer, 69, &bmp, far_deadline())
            .await
            .unwrap_err();

        match err {
            GlyphError::TraceFailed {
                exit_code, detail, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(detail.len() > 100_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        // A stalled pipe would have run into the 30 s deadline instead.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn deadline_terminates_hung_tracer() {
        let dir = tempfile::tempdir().unwrap();
        let tracer = stub_tool(dir.path(), "potrace", "#!/bin/sh\nsleep 30\n");
        let bmp = dir.path().join("glyph_68.bmp");
        std::fs::write(&bmp, b"BM").unwrap();

        let started = std::time::Instant::now();
        let err = trace_glyph(
            &tracer,
            68,
            &bmp,
            Instant::now() + Duration::from_millis(200),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, GlyphError::Timeout { code_point: 68 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
