//! End-to-end pipeline tests with stubbed external tools.
//!
//! Real potrace/fontforge installs are not assumed; small shell scripts
//! stand in for both binaries, wired in through the config path overrides.
//! That keeps these tests runnable anywhere while still exercising the full
//! path: archive → extract → normalize → trace → compile → artifact store.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use image::{Rgba, RgbaImage};
use zip::write::SimpleFileOptions;

use glyph2font::{
    generate, FailureKind, FontGenError, JobOrchestrator, JobStatus, ServiceConfig,
};

// ── Fixtures ─────────────────────────────────────────────────────────────

/// A 60x60 white canvas with a black square, encoded as PNG bytes.
fn glyph_png() -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(60, 60, Rgba([255, 255, 255, 255]));
    for x in 20..40 {
        for y in 20..40 {
            img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
        }
    }
    let mut bytes = std::io::Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn build_zip(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    for (entry_name, bytes) in entries {
        writer
            .start_file(*entry_name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
    path
}

/// Tests with second-scale deadlines run one at a time; they measure wall
/// clock and a loaded parallel run can eat their whole margin.
fn timing_gate() -> std::sync::MutexGuard<'static, ()> {
    static GATE: OnceLock<Mutex<()>> = OnceLock::new();
    GATE.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

fn write_stub(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Everything a test environment needs: stub tools, storage, temp root.
struct TestEnv {
    _root: tempfile::TempDir,
    dir: PathBuf,
    storage: PathBuf,
    temp: PathBuf,
    tracer: PathBuf,
    compiler: PathBuf,
    script: PathBuf,
}

impl TestEnv {
    /// Stubs: the tracer writes a plausible SVG, the compiler concatenates
    /// nothing and emits a fake TTF. Both succeed instantly.
    fn new() -> Self {
        Self::with_compiler("#!/bin/sh\nprintf 'TTF' > \"$5\"\n")
    }

    fn with_compiler(compiler_script: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().to_path_buf();
        // Tracer args: -s <bmp> -o <svg>
        let tracer = write_stub(&dir, "potrace", "#!/bin/sh\nprintf '<svg/>' > \"$4\"\n");
        // Compiler args: -lang=py -script <script> <workspace> <out.ttf>
        let compiler = write_stub(&dir, "fontforge", compiler_script);
        let script = dir.join("generate_font.py");
        std::fs::write(&script, "# stub driver\n").unwrap();
        let storage = dir.join("store");
        let temp = dir.join("work");
        TestEnv {
            _root: root,
            dir,
            storage,
            temp,
            tracer,
            compiler,
            script,
        }
    }

    fn config(&self) -> ServiceConfig {
        ServiceConfig::builder()
            .tracer_path(&self.tracer)
            .compiler_path(&self.compiler)
            .compiler_script(&self.script)
            .storage_dir(&self.storage)
            .temp_dir(&self.temp)
            .build()
            .unwrap()
    }

    fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.storage)
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.temp)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.file_name().to_string_lossy().starts_with("font_work_"))
                    .count()
            })
            .unwrap_or(0)
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn happy_path_produces_archived_font() {
    let env = TestEnv::new();
    let png = glyph_png();
    let archive = build_zip(
        &env.dir,
        "glyphs.zip",
        &[
            ("glyph_65.png", png.as_slice()),
            ("glyph_66.png", png.as_slice()),
            ("README.txt", b"not a glyph"),
        ],
    );

    let output = generate(&archive, &env.config()).await.unwrap();

    assert_eq!(output.stats.total_glyphs, 2);
    assert_eq!(output.stats.traced_glyphs, 2);
    assert_eq!(output.stats.failed_glyphs, 0);

    // The font lives in the store, prefixed with the job id.
    assert!(output.font_path.starts_with(&env.storage));
    assert!(output.font_path.is_file());
    let expected = format!("{}_output_font.ttf", output.job_id);
    assert_eq!(
        output.font_path.file_name().unwrap().to_string_lossy(),
        expected
    );

    // Per-glyph vectors and the staged input are archived alongside.
    let stored = env.stored_files();
    assert!(stored.iter().any(|n| n.ends_with("_glyph_65.svg")));
    assert!(stored.iter().any(|n| n.ends_with("_glyph_66.svg")));
    assert!(stored.iter().any(|n| n.ends_with("_glyphs.zip")));

    // The scratch workspace is gone.
    assert_eq!(env.leftover_workspaces(), 0);
}

#[tokio::test]
async fn traversal_entry_fails_whole_job() {
    let env = TestEnv::new();
    let archive = build_zip(&env.dir, "evil.zip", &[("../escape.png", b"x")]);

    let err = generate(&archive, &env.config()).await.unwrap_err();
    assert!(matches!(err, FontGenError::TraversalEntry { .. }));
    assert_eq!(err.kind(), FailureKind::MalformedInput);
    assert!(!env.dir.join("escape.png").exists());
}

#[tokio::test]
async fn bad_glyph_is_recorded_but_job_succeeds() {
    let env = TestEnv::new();
    let png = glyph_png();
    let archive = build_zip(
        &env.dir,
        "glyphs.zip",
        &[
            ("glyph_65.png", png.as_slice()),
            ("glyph_66.png", b""), // undecodable
            ("glyph_67.png", png.as_slice()),
        ],
    );

    let output = generate(&archive, &env.config()).await.unwrap();

    assert_eq!(output.stats.total_glyphs, 3);
    assert_eq!(output.stats.traced_glyphs, 2);
    assert_eq!(output.stats.failed_glyphs, 1);
    let errors = output.glyph_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code_point(), 66);
    assert!(output.font_path.is_file());
}

#[tokio::test]
async fn all_glyphs_failing_aborts_before_compile() {
    let env = TestEnv::new();
    let archive = build_zip(
        &env.dir,
        "glyphs.zip",
        &[("glyph_65.png", b""), ("glyph_66.png", b"")],
    );

    let err = generate(&archive, &env.config()).await.unwrap_err();
    match err {
        FontGenError::NoValidGlyphs { total, first_error } => {
            assert_eq!(total, 2);
            assert!(!first_error.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn archive_without_glyph_entries_is_no_valid_glyphs() {
    let env = TestEnv::new();
    let archive = build_zip(&env.dir, "empty.zip", &[("notes.txt", b"hello")]);

    let err = generate(&archive, &env.config()).await.unwrap_err();
    assert!(matches!(err, FontGenError::NoValidGlyphs { total: 0, .. }));
    assert_eq!(err.kind(), FailureKind::NoValidGlyphs);
}

#[tokio::test]
async fn nested_glyph_entries_do_not_count() {
    // Glyph names inside subdirectories are extracted but never traced;
    // an archive with nothing at its root has no glyphs.
    let env = TestEnv::new();
    let png = glyph_png();
    let archive = build_zip(
        &env.dir,
        "nested.zip",
        &[("sub/glyph_65.png", png.as_slice())],
    );

    let err = generate(&archive, &env.config()).await.unwrap_err();
    assert!(matches!(err, FontGenError::NoValidGlyphs { total: 0, .. }));
    // Nothing was traced, so nothing reached the store beyond the input.
    assert!(!env.stored_files().iter().any(|n| n.ends_with(".svg")));
}

#[tokio::test]
async fn compiler_failure_archives_the_log() {
    let env = TestEnv::with_compiler("#!/bin/sh\necho 'no contours found' >&2\nexit 1\n");
    let png = glyph_png();
    let archive = build_zip(&env.dir, "glyphs.zip", &[("glyph_65.png", png.as_slice())]);

    let err = generate(&archive, &env.config()).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::CompileError);

    let stored = env.stored_files();
    // The log and the traced vectors survive for diagnosis; no font does.
    assert!(stored.iter().any(|n| n.ends_with("_fontforge.log")));
    assert!(stored.iter().any(|n| n.ends_with("_glyph_65.svg")));
    assert!(!stored.iter().any(|n| n.ends_with(".ttf")));
    assert_eq!(env.leftover_workspaces(), 0);
}

#[tokio::test]
async fn deadline_kills_hung_compiler() {
    let env = TestEnv::with_compiler("#!/bin/sh\nsleep 30\n");
    let png = glyph_png();
    let archive = build_zip(&env.dir, "glyphs.zip", &[("glyph_65.png", png.as_slice())]);

    let mut config = env.config();
    config.timeout_secs = 1;

    let started = std::time::Instant::now();
    let err = generate(&archive, &config).await.unwrap_err();

    assert!(matches!(err, FontGenError::Timeout { secs: 1, .. }));
    assert!(
        started.elapsed() < std::time::Duration::from_secs(10),
        "deadline did not cut the run short"
    );
    assert_eq!(env.leftover_workspaces(), 0);
}

#[tokio::test]
async fn zero_deadline_times_out_before_any_tool_runs() {
    let _serial = timing_gate();
    // The tracer stub leaves a marker if it ever executes.
    let env = TestEnv::new();
    let marker = env.dir.join("tracer_ran");
    write_stub(
        &env.dir,
        "potrace",
        &format!("#!/bin/sh\ntouch {}\nprintf '<svg/>' > \"$4\"\n", marker.display()),
    );
    let png = glyph_png();
    let archive = build_zip(&env.dir, "glyphs.zip", &[("glyph_65.png", png.as_slice())]);

    let mut config = env.config();
    config.timeout_secs = 0;

    let err = generate(&archive, &config).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Timeout);
    assert!(!marker.exists());
}

#[tokio::test]
async fn orchestrator_runs_queued_jobs_to_completion() {
    let env = TestEnv::with_compiler("#!/bin/sh\nsleep 0.2\nprintf 'TTF' > \"$5\"\n");
    let png = glyph_png();

    let mut config = env.config();
    config.max_concurrent_jobs = 1;
    let orchestrator = JobOrchestrator::new(config).unwrap();

    let mut ids = Vec::new();
    for i in 0..3 {
        let archive = build_zip(
            &env.dir,
            &format!("glyphs_{i}.zip"),
            &[("glyph_65.png", png.as_slice())],
        );
        ids.push(orchestrator.submit(archive).await);
    }

    for id in &ids {
        let job = orchestrator.wait(id).await.expect("known job");
        assert_eq!(job.status, JobStatus::Succeeded, "job {id}: {:?}", job.failure);
        let font = job.font_path.expect("font path recorded");
        assert!(font.is_file());
        assert!(job.glyph_errors.is_empty());
    }

    // Three fonts, three job prefixes.
    let fonts = env
        .stored_files()
        .into_iter()
        .filter(|n| n.ends_with("_output_font.ttf"))
        .count();
    assert_eq!(fonts, 3);

    // Snapshots stay available until pruned.
    assert!(orchestrator.job(&ids[0]).await.is_some());
    assert_eq!(orchestrator.prune_finished().await, 3);
    assert!(orchestrator.job(&ids[0]).await.is_none());
}

#[tokio::test]
async fn admission_bound_prevents_overlapping_jobs() {
    // The compiler takes an exclusive lock directory and fails if it is
    // already held, so any two overlapping compilations fail their jobs.
    let env = TestEnv::new();
    let lock = env.dir.join("compile_lock");
    write_stub(
        &env.dir,
        "fontforge",
        &format!(
            "#!/bin/sh\nif ! mkdir {lock} 2>/dev/null; then exit 97; fi\nsleep 0.2\nprintf 'TTF' > \"$5\"\nrmdir {lock}\n",
            lock = lock.display()
        ),
    );
    let png = glyph_png();

    let mut config = env.config();
    config.max_concurrent_jobs = 1;
    let orchestrator = JobOrchestrator::new(config).unwrap();

    let mut ids = Vec::new();
    for i in 0..3 {
        let archive = build_zip(
            &env.dir,
            &format!("glyphs_{i}.zip"),
            &[("glyph_65.png", png.as_slice())],
        );
        ids.push(orchestrator.submit(archive).await);
    }

    // At no instant is more than one job running.
    let mut running = 0;
    for id in &ids {
        if orchestrator.job(id).await.unwrap().status == JobStatus::Running {
            running += 1;
        }
    }
    assert!(running <= 1, "observed {running} running jobs");

    for id in &ids {
        let job = orchestrator.wait(id).await.expect("known job");
        assert_eq!(
            job.status,
            JobStatus::Succeeded,
            "job {id} saw an overlapping compile: {:?}",
            job.failure
        );
    }
}

#[tokio::test]
async fn queue_wait_counts_against_the_deadline() {
    let _serial = timing_gate();
    // The compiler hangs only when the workspace carries a `slow` marker,
    // so the first job monopolises the single slot for its whole budget
    // while the second job's tools would finish instantly.
    let env = TestEnv::with_compiler(
        "#!/bin/sh\nif [ -f \"$4/slow\" ]; then sleep 30; fi\nprintf 'TTF' > \"$5\"\n",
    );
    let png = glyph_png();

    let mut config = env.config();
    config.max_concurrent_jobs = 1;
    config.timeout_secs = 1;
    let orchestrator = JobOrchestrator::new(config).unwrap();

    // Both archives exist before either submission so the two deadlines
    // start within microseconds of each other.
    let first_zip = build_zip(
        &env.dir,
        "first.zip",
        &[("glyph_65.png", png.as_slice()), ("slow", b"")],
    );
    let second_zip = build_zip(
        &env.dir,
        "second.zip",
        &[("glyph_65.png", png.as_slice())],
    );
    let first = orchestrator.submit(first_zip).await;
    let second = orchestrator.submit(second_zip).await;

    let started = std::time::Instant::now();
    let first = orchestrator.wait(&first).await.unwrap();
    let second = orchestrator.wait(&second).await.unwrap();
    assert!(started.elapsed() < std::time::Duration::from_secs(10));

    assert_eq!(first.status, JobStatus::Failed);
    assert_eq!(first.failure.unwrap().kind, FailureKind::Timeout);

    // The second job's tools are instant; only the deadline spent queued
    // can have failed it.
    assert_eq!(second.status, JobStatus::Failed);
    assert_eq!(second.failure.unwrap().kind, FailureKind::Timeout);
}
