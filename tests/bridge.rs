//! Integration tests for the typed bridge, driven by `FixtureEngine`.
//!
//! No Ghostscript install is needed: the fixture scripts each engine status
//! and records every argv and lifecycle call, so these run everywhere.
//!
//! Run with:
//!   cargo test --test bridge

use gsbridge::engine::{GS_ERROR_INFO, GS_ERROR_QUIT};
use gsbridge::{
    batch_export, build_arguments, inspect, Bridge, BridgeConfig, BridgeError, ConversionRequest,
    ErrorKind, ExportFormat, ExportOptions, FixtureEngine,
};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn bridge_over(engine: FixtureEngine) -> (Bridge, Arc<FixtureEngine>) {
    let engine = Arc::new(engine);
    let bridge = Bridge::with_engine(engine.clone(), BridgeConfig::default());
    (bridge, engine)
}

fn dpi(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

fn write_eps(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let p = dir.join(name);
    std::fs::write(&p, body).unwrap();
    p
}

// ── End-to-end with a scripted engine ────────────────────────────────────────

#[test]
fn test_render_to_png_with_quit_status_succeeds() {
    let (bridge, engine) = bridge_over(FixtureEngine::new().with_init_status(GS_ERROR_QUIT));
    assert!(bridge.render_to_png("a.eps", "a.png", 150).is_ok());
    assert_eq!(engine.new_instance_calls(), 1);
    assert_eq!(engine.delete_calls(), 1);
}

#[test]
fn test_render_to_png_with_status_minus_one_fails() {
    let (bridge, engine) = bridge_over(FixtureEngine::new().with_init_status(-1));
    let err = bridge.render_to_png("a.eps", "a.png", 150).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(engine.delete_calls(), 1);
}

#[test]
fn test_only_zero_and_quit_are_success() {
    for (code, ok) in [
        (0, true),
        (GS_ERROR_QUIT, true),
        (-1, false),
        (-100, false),
        (GS_ERROR_INFO, false),
        (1, false),
    ] {
        let (bridge, _) = bridge_over(FixtureEngine::new().with_init_status(code));
        assert_eq!(
            bridge.convert_to_pdf("a.eps", "a.pdf").is_ok(),
            ok,
            "status {code}"
        );
    }
}

#[test]
fn test_teardown_once_when_instance_setup_fails() {
    let (bridge, engine) = bridge_over(FixtureEngine::new().failing_setup(-15));
    let err = bridge.render_to_jpeg("a.eps", "a.jpg", 150, 90).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Initialization);
    assert_eq!(engine.delete_calls(), 1);
    assert_eq!(engine.exit_calls(), 0);
}

#[test]
fn test_new_instance_failure_is_initialization() {
    let (bridge, engine) = bridge_over(FixtureEngine::new().failing_new_instance(-25));
    let err = bridge.execute(["-v"]).unwrap_err();
    assert!(matches!(err, BridgeError::InstanceCreation { code: -25 }));
    assert_eq!(engine.delete_calls(), 0);
}

#[test]
fn test_empty_execute_sends_only_program_name() {
    let (bridge, engine) = bridge_over(FixtureEngine::new());
    bridge.execute(Vec::<String>::new()).unwrap();
    assert_eq!(engine.argv_log(), vec![vec!["gs".to_string()]]);
}

#[test]
fn test_bbox_without_marker_fails() {
    let (bridge, _) = bridge_over(
        FixtureEngine::new().with_stderr("GPL Ghostscript 10.02.1\nno metrics here\n"),
    );
    let err = bridge.bounding_box("a.eps").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BboxParse);
    assert!(matches!(err, BridgeError::BoundingBoxNotFound { .. }));
}

#[test]
fn test_bbox_argv_and_result() {
    let (bridge, engine) =
        bridge_over(FixtureEngine::new().with_stderr("%%BoundingBox: 0 0 200 100\n"));
    let bb = bridge.bounding_box("fig.eps").unwrap();
    assert_eq!(bb.as_array(), [0, 0, 200, 100]);
    assert_eq!(
        engine.last_argv().unwrap(),
        vec!["gs", "-dNOPAUSE", "-dBATCH", "-dSAFER", "-sDEVICE=bbox", "fig.eps"]
    );
}

#[test]
fn test_each_call_gets_its_own_instance() {
    let (bridge, engine) = bridge_over(FixtureEngine::new());
    bridge.render_to_png("a.eps", "a.png", 72).unwrap();
    bridge.render_to_png("b.eps", "b.png", 72).unwrap();
    bridge.convert_to_pdf("c.eps", "c.pdf").unwrap();
    assert_eq!(engine.new_instance_calls(), 3);
    assert_eq!(engine.delete_calls(), 3);
}

#[test]
fn test_threads_share_one_bridge() {
    let (bridge, engine) = bridge_over(FixtureEngine::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let b = bridge.clone();
            std::thread::spawn(move || b.render_to_png(format!("{i}.eps"), format!("{i}.png"), 96))
        })
        .collect();
    for h in handles {
        h.join().unwrap().unwrap();
    }
    assert_eq!(engine.delete_calls(), 4);
}

// ── Argument building properties ─────────────────────────────────────────────

#[test]
fn test_png_vector_order_for_many_dpis() {
    for d in [1, 72, 150, 300, 600, 2400, u32::MAX] {
        let argv = build_arguments(&ConversionRequest::png("in.eps", "out.png", dpi(d)));
        assert_eq!(argv.len(), 7);
        let r = argv.position_of("-r").unwrap();
        let o = argv.position_of("-o").unwrap();
        let i = argv.iter().position(|a| a == "in.eps").unwrap();
        assert!(r < o && o < i, "dpi {d}: {argv}");
    }
}

#[test]
fn test_jpeg_quality_flag_exactly_once() {
    for q in [0, 1, 50, 99, 100] {
        let argv = build_arguments(&ConversionRequest::jpeg("in.eps", "out.jpg", dpi(150), q));
        let flags: Vec<_> = argv.iter().filter(|a| a.starts_with("-dJPEGQ=")).collect();
        assert_eq!(flags, vec![&format!("-dJPEGQ={q}")]);
        assert!(argv.position_of("-sDEVICE=").unwrap() < argv.position_of("-r").unwrap());
    }
}

#[test]
fn test_pdf_vector_never_has_resolution() {
    let argv = build_arguments(&ConversionRequest::pdf("in.eps", "out.pdf"));
    assert!(argv.position_of("-r").is_none());
}

// ── Export façade ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_export_reports_every_file() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_eps(dir.path(), "a.eps", "%!PS-Adobe-3.0 EPSF-3.0\n");
    let b = write_eps(dir.path(), "b.eps", "%!PS-Adobe-3.0 EPSF-3.0\n");
    let (bridge, engine) = bridge_over(FixtureEngine::new().with_output_file(b"%PDF-1.7".to_vec()));

    let report = batch_export(
        &bridge,
        [&a, &b],
        dir.path().join("pdf"),
        ExportFormat::Pdf,
        &ExportOptions::default(),
        None,
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(engine.delete_calls(), 2);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["items"][1]["outcome"]["format"], "pdf");
    assert_eq!(
        std::fs::read(dir.path().join("pdf/b.pdf")).unwrap(),
        b"%PDF-1.7"
    );
}

#[test]
fn test_inspect_reads_header_without_engine() {
    let dir = tempfile::tempdir().unwrap();
    let p = write_eps(
        dir.path(),
        "logo.eps",
        "%!PS-Adobe-3.0 EPSF-3.0\n%%Creator: Inkscape\n%%BoundingBox: 0 0 64 32\n%%EndComments\n",
    );
    let meta = inspect(&p).unwrap();
    assert_eq!(meta.file_name, "logo.eps");
    assert_eq!(meta.header.creator.as_deref(), Some("Inkscape"));
    assert_eq!((meta.width, meta.height), (Some(64), Some(32)));
}
