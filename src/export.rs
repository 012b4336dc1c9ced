//! Async file export on top of [`Bridge`].
//!
//! The bridge blocks for as long as Ghostscript runs, so everything here
//! moves the work onto tokio's blocking pool with `spawn_blocking`. The
//! engine lock in [`crate::invoke`] still serialises the actual runs.
//!
//! Exports write to a temporary sibling of the destination and rename it
//! into place once the engine reports success. A failed run leaves the
//! destination untouched.

use crate::bridge::Bridge;
use crate::error::{BridgeError, ErrorKind};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Target format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    #[cfg_attr(feature = "cli", value(alias = "jpg"))]
    Jpeg,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    /// Guess from a file extension, case-insensitively.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "pdf" => Some(ExportFormat::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Jpeg => "JPEG",
            ExportFormat::Pdf => "PDF",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| BridgeError::InvalidConfig(format!("unknown export format '{s}'")))
    }
}

/// Per-export overrides. `None` falls back to the bridge's [`crate::BridgeConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Raster resolution (PNG and JPEG only).
    pub dpi: Option<u32>,
    /// JPEG quality.
    pub quality: Option<i32>,
    /// Replace an existing destination. Default: true.
    pub overwrite: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            dpi: None,
            quality: None,
            overwrite: true,
        }
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: ExportFormat,
    /// Size of the written file.
    pub bytes: u64,
    pub duration_ms: u64,
}

/// Export `input` to `output` in `format`.
///
/// # Errors
/// - [`BridgeError::FileNotFound`] if `input` does not exist
/// - [`BridgeError::OutputWriteFailed`] if the destination exists and
///   `overwrite` is off, or the temporary file cannot be created or moved
/// - anything [`Bridge`] returns for the conversion itself
pub async fn export(
    bridge: &Bridge,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<ExportOutcome, BridgeError> {
    let bridge = bridge.clone();
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();
    let options = options.clone();

    tokio::task::spawn_blocking(move || export_blocking(&bridge, &input, &output, format, &options))
        .await
        .map_err(|e| BridgeError::Internal(format!("Export task panicked: {}", e)))?
}

fn export_blocking(
    bridge: &Bridge,
    input: &Path,
    output: &Path,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<ExportOutcome, BridgeError> {
    let start = Instant::now();
    if !input.exists() {
        return Err(BridgeError::FileNotFound {
            path: input.to_path_buf(),
        });
    }
    if !options.overwrite && output.exists() {
        return Err(BridgeError::OutputWriteFailed {
            path: output.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "destination exists and overwrite is off",
            ),
        });
    }

    let write_err = |source| BridgeError::OutputWriteFailed {
        path: output.to_path_buf(),
        source,
    };
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".gsbridge-")
        .suffix(&format!(".{}", format.extension()))
        .tempfile_in(parent)
        .map_err(write_err)?
        .into_temp_path();
    debug!("Exporting via temporary {}", temp.display());

    let input_str = path_str(input, 0)?;
    let temp_str = path_str(&temp, 1)?;
    let config = bridge.config();
    let dpi = options.dpi.unwrap_or(config.default_dpi);
    match format {
        ExportFormat::Png => bridge.render_to_png(input_str, temp_str, dpi)?,
        ExportFormat::Jpeg => bridge.render_to_jpeg(
            input_str,
            temp_str,
            dpi,
            options.quality.unwrap_or(config.jpeg_quality),
        )?,
        ExportFormat::Pdf => bridge.convert_to_pdf(input_str, temp_str)?,
    }

    let bytes = std::fs::metadata(&temp).map(|m| m.len()).map_err(write_err)?;
    temp.persist(output).map_err(|e| write_err(e.error))?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Exported {} -> {} ({}, {} bytes, {}ms)",
        input.display(),
        output.display(),
        format,
        bytes,
        duration_ms
    );
    Ok(ExportOutcome {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        format,
        bytes,
        duration_ms,
    })
}

/// Engine arguments are UTF-8.
fn path_str(path: &Path, index: usize) -> Result<&str, BridgeError> {
    path.to_str().ok_or_else(|| BridgeError::InvalidArgument {
        index,
        reason: format!("path is not valid UTF-8: {}", path.display()),
    })
}

/// One file's result within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: Option<ExportOutcome>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-file results of [`batch_export`], in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

/// Export every input into `out_dir` as `<stem>.<ext>`.
///
/// Files are converted one after another. A failure is recorded in the
/// report and the batch moves on. Inputs sharing a stem get `-2`, `-3`, ...
/// suffixes so no output is overwritten by a later input.
///
/// # Errors
/// Only when `out_dir` cannot be created; per-file failures are in the
/// returned report.
pub async fn batch_export<I, P>(
    bridge: &Bridge,
    inputs: I,
    out_dir: impl AsRef<Path>,
    format: ExportFormat,
    options: &ExportOptions,
    progress: Option<ProgressCallback>,
) -> Result<BatchReport, BridgeError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let start = Instant::now();
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| BridgeError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source,
        })?;

    let inputs: Vec<PathBuf> = inputs
        .into_iter()
        .map(|p| p.as_ref().to_path_buf())
        .collect();
    let jobs = plan_outputs(&inputs, out_dir, format);
    let total = jobs.len();
    info!("Batch export: {} files -> {} ({})", total, out_dir.display(), format);

    if let Some(ref cb) = progress {
        cb.on_batch_start(total);
    }

    let items: Vec<BatchItem> = stream::iter(jobs.into_iter().enumerate())
        .then(|(i, (input, output))| {
            let progress = progress.clone();
            async move {
                let index = i + 1;
                if let Some(ref cb) = progress {
                    cb.on_file_start(index, total, &input);
                }
                match export(bridge, &input, &output, format, options).await {
                    Ok(outcome) => {
                        if let Some(ref cb) = progress {
                            cb.on_file_complete(index, total, &output);
                        }
                        BatchItem {
                            input,
                            output,
                            outcome: Some(outcome),
                            error: None,
                            error_kind: None,
                        }
                    }
                    Err(e) => {
                        warn!("Batch item {} ({}) failed: {}", index, input.display(), e);
                        let message = e.to_string();
                        if let Some(ref cb) = progress {
                            cb.on_file_error(index, total, &input, &message);
                        }
                        BatchItem {
                            input,
                            output,
                            outcome: None,
                            error: Some(message),
                            error_kind: Some(e.kind()),
                        }
                    }
                }
            }
        })
        .collect()
        .await;

    let succeeded = items.iter().filter(|i| i.is_success()).count();
    let failed = items.len() - succeeded;
    if let Some(ref cb) = progress {
        cb.on_batch_complete(total, succeeded);
    }
    info!("Batch export done: {} ok, {} failed", succeeded, failed);

    Ok(BatchReport {
        items,
        succeeded,
        failed,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Pair each input with a unique `out_dir/<stem>.<ext>`.
///
/// Names are compared case-insensitively. A taken name gets the lowest free
/// `-N` suffix, checked against every name assigned so far.
fn plan_outputs(inputs: &[PathBuf], out_dir: &Path, format: ExportFormat) -> Vec<(PathBuf, PathBuf)> {
    let ext = format.extension();
    let mut taken: HashSet<String> = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "output".to_string());
            let mut name = format!("{}.{}", stem, ext);
            let mut n = 2;
            while !taken.insert(name.to_lowercase()) {
                name = format!("{}-{}.{}", stem, n, ext);
                n += 1;
            }
            (input.clone(), out_dir.join(name))
        })
        .collect()
}

/// Render `input` at `scale` (1.0 = 72 DPI) and decode the result.
///
/// The DPI is clamped to the bridge's preview bounds. The intermediate PNG
/// lives in the system temp directory and is removed before returning.
pub async fn render_preview(
    bridge: &Bridge,
    input: impl AsRef<Path>,
    scale: f32,
) -> Result<DynamicImage, BridgeError> {
    let bridge = bridge.clone();
    let input = input.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || render_preview_blocking(&bridge, &input, scale))
        .await
        .map_err(|e| BridgeError::Internal(format!("Preview task panicked: {}", e)))?
}

fn render_preview_blocking(
    bridge: &Bridge,
    input: &Path,
    scale: f32,
) -> Result<DynamicImage, BridgeError> {
    let dpi = bridge.config().preview_dpi(scale);
    debug!("Preview of {} at scale {} -> {} dpi", input.display(), scale, dpi);

    let temp = tempfile::Builder::new()
        .prefix("gsbridge-preview-")
        .suffix(".png")
        .tempfile()
        .map_err(|source| BridgeError::OutputWriteFailed {
            path: std::env::temp_dir(),
            source,
        })?
        .into_temp_path();

    bridge.render_to_png(path_str(input, 0)?, path_str(&temp, 1)?, dpi)?;

    let image = image::open(&temp).map_err(|e| BridgeError::DecodeFailed {
        path: temp.to_path_buf(),
        detail: e.to_string(),
    })?;
    debug!("Preview decoded: {}x{} px", image.width(), image.height());
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::engine::{Engine, EngineOutput, FixtureEngine, InstanceHandle};
    use crate::progress::BatchProgressCallback;
    use crate::version::GsRevision;
    use std::ffi::CString;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn bridge(engine: FixtureEngine) -> (Bridge, Arc<FixtureEngine>) {
        let engine = Arc::new(engine);
        (
            Bridge::with_engine(engine.clone(), BridgeConfig::default()),
            engine,
        )
    }

    fn eps(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, "%!PS-Adobe-3.0 EPSF-3.0\n%%BoundingBox: 0 0 10 10\n").unwrap();
        p
    }

    fn tiny_png() -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(4, 3)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn format_names() {
        assert_eq!(ExportFormat::Jpeg.extension(), "jpg");
        assert_eq!(ExportFormat::Pdf.mime_type(), "application/pdf");
        assert_eq!("JPEG".parse::<ExportFormat>().unwrap(), ExportFormat::Jpeg);
        assert!("tiff".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn duplicate_stems_get_suffixes() {
        let inputs = vec![
            PathBuf::from("a/fig.eps"),
            PathBuf::from("b/fig.eps"),
            PathBuf::from("c/other.ps"),
            PathBuf::from("d/FIG.eps"),
        ];
        let plan = plan_outputs(&inputs, Path::new("out"), ExportFormat::Png);
        let names: Vec<_> = plan.iter().map(|(_, o)| o.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("out/fig.png"),
                PathBuf::from("out/fig-2.png"),
                PathBuf::from("out/other.png"),
                PathBuf::from("out/FIG-3.png"),
            ]
        );
    }

    #[test]
    fn suffixed_stem_does_not_collide_with_generated_suffix() {
        let inputs = vec![
            PathBuf::from("a/fig.eps"),
            PathBuf::from("b/fig.eps"),
            PathBuf::from("c/fig-2.eps"),
            PathBuf::from("d/Fig-2.eps"),
        ];
        let plan = plan_outputs(&inputs, Path::new("out"), ExportFormat::Pdf);
        let names: Vec<_> = plan.iter().map(|(_, o)| o.clone()).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("out/fig.pdf"),
                PathBuf::from("out/fig-2.pdf"),
                PathBuf::from("out/fig-2-2.pdf"),
                PathBuf::from("out/Fig-2-3.pdf"),
            ]
        );
        let unique: HashSet<_> = names
            .iter()
            .map(|p| p.to_string_lossy().to_lowercase())
            .collect();
        assert_eq!(unique.len(), names.len());
    }

    #[tokio::test]
    async fn export_moves_output_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let input = eps(dir.path(), "a.eps");
        let output = dir.path().join("a.png");
        let (bridge, engine) = bridge(FixtureEngine::new().with_output_file(b"PNGDATA".to_vec()));

        let outcome = export(&bridge, &input, &output, ExportFormat::Png, &ExportOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.bytes, 7);
        assert_eq!(std::fs::read(&output).unwrap(), b"PNGDATA");
        assert!(engine.last_argv().unwrap().contains(&"-r150".to_string()));

        // Only the destination remains.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2);
    }

    #[tokio::test]
    async fn failed_export_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = eps(dir.path(), "a.eps");
        let output = dir.path().join("a.jpg");
        let (bridge, _) = bridge(
            FixtureEngine::new()
                .with_output_file(b"partial".to_vec())
                .with_init_status(-100),
        );

        let err = export(&bridge, &input, &output, ExportFormat::Jpeg, &ExportOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    /// Reports success but removes whatever it was told to write.
    struct VanishingOutput(FixtureEngine);

    impl Engine for VanishingOutput {
        fn revision(&self) -> Result<GsRevision, BridgeError> {
            self.0.revision()
        }

        fn new_instance(&self) -> Result<InstanceHandle, i32> {
            self.0.new_instance()
        }

        fn init_with_args(
            &self,
            instance: InstanceHandle,
            argv: &[CString],
            output: &mut EngineOutput,
        ) -> Result<i32, BridgeError> {
            let status = self.0.init_with_args(instance, argv, output)?;
            for arg in argv {
                if let Some(path) = arg.to_str().ok().and_then(|a| a.strip_prefix("-o")) {
                    std::fs::remove_file(path).unwrap();
                }
            }
            Ok(status)
        }

        fn exit(&self, instance: InstanceHandle, output: &mut EngineOutput) -> i32 {
            self.0.exit(instance, output)
        }

        fn delete_instance(&self, instance: InstanceHandle) {
            self.0.delete_instance(instance)
        }
    }

    #[tokio::test]
    async fn unreadable_rendered_file_is_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = eps(dir.path(), "a.eps");
        let output = dir.path().join("a.png");
        let engine = VanishingOutput(FixtureEngine::new().with_output_file(b"PNG".to_vec()));
        let bridge = Bridge::with_engine(Arc::new(engine), BridgeConfig::default());

        let err = export(&bridge, &input, &output, ExportFormat::Png, &ExportOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::OutputWriteFailed { .. }), "{err}");
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn export_respects_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let input = eps(dir.path(), "a.eps");
        let output = dir.path().join("a.pdf");
        std::fs::write(&output, "keep").unwrap();
        let (bridge, engine) = bridge(FixtureEngine::new());

        let options = ExportOptions {
            overwrite: false,
            ..Default::default()
        };
        let err = export(&bridge, &input, &output, ExportFormat::Pdf, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::OutputWriteFailed { .. }));
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "keep");
        assert_eq!(engine.new_instance_calls(), 0);
    }

    #[test]
    fn export_missing_input() {
        let (bridge, _) = bridge(FixtureEngine::new());
        let err = tokio_test::block_on(async {
            export(
                &bridge,
                "/definitely/not/here.eps",
                "/tmp/x.png",
                ExportFormat::Png,
                &ExportOptions::default(),
            )
            .await
        })
        .unwrap_err();
        assert!(matches!(err, BridgeError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        struct Counter(AtomicUsize, AtomicUsize);
        impl BatchProgressCallback for Counter {
            fn on_file_complete(&self, _: usize, _: usize, _: &Path) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_file_error(&self, _: usize, _: usize, _: &Path, _: &str) {
                self.1.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let a = eps(dir.path(), "a.eps");
        let b = eps(dir.path(), "b.eps");
        let missing = dir.path().join("missing.eps");
        let out = dir.path().join("out");
        let (bridge, _) = bridge(FixtureEngine::new().with_output_file(b"x".to_vec()));
        let counter = Arc::new(Counter(AtomicUsize::new(0), AtomicUsize::new(0)));

        let report = batch_export(
            &bridge,
            [&a, &missing, &b],
            &out,
            ExportFormat::Png,
            &ExportOptions::default(),
            Some(counter.clone()),
        )
        .await
        .unwrap();

        assert_eq!((report.succeeded, report.failed), (2, 1));
        assert_eq!(report.items[1].error_kind, Some(ErrorKind::Other));
        assert!(out.join("a.png").exists());
        assert!(out.join("b.png").exists());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert_eq!(counter.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preview_decodes_rendered_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = eps(dir.path(), "a.eps");
        let (bridge, engine) = bridge(FixtureEngine::new().with_output_file(tiny_png()));

        let img = render_preview(&bridge, &input, 20.0).await.unwrap();
        assert_eq!((img.width(), img.height()), (4, 3));
        // 72 * 20 = 1440, clamped to 600.
        assert!(engine.last_argv().unwrap().contains(&"-r600".to_string()));
    }

    #[tokio::test]
    async fn preview_without_output_is_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = eps(dir.path(), "a.eps");
        let (bridge, _) = bridge(FixtureEngine::new());
        let err = render_preview(&bridge, &input, 1.0).await.unwrap_err();
        assert!(matches!(err, BridgeError::DecodeFailed { .. }));
    }
}
