//! CLI binary for gsbridge.
//!
//! A thin shim over the library crate that maps subcommands onto
//! [`gsbridge::Bridge`] and the export helpers and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gsbridge::{
    batch_export, eps, export, BatchProgressCallback, Bridge, BridgeConfig, ExportFormat,
    ExportOptions, ExportOutcome, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Batch progress callback using indicatif ──────────────────────────────────

/// Progress bar for `gsbridge batch`, one log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Exporting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_file_start(&self, _index: usize, _total: usize, input: &Path) {
        self.bar.set_message(input.display().to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output: &Path) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index,
            total,
            dim(&output.display().to_string())
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, input: &Path, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let first_line = error.lines().next().unwrap_or(error);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            input.display(),
            red(first_line)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} files exported", green("✔"), bold(&total.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files exported  ({} failed)",
                red("✘"),
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Engine version
  gsbridge version

  # EPS to PNG at 300 DPI
  gsbridge png figure.eps -o figure.png --dpi 300

  # EPS to JPEG, quality 80
  gsbridge jpeg figure.eps --quality 80

  # EPS to PDF cropped to the bounding box
  gsbridge pdf figure.eps -o figure.pdf

  # Measured bounding box, as JSON
  gsbridge --json bbox figure.eps

  # DSC header metadata (no Ghostscript needed)
  gsbridge inspect figure.eps

  # Convert a directory of figures
  gsbridge batch figures/*.eps --out-dir png/ --format png

  # Raw Ghostscript arguments, passed through unchanged
  gsbridge exec -- -q -dNODISPLAY -c "(hello) = quit"

ENVIRONMENT VARIABLES:
  GS_LIB_PATH            Path to libgs (skips the platform search)
  LIBGS_AUTO_CACHE_DIR   Where a bundled libgs is extracted
  GSBRIDGE_DPI           Default raster resolution
  GSBRIDGE_QUALITY       Default JPEG quality
  RUST_LOG               Log filter (overrides -v / -q)
"#;

/// Ghostscript conversions from the command line.
#[derive(Parser, Debug)]
#[command(
    name = "gsbridge",
    version,
    about = "Render, convert and measure EPS/PostScript files with Ghostscript",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the libgs shared library.
    #[arg(long, global = true, env = "GSBRIDGE_LIB")]
    lib: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true, env = "GSBRIDGE_JSON")]
    json: bool,

    /// Disable the batch progress bar.
    #[arg(long, global = true, env = "GSBRIDGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs (argument vectors, engine output).
    #[arg(short, long, global = true, env = "GSBRIDGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "GSBRIDGE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the Ghostscript version.
    Version,
    /// Rasterise to PNG.
    Png(RasterArgs),
    /// Rasterise to JPEG.
    Jpeg {
        #[command(flatten)]
        raster: RasterArgs,
        /// JPEG quality (0-100).
        #[arg(long, env = "GSBRIDGE_QUALITY", default_value_t = 90)]
        quality: i32,
    },
    /// Convert to PDF, cropped to the bounding box.
    Pdf(OutputArgs),
    /// Run Ghostscript with raw arguments. No safety flags are added.
    Exec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Measure the bounding box with the bbox device.
    Bbox {
        input: PathBuf,
    },
    /// Show the DSC header of an EPS file.
    Inspect {
        input: PathBuf,
    },
    /// Export many files into a directory.
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output directory.
        #[arg(short = 'd', long, env = "GSBRIDGE_OUT_DIR")]
        out_dir: PathBuf,
        #[arg(short, long, value_enum, default_value = "png")]
        format: ExportFormat,
        /// Raster resolution.
        #[arg(long, env = "GSBRIDGE_DPI", default_value_t = 150,
              value_parser = clap::value_parser!(u32).range(1..))]
        dpi: u32,
        /// JPEG quality (0-100).
        #[arg(long, env = "GSBRIDGE_QUALITY", default_value_t = 90)]
        quality: i32,
        /// Keep existing files instead of replacing them.
        #[arg(long)]
        no_overwrite: bool,
    },
}

#[derive(Args, Debug)]
struct OutputArgs {
    input: PathBuf,
    /// Output file. Default: the input with the format's extension.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Keep an existing output file instead of replacing it.
    #[arg(long)]
    no_overwrite: bool,
}

#[derive(Args, Debug)]
struct RasterArgs {
    #[command(flatten)]
    out: OutputArgs,
    /// Raster resolution.
    #[arg(long, env = "GSBRIDGE_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(1..))]
    dpi: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // `inspect` reads the header only and works without Ghostscript.
    if let Command::Inspect { ref input } = cli.command {
        let meta = eps::inspect(input).context("Failed to inspect EPS file")?;
        if cli.json {
            print_json(&meta)?;
        } else {
            println!("File:           {}", meta.file_name);
            println!("Size:           {} bytes", meta.file_size);
            println!("Format:         {}", if meta.binary { "DOS EPS" } else { "EPS" });
            if let Some(ref v) = meta.header.version_line {
                println!("Header:         {}", v);
            }
            if let Some(ref t) = meta.header.title {
                println!("Title:          {}", t);
            }
            if let Some(ref c) = meta.header.creator {
                println!("Creator:        {}", c);
            }
            if let Some(ref d) = meta.header.creation_date {
                println!("Created:        {}", d);
            }
            println!("Pages:          {}", meta.page_count);
            if let Some(l) = meta.header.language_level {
                println!("LanguageLevel:  {}", l);
            }
            match meta.header.effective_bounding_box() {
                Some(bb) => println!(
                    "BoundingBox:    {} {} {} {}  ({} x {} pt)",
                    bb.llx,
                    bb.lly,
                    bb.urx,
                    bb.ury,
                    bb.width(),
                    bb.height()
                ),
                None => println!("BoundingBox:    {}", dim("not declared")),
            }
        }
        return Ok(());
    }

    // ── Bind the engine ──────────────────────────────────────────────────
    #[cfg(feature = "bundled")]
    {
        tokio::task::spawn_blocking(libgs_auto::ensure_libgs_bundled)
            .await
            .context("Bundled libgs extraction panicked")?
            .context("Failed to extract bundled libgs")?;
    }

    let mut config = BridgeConfig::default();
    config.library_path = cli.lib.clone();
    let bridge = Bridge::load(config).context("Ghostscript is not available")?;

    match &cli.command {
        Command::Version => {
            let rev = bridge.revision().context("Failed to query Ghostscript revision")?;
            if cli.json {
                #[derive(Serialize)]
                struct VersionOut<'a> {
                    version: String,
                    product: &'a str,
                    copyright: &'a str,
                    revision: i64,
                    revision_date: i64,
                }
                print_json(&VersionOut {
                    version: rev.version_string(),
                    product: &rev.product,
                    copyright: &rev.copyright,
                    revision: rev.revision,
                    revision_date: rev.revision_date,
                })?;
            } else {
                println!("{}", rev.version_string());
                if !cli.quiet {
                    eprintln!("{}", dim(&rev.product));
                }
            }
        }
        Command::Png(raster) => {
            let options = ExportOptions {
                dpi: Some(raster.dpi),
                quality: None,
                overwrite: !raster.out.no_overwrite,
            };
            run_export(&bridge, &cli, &raster.out, ExportFormat::Png, &options).await?;
        }
        Command::Jpeg { raster, quality } => {
            let options = ExportOptions {
                dpi: Some(raster.dpi),
                quality: Some(*quality),
                overwrite: !raster.out.no_overwrite,
            };
            run_export(&bridge, &cli, &raster.out, ExportFormat::Jpeg, &options).await?;
        }
        Command::Pdf(out) => {
            let options = ExportOptions {
                overwrite: !out.no_overwrite,
                ..Default::default()
            };
            run_export(&bridge, &cli, out, ExportFormat::Pdf, &options).await?;
        }
        Command::Exec { args } => {
            let b = bridge.clone();
            let args = args.clone();
            let output = tokio::task::spawn_blocking(move || b.execute(args))
                .await
                .context("Ghostscript task panicked")?
                .context("Ghostscript execution failed")?;
            if cli.json {
                #[derive(Serialize)]
                struct ExecOut {
                    stdout: String,
                    stderr: String,
                    truncated: bool,
                }
                print_json(&ExecOut {
                    stdout: output.stdout().into_owned(),
                    stderr: output.stderr().into_owned(),
                    truncated: output.is_truncated(),
                })?;
            } else {
                io::stdout()
                    .write_all(output.stdout().as_bytes())
                    .context("Failed to write to stdout")?;
                io::stderr().write_all(output.stderr().as_bytes()).ok();
                if output.is_truncated() {
                    eprintln!(
                        "{} output truncated at {} bytes per stream",
                        yellow("!"),
                        gsbridge::engine::MAX_CAPTURED_BYTES
                    );
                }
            }
        }
        Command::Bbox { input } => {
            let b = bridge.clone();
            let input_str = input
                .to_str()
                .context("Input path is not valid UTF-8")?
                .to_string();
            let bb = tokio::task::spawn_blocking(move || b.bounding_box(input_str))
                .await
                .context("Ghostscript task panicked")?
                .with_context(|| format!("Failed to measure {}", input.display()))?;
            if cli.json {
                print_json(&bb)?;
            } else {
                println!("{}", bb);
            }
        }
        Command::Batch {
            inputs,
            out_dir,
            format,
            dpi,
            quality,
            no_overwrite,
        } => {
            let options = ExportOptions {
                dpi: Some(*dpi),
                quality: Some(*quality),
                overwrite: !no_overwrite,
            };
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
            } else {
                None
            };
            let report = batch_export(&bridge, inputs, out_dir, *format, &options, progress)
                .await
                .context("Batch export failed")?;
            if cli.json {
                print_json(&report)?;
            } else if !cli.quiet && !show_progress {
                eprintln!(
                    "Exported {}/{} files in {}ms",
                    report.succeeded,
                    report.items.len(),
                    report.duration_ms
                );
            }
            if report.failed > 0 {
                bail!("{} of {} files failed", report.failed, report.items.len());
            }
        }
        // Handled before the engine is bound.
        Command::Inspect { .. } => {}
    }

    Ok(())
}

async fn run_export(
    bridge: &Bridge,
    cli: &Cli,
    out: &OutputArgs,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<()> {
    let output = out
        .output
        .clone()
        .unwrap_or_else(|| out.input.with_extension(format.extension()));
    if output == out.input {
        bail!("Output would overwrite the input: {}", output.display());
    }
    let outcome: ExportOutcome = export(bridge, &out.input, &output, format, options)
        .await
        .with_context(|| format!("{} export of {} failed", format, out.input.display()))?;

    if cli.json {
        print_json(&outcome)?;
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  {}  {}",
            green("✔"),
            bold(&outcome.output.display().to_string()),
            dim(&format!("{} bytes", outcome.bytes)),
            dim(&format!("{}ms", outcome.duration_ms)),
        );
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}
