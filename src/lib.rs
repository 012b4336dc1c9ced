//! # gsbridge
//!
//! A typed bridge over the Ghostscript API: render EPS/PostScript to PNG or
//! JPEG, convert it to PDF, measure its bounding box, or run Ghostscript
//! with arbitrary arguments. Usable from Rust, from the `gsbridge` CLI, and
//! from managed runtimes through the C ABI in [`ffi`].
//!
//! ## How a call runs
//!
//! ```text
//! typed request (ConversionRequest)
//!  │
//!  ├─ 1. Args     build the argv: -dNOPAUSE -dBATCH -dSAFER -sDEVICE=… -r… -o… input
//!  ├─ 2. Lock     take the process-wide engine lock
//!  ├─ 3. Engine   gsapi_new_instance → set_arg_encoding → init_with_args
//!  ├─ 4. Teardown gsapi_exit → gsapi_delete_instance (always, exactly once)
//!  └─ 5. Result   status 0 or quit → Ok; bbox parsed from captured stderr
//! ```
//!
//! libgs is bound at runtime by the `libgs-auto` crate, so a missing
//! Ghostscript install is an ordinary [`BridgeError::EngineUnavailable`]
//! rather than a link failure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gsbridge::{Bridge, BridgeConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // libgs from GS_LIB_PATH or the platform's default library names
//!     let bridge = Bridge::load(BridgeConfig::default())?;
//!     println!("Ghostscript {}", bridge.version()?);
//!     bridge.render_to_png("figure.eps", "figure.png", 150)?;
//!     bridge.convert_to_pdf("figure.eps", "figure.pdf")?;
//!     let bb = bridge.bounding_box("figure.eps")?;
//!     println!("{bb}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `gsbridge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | off     | Embeds the libgs named by `GS_BUNDLE_LIB` at build time |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! gsbridge = { version = "0.1", default-features = false }
//! ```
//!
//! ## Concurrency
//!
//! Ghostscript does not support concurrent instances in one process. Every
//! call takes a global lock for the lifetime of its instance, so calls from
//! many threads are safe but run one at a time. There is no cancellation;
//! wrap a call in an abandonable worker if you need a timeout.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod args;
pub mod bbox;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod eps;
pub mod error;
pub mod export;
pub mod ffi;
pub mod invoke;
pub mod progress;
pub mod version;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use args::{build_arguments, ArgumentVector, ConversionRequest, Device, Operation};
pub use bbox::{parse_bbox_output, BoundingBox};
pub use bridge::Bridge;
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use engine::{Engine, EngineOutput, FixtureEngine, LibgsEngine};
pub use eps::{inspect, EpsHeader, EpsMetadata};
pub use error::{BridgeError, ErrorKind};
pub use export::{
    batch_export, export, render_preview, BatchItem, BatchReport, ExportFormat, ExportOptions,
    ExportOutcome,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use version::GsRevision;
