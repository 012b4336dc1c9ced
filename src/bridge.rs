//! The typed conversion API.
//!
//! [`Bridge`] turns typed requests into argument vectors, runs them through
//! [`crate::invoke::invoke`] and maps the outcome back to Rust types. Every
//! call is synchronous and blocks the calling thread until the engine is
//! done; use [`crate::export`] from async code.

use crate::args::{ArgumentVector, ConversionRequest};
use crate::bbox::{parse_bbox_output, BoundingBox};
use crate::config::BridgeConfig;
use crate::engine::{Engine, EngineOutput, LibgsEngine};
use crate::error::BridgeError;
use crate::invoke::invoke;
use crate::version::GsRevision;
use std::fmt;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Handle to a Ghostscript engine plus the defaults to use with it.
///
/// Cloning is cheap; clones share the engine.
///
/// # Example
/// ```rust,no_run
/// use gsbridge::{Bridge, BridgeConfig};
///
/// let bridge = Bridge::load(BridgeConfig::default())?;
/// println!("Ghostscript {}", bridge.version()?);
/// bridge.render_to_png("figure.eps", "figure.png", 300)?;
/// let bb = bridge.bounding_box("figure.eps")?;
/// println!("{} x {} pt", bb.width(), bb.height());
/// # Ok::<(), gsbridge::BridgeError>(())
/// ```
#[derive(Clone)]
pub struct Bridge {
    engine: Arc<dyn Engine>,
    config: BridgeConfig,
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Bridge {
    /// Bind libgs and build a bridge over it.
    ///
    /// # Errors
    /// [`BridgeError::EngineUnavailable`] when no usable library is found.
    pub fn load(config: BridgeConfig) -> Result<Self, BridgeError> {
        let engine = LibgsEngine::bind(config.library_path.as_deref())?;
        info!("Using libgs at {}", engine.library_path().display());
        Ok(Self::with_engine(Arc::new(engine), config))
    }

    /// Build a bridge over any engine.
    pub fn with_engine(engine: Arc<dyn Engine>, config: BridgeConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Raw revision metadata.
    pub fn revision(&self) -> Result<GsRevision, BridgeError> {
        self.engine.revision()
    }

    /// `major.minor.patch-build`, e.g. `10.02.1-20230913`.
    pub fn version(&self) -> Result<String, BridgeError> {
        let rev = self.revision()?;
        debug!("Ghostscript product: {}", rev.product);
        Ok(rev.version_string())
    }

    /// Run any request and return what the engine printed.
    pub fn run(&self, request: &ConversionRequest) -> Result<EngineOutput, BridgeError> {
        self.run_args(&request.to_arguments())
    }

    fn run_args(&self, args: &ArgumentVector) -> Result<EngineOutput, BridgeError> {
        invoke(self.engine.as_ref(), args)
    }

    /// Rasterise `input` to a 24-bit PNG at `dpi`.
    pub fn render_to_png(
        &self,
        input: impl AsRef<str>,
        output: impl AsRef<str>,
        dpi: u32,
    ) -> Result<(), BridgeError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let dpi = positive_dpi(dpi)?;
        info!("Rendering {} -> {} (PNG, {} dpi)", input, output, dpi);
        self.timed("png", || {
            self.run(&ConversionRequest::png(input, output, dpi))
                .map(drop)
        })
    }

    /// Rasterise `input` to a JPEG at `dpi`. `quality` goes to the engine
    /// unchanged; values outside 0–100 are for Ghostscript to reject.
    pub fn render_to_jpeg(
        &self,
        input: impl AsRef<str>,
        output: impl AsRef<str>,
        dpi: u32,
        quality: i32,
    ) -> Result<(), BridgeError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        let dpi = positive_dpi(dpi)?;
        info!(
            "Rendering {} -> {} (JPEG, {} dpi, quality {})",
            input, output, dpi, quality
        );
        self.timed("jpeg", || {
            self.run(&ConversionRequest::jpeg(input, output, dpi, quality))
                .map(drop)
        })
    }

    /// Convert `input` to a PDF cropped to its bounding box.
    pub fn convert_to_pdf(
        &self,
        input: impl AsRef<str>,
        output: impl AsRef<str>,
    ) -> Result<(), BridgeError> {
        let (input, output) = (input.as_ref(), output.as_ref());
        info!("Converting {} -> {} (PDF)", input, output);
        self.timed("pdf", || {
            self.run(&ConversionRequest::pdf(input, output)).map(drop)
        })
    }

    /// Run the engine with caller-supplied arguments, verbatim.
    ///
    /// No safety flags are added. The caller is responsible for `-dSAFER`
    /// and for whatever the arguments read or write.
    pub fn execute<I, S>(&self, args: I) -> Result<EngineOutput, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ConversionRequest::custom(args);
        info!("Executing custom Ghostscript command");
        self.timed("exec", || self.run(&request))
    }

    /// Measure the marked area of `input` with the bbox device.
    ///
    /// # Errors
    /// [`BridgeError::BoundingBoxNotFound`] when the engine succeeds but
    /// prints no `%%BoundingBox` line.
    pub fn bounding_box(&self, input: impl AsRef<str>) -> Result<BoundingBox, BridgeError> {
        let input = input.as_ref();
        info!("Measuring bounding box of {}", input);
        let output = self.timed("bbox", || {
            self.run(&ConversionRequest::bounding_box(input))
        })?;
        let stderr = output.stderr();
        match parse_bbox_output(&stderr) {
            Some(bb) => {
                debug!("{}: {}", input, bb);
                Ok(bb)
            }
            None => {
                warn!("No %%BoundingBox in bbox output for {}", input);
                debug!("bbox stderr:\n{}", stderr);
                Err(BridgeError::BoundingBoxNotFound {
                    path: PathBuf::from(input),
                })
            }
        }
    }

    fn timed<T>(
        &self,
        op: &str,
        f: impl FnOnce() -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let start = Instant::now();
        let result = f();
        let ms = start.elapsed().as_millis();
        match &result {
            Ok(_) => info!("{} finished in {}ms", op, ms),
            Err(e) => warn!("{} failed after {}ms: {}", op, ms, e),
        }
        result
    }
}

fn positive_dpi(dpi: u32) -> Result<NonZeroU32, BridgeError> {
    NonZeroU32::new(dpi).ok_or_else(|| BridgeError::InvalidConfig("dpi must be positive".into()))
}
