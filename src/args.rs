//! Argument building: typed conversion requests → Ghostscript argv.
//!
//! Every managed operation starts with the same three safety flags
//! (`-dNOPAUSE -dBATCH -dSAFER`), then selects a device, then adds
//! device-specific options, then the output flag, then the input path.
//! Values are string-concatenated onto their flags exactly as the
//! `gs` command line expects (`-r150`, `-o/out.png`, `-dJPEGQ=90`).
//!
//! [`Operation::Custom`] is the exception: its arguments are passed through
//! verbatim, with no safety flags and no path checks.
//!
//! The program-name token (`argv[0]`) is *not* part of an
//! [`ArgumentVector`]; [`crate::invoke`] prepends it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

/// Non-interactive page handling.
pub const FLAG_NOPAUSE: &str = "-dNOPAUSE";
/// Exit after processing the inputs.
pub const FLAG_BATCH: &str = "-dBATCH";
/// Restricted file-system access.
pub const FLAG_SAFER: &str = "-dSAFER";
/// Crop PDF output to the EPS bounding box.
pub const FLAG_EPSCROP: &str = "-dEPSCrop";

/// Safety flags prepended to every managed operation, in order.
pub const SAFETY_FLAGS: [&str; 3] = [FLAG_NOPAUSE, FLAG_BATCH, FLAG_SAFER];

/// Ghostscript output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// 24-bit RGB PNG.
    Png16m,
    /// Baseline JPEG.
    Jpeg,
    /// Vector PDF.
    PdfWrite,
    /// Bounding-box metrics on stderr; no output file.
    BBox,
}

impl Device {
    /// Name as passed to `-sDEVICE=`.
    pub fn name(self) -> &'static str {
        match self {
            Device::Png16m => "png16m",
            Device::Jpeg => "jpeg",
            Device::PdfWrite => "pdfwrite",
            Device::BBox => "bbox",
        }
    }

    /// The full `-sDEVICE=` flag.
    pub fn flag(self) -> String {
        format!("-sDEVICE={}", self.name())
    }
}

/// What to do with the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    ToPng { dpi: NonZeroU32 },
    /// `quality` is forwarded unchanged; Ghostscript validates the range.
    ToJpeg { dpi: NonZeroU32, quality: i32 },
    ToPdf,
    /// Raw argv, passed through verbatim.
    Custom { args: Vec<String> },
    GetBoundingBox,
}

/// One conversion call's worth of input.
///
/// `input` and `output` are ignored by [`Operation::Custom`], and `output`
/// is ignored by [`Operation::GetBoundingBox`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input: String,
    pub output: String,
    pub operation: Operation,
}

impl ConversionRequest {
    pub fn png(input: impl Into<String>, output: impl Into<String>, dpi: NonZeroU32) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            operation: Operation::ToPng { dpi },
        }
    }

    pub fn jpeg(
        input: impl Into<String>,
        output: impl Into<String>,
        dpi: NonZeroU32,
        quality: i32,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            operation: Operation::ToJpeg { dpi, quality },
        }
    }

    pub fn pdf(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            operation: Operation::ToPdf,
        }
    }

    pub fn custom<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: String::new(),
            output: String::new(),
            operation: Operation::Custom {
                args: args.into_iter().map(Into::into).collect(),
            },
        }
    }

    pub fn bounding_box(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: String::new(),
            operation: Operation::GetBoundingBox,
        }
    }

    /// Build the argv for this request.
    pub fn to_arguments(&self) -> ArgumentVector {
        build_arguments(self)
    }
}

/// Ordered engine arguments, excluding the program-name token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, arg: impl Into<String>) {
        self.0.push(arg.into());
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Position of the first argument starting with `prefix`.
    pub fn position_of(&self, prefix: &str) -> Option<usize> {
        self.0.iter().position(|a| a.starts_with(prefix))
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ArgumentVector {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

impl<'a> IntoIterator for &'a ArgumentVector {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

fn resolution_flag(dpi: NonZeroU32) -> String {
    format!("-r{dpi}")
}

fn output_flag(output: &str) -> String {
    format!("-o{output}")
}

fn managed(device: Device) -> ArgumentVector {
    let mut argv = ArgumentVector::new();
    for flag in SAFETY_FLAGS {
        argv.push(flag);
    }
    argv.push(device.flag());
    argv
}

/// Build the argv for `request`. Deterministic; never fails.
pub fn build_arguments(request: &ConversionRequest) -> ArgumentVector {
    match &request.operation {
        Operation::ToPng { dpi } => {
            let mut argv = managed(Device::Png16m);
            argv.push(resolution_flag(*dpi));
            argv.push(output_flag(&request.output));
            argv.push(request.input.clone());
            argv
        }
        Operation::ToJpeg { dpi, quality } => {
            let mut argv = managed(Device::Jpeg);
            argv.push(format!("-dJPEGQ={quality}"));
            argv.push(resolution_flag(*dpi));
            argv.push(output_flag(&request.output));
            argv.push(request.input.clone());
            argv
        }
        Operation::ToPdf => {
            let mut argv = managed(Device::PdfWrite);
            argv.push(FLAG_EPSCROP);
            argv.push(output_flag(&request.output));
            argv.push(request.input.clone());
            argv
        }
        Operation::Custom { args } => ArgumentVector(args.clone()),
        Operation::GetBoundingBox => {
            let mut argv = managed(Device::BBox);
            argv.push(request.input.clone());
            argv
        }
    }
}
