//! EPS detection and DSC header inspection.
//!
//! This reads the document structuring comments an EPS file carries in its
//! header without running the engine. It answers "is this an EPS?" and
//! "what does it claim about itself?"; [`crate::Bridge::bounding_box`] is
//! the authoritative measurement.
//!
//! Both plain EPS (`%!PS-Adobe-3.0 EPSF-3.0`) and DOS EPS (a 30-byte binary
//! header wrapping the PostScript section, often with a TIFF preview) are
//! understood.

use crate::bbox::BoundingBox;
use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// First four bytes of a DOS EPS file.
pub const DOS_EPS_MAGIC: [u8; 4] = [0xC5, 0xD0, 0xD3, 0xC6];

/// Length of the DOS EPS binary header.
const DOS_EPS_HEADER_LEN: usize = 30;

/// Header lines scanned before giving up.
pub const MAX_HEADER_LINES: usize = 100;

/// Whether `bytes` (the start of a file) look like PostScript or DOS EPS.
pub fn is_eps(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%!PS") || bytes.starts_with(&DOS_EPS_MAGIC)
}

/// The DSC comments found in an EPS header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpsHeader {
    /// The `%!PS-Adobe-...` line.
    pub version_line: Option<String>,
    pub title: Option<String>,
    pub creator: Option<String>,
    pub creation_date: Option<String>,
    pub pages: Option<u32>,
    pub language_level: Option<u32>,
    pub bounding_box: Option<BoundingBox>,
    /// Fractional bounds, truncated toward zero.
    pub hires_bounding_box: Option<BoundingBox>,
}

impl EpsHeader {
    /// `%%BoundingBox`, falling back to `%%HiResBoundingBox`.
    pub fn effective_bounding_box(&self) -> Option<BoundingBox> {
        self.bounding_box.or(self.hires_bounding_box)
    }

    /// Whether the version line declares EPSF conformance.
    pub fn is_epsf(&self) -> bool {
        self.version_line
            .as_deref()
            .is_some_and(|l| l.contains("EPSF-"))
    }
}

/// Scan up to [`MAX_HEADER_LINES`] lines of DSC header.
///
/// Stops early at `%%EndComments`. The first occurrence of each comment
/// wins. Values of `(atend)` are left unset. Invalid UTF-8 is replaced, not
/// rejected.
pub fn parse_header(mut reader: impl BufRead) -> std::io::Result<EpsHeader> {
    let mut header = EpsHeader::default();
    let mut buf = Vec::new();

    for n in 0..MAX_HEADER_LINES {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\r', '\n']);

        if n == 0 && line.starts_with("%!PS") {
            header.version_line = Some(line.to_string());
            continue;
        }
        if line.starts_with("%%EndComments") {
            break;
        }

        if let Some(v) = dsc_value(line, "%%Title:") {
            header.title.get_or_insert_with(|| unquote(v).to_string());
        } else if let Some(v) = dsc_value(line, "%%Creator:") {
            header.creator.get_or_insert_with(|| v.to_string());
        } else if let Some(v) = dsc_value(line, "%%CreationDate:") {
            header.creation_date.get_or_insert_with(|| unquote(v).to_string());
        } else if let Some(v) = dsc_value(line, "%%Pages:") {
            if header.pages.is_none() {
                header.pages = first_token(v).and_then(|t| t.parse().ok());
            }
        } else if let Some(v) = dsc_value(line, "%%LanguageLevel:") {
            if header.language_level.is_none() {
                header.language_level = first_token(v).and_then(|t| t.parse().ok());
            }
        } else if let Some(v) = dsc_value(line, "%%HiResBoundingBox:") {
            if header.hires_bounding_box.is_none() {
                header.hires_bounding_box = parse_box(v, |t| {
                    t.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i32)
                });
            }
        } else if let Some(v) = dsc_value(line, "%%BoundingBox:") {
            if header.bounding_box.is_none() {
                header.bounding_box = parse_box(v, |t| t.parse::<i32>().ok());
                if header.bounding_box.is_none() && !v.starts_with("(atend)") {
                    warn!("Invalid %%BoundingBox line: {}", line);
                }
            }
        }
    }

    Ok(header)
}

fn dsc_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key).map(str::trim)
}

fn first_token(v: &str) -> Option<&str> {
    v.split_whitespace().next()
}

fn unquote(v: &str) -> &str {
    v.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(v)
}

fn parse_box(v: &str, parse: impl Fn(&str) -> Option<i32>) -> Option<BoundingBox> {
    let mut parts = v.split_whitespace();
    let mut out = [0i32; 4];
    for slot in &mut out {
        *slot = parse(parts.next()?)?;
    }
    Some(BoundingBox::from(out))
}

/// What [`inspect`] learns about a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsMetadata {
    pub file_name: String,
    pub file_size: u64,
    /// Seconds since the Unix epoch, when the platform reports it.
    pub modified_at: Option<u64>,
    /// DOS EPS with a binary header.
    pub binary: bool,
    /// `%%Pages`, or 1 when absent.
    pub page_count: u32,
    /// From the header bounding box; `None` when the header has none.
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub header: EpsHeader,
}

/// Inspect the EPS file at `path`.
///
/// # Errors
/// - [`BridgeError::FileNotFound`] if `path` does not exist
/// - [`BridgeError::NotAnEps`] if the file has neither header
/// - [`BridgeError::ReadFailed`] on any other I/O error
pub fn inspect(path: impl AsRef<Path>) -> Result<EpsMetadata, BridgeError> {
    let path = path.as_ref();
    let read_err = |source| BridgeError::ReadFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            read_err(e)
        }
    })?;
    let meta = file.metadata().map_err(read_err)?;

    let mut magic = Vec::with_capacity(DOS_EPS_HEADER_LEN);
    (&mut file)
        .take(DOS_EPS_HEADER_LEN as u64)
        .read_to_end(&mut magic)
        .map_err(read_err)?;
    if !is_eps(&magic) {
        magic.truncate(8);
        return Err(BridgeError::NotAnEps {
            path: path.to_path_buf(),
            magic,
        });
    }

    let binary = magic.starts_with(&DOS_EPS_MAGIC);
    let header = if binary {
        let (offset, len) = dos_eps_section(&magic).ok_or_else(|| BridgeError::NotAnEps {
            path: path.to_path_buf(),
            magic: magic[..magic.len().min(8)].to_vec(),
        })?;
        debug!("DOS EPS: PostScript section at {} ({} bytes)", offset, len);
        file.seek(SeekFrom::Start(offset)).map_err(read_err)?;
        parse_header(BufReader::new(file.take(len))).map_err(read_err)?
    } else {
        file.seek(SeekFrom::Start(0)).map_err(read_err)?;
        parse_header(BufReader::new(file)).map_err(read_err)?
    };

    let bb = header.effective_bounding_box();
    Ok(EpsMetadata {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: meta.len(),
        modified_at: meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs()),
        binary,
        page_count: header.pages.filter(|&p| p > 0).unwrap_or(1),
        width: bb.map(|b| b.width()),
        height: bb.map(|b| b.height()),
        header,
    })
}

/// PostScript section `(offset, length)` from a DOS EPS header.
fn dos_eps_section(header: &[u8]) -> Option<(u64, u64)> {
    let word = |at: usize| -> Option<u32> {
        let b: [u8; 4] = header.get(at..at + 4)?.try_into().ok()?;
        Some(u32::from_le_bytes(b))
    };
    let offset = word(4)?;
    let len = word(8)?;
    (offset as usize >= DOS_EPS_HEADER_LEN && len > 0).then_some((offset as u64, len as u64))
}
