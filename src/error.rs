//! Error types for the gsbridge library.
//!
//! Every failure is a [`BridgeError`]. The variants group into the four
//! kinds a caller has to tell apart, exposed through [`BridgeError::kind`]:
//!
//! * **Unavailable**: libgs is not present or could not be bound. A caller
//!   can fall back to another renderer; retrying will not help.
//! * **Initialization**: the engine refused to start (instance creation,
//!   argument encoding, invalid argument strings).
//! * **Execution**: the engine ran and returned a non-success status
//!   (malformed input, unsupported construct, output I/O failure).
//! * **BboxParse**: the bbox device ran but its diagnostic output carried no
//!   usable `%%BoundingBox` line.
//!
//! The C ABI in [`crate::ffi`] collapses all of these to `false`, keeping the
//! kind available through `gsb_last_error`.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the gsbridge library.
#[derive(Debug, Error)]
pub enum BridgeError {
    // ── Engine availability ───────────────────────────────────────────────
    /// libgs could not be located or bound.
    #[error(
        "Ghostscript engine unavailable: {reason}\n\n\
Install Ghostscript (libgs) or point GS_LIB_PATH at the shared library.\n\
  • Debian/Ubuntu: apt install libgs10\n\
  • macOS:         brew install ghostscript\n"
    )]
    EngineUnavailable { reason: String },

    // ── Initialization ────────────────────────────────────────────────────
    /// `gsapi_new_instance` failed.
    #[error("Failed to create Ghostscript instance (code {code})")]
    InstanceCreation { code: i32 },

    /// `gsapi_set_arg_encoding` or stdio registration failed.
    #[error("Failed to configure Ghostscript instance: {what} returned {code}")]
    InstanceSetup { what: &'static str, code: i32 },

    /// An argument cannot be passed as a C string.
    #[error("Invalid argument #{index}: {reason}")]
    InvalidArgument { index: usize, reason: String },

    // ── Execution ─────────────────────────────────────────────────────────
    /// The engine ran and returned a status that is neither 0 nor quit.
    #[error("Ghostscript failed with status {code}{}", stderr_tail(.stderr))]
    Execution { code: i32, stderr: String },

    /// `gsapi_revision` failed.
    #[error("Ghostscript revision query failed: {0}")]
    Revision(String),

    // ── Extraction ────────────────────────────────────────────────────────
    /// bbox device output carried no parseable `%%BoundingBox` line.
    #[error("No %%BoundingBox found in Ghostscript output for '{path}'")]
    BoundingBoxNotFound { path: PathBuf },

    // ── Input / output ────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// File exists but does not start with a PostScript or DOS-EPS header.
    #[error("File is not an EPS/PostScript document: '{path}'\nFirst bytes: {magic:?}")]
    NotAnEps { path: PathBuf, magic: Vec<u8> },

    /// Reading an input file failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating, moving or removing an output file failed.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decoding a rendered preview failed.
    #[error("Failed to decode rendered image '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or request validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The coarse failure class of a [`BridgeError`].
///
/// The discriminants are the codes reported by `gsb_last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(i32)]
pub enum ErrorKind {
    Unavailable = 1,
    Initialization = 2,
    Execution = 3,
    BboxParse = 4,
    InvalidArgument = 5,
    Other = 6,
}

impl BridgeError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::EngineUnavailable { .. } => ErrorKind::Unavailable,
            BridgeError::InstanceCreation { .. } | BridgeError::InstanceSetup { .. } => {
                ErrorKind::Initialization
            }
            BridgeError::Execution { .. } | BridgeError::Revision(_) => ErrorKind::Execution,
            BridgeError::BoundingBoxNotFound { .. } => ErrorKind::BboxParse,
            BridgeError::InvalidArgument { .. } | BridgeError::InvalidConfig(_) => {
                ErrorKind::InvalidArgument
            }
            BridgeError::FileNotFound { .. }
            | BridgeError::NotAnEps { .. }
            | BridgeError::ReadFailed { .. }
            | BridgeError::OutputWriteFailed { .. }
            | BridgeError::DecodeFailed { .. }
            | BridgeError::Internal(_) => ErrorKind::Other,
        }
    }
}

impl From<libgs_auto::LibgsAutoError> for BridgeError {
    fn from(e: libgs_auto::LibgsAutoError) -> Self {
        BridgeError::EngineUnavailable {
            reason: e.to_string(),
        }
    }
}

/// Last non-empty stderr line, formatted as a suffix for error messages.
fn stderr_tail(stderr: &str) -> String {
    match stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => format!(": {}", line.trim()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_display_includes_last_stderr_line() {
        let e = BridgeError::Execution {
            code: -100,
            stderr: "GPL Ghostscript 10.02.1\nError: /undefined in foo\n\n".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("-100"), "got: {msg}");
        assert!(msg.ends_with("Error: /undefined in foo"), "got: {msg}");
    }

    #[test]
    fn execution_display_without_stderr() {
        let e = BridgeError::Execution {
            code: -1,
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "Ghostscript failed with status -1");
    }

    #[test]
    fn unavailable_is_its_own_kind() {
        let e = BridgeError::EngineUnavailable {
            reason: "nope".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Unavailable);
        assert!(e.to_string().contains("GS_LIB_PATH"));
    }

    #[test]
    fn kinds_are_distinct() {
        assert_eq!(
            BridgeError::InstanceCreation { code: -25 }.kind(),
            ErrorKind::Initialization
        );
        assert_eq!(
            BridgeError::BoundingBoxNotFound { path: "a.eps".into() }.kind(),
            ErrorKind::BboxParse
        );
        assert_eq!(
            BridgeError::InvalidArgument {
                index: 0,
                reason: "nul".into()
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(ErrorKind::Execution as i32, 3);
    }

    #[test]
    fn loader_errors_map_to_unavailable() {
        let e: BridgeError = libgs_auto::LibgsAutoError::NotFound { tried: vec![] }.into();
        assert_eq!(e.kind(), ErrorKind::Unavailable);
    }
}
