//! The engine seam: Ghostscript's instance lifecycle behind a trait.
//!
//! [`Engine`] mirrors the five `gsapi_*` calls a single invocation needs,
//! nothing more. Two implementations ship with the crate:
//!
//! - [`LibgsEngine`]: the real thing, bound at runtime through `libgs-auto`.
//! - [`FixtureEngine`]: a scripted double that records every call, for
//!   exercising the bridge without Ghostscript installed.
//!
//! Callers never drive an `Engine` directly; [`crate::invoke::invoke`] owns
//! the create → init → exit → delete sequence and guarantees teardown.

pub mod fixture;
pub mod libgs;

pub use fixture::FixtureEngine;
pub use libgs::LibgsEngine;

use crate::error::BridgeError;
use crate::version::GsRevision;
use std::borrow::Cow;
use std::ffi::{c_void, CString};
use std::ptr::NonNull;
use tracing::warn;

/// `gs_error_Quit`: the interpreter executed `quit`. Counts as success.
pub const GS_ERROR_QUIT: i32 = -101;

/// `gs_error_Info`: returned after `-h` / `--version`. Counts as failure.
pub const GS_ERROR_INFO: i32 = -110;

/// Whether an engine status means the run completed.
pub fn is_success(code: i32) -> bool {
    code == 0 || code == GS_ERROR_QUIT
}

/// Opaque engine instance pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceHandle(NonNull<c_void>);

impl InstanceHandle {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Per-stream capture limit. Bytes past it are dropped.
pub const MAX_CAPTURED_BYTES: usize = 8 * 1024 * 1024;

/// Text the engine wrote to its stdout and stderr during one invocation.
///
/// Each stream keeps at most `limit` bytes, from the start of the run.
/// [`EngineOutput::is_truncated`] reports whether anything was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl Default for EngineOutput {
    fn default() -> Self {
        Self::with_limit(MAX_CAPTURED_BYTES)
    }
}

impl EngineOutput {
    /// Capture at most `limit` bytes per stream.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn write_stdout(&mut self, bytes: &[u8]) {
        let limit = self.limit;
        Self::capture(&mut self.stdout, bytes, limit, &mut self.truncated, "stdout");
    }

    pub fn write_stderr(&mut self, bytes: &[u8]) {
        let limit = self.limit;
        Self::capture(&mut self.stderr, bytes, limit, &mut self.truncated, "stderr");
    }

    fn capture(buf: &mut Vec<u8>, bytes: &[u8], limit: usize, truncated: &mut bool, stream: &str) {
        let room = limit.saturating_sub(buf.len());
        if bytes.len() > room {
            if !*truncated {
                warn!("Engine {} exceeded {} bytes; dropping the rest", stream, limit);
            }
            *truncated = true;
        }
        buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    /// Whether either stream hit the capture limit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn stdout(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    /// The diagnostic stream. The bbox device reports here.
    pub fn stderr(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// The raw Ghostscript instance lifecycle.
///
/// Implementations must be callable from any thread, but the bridge never
/// runs two instances at once (see [`crate::invoke`]).
pub trait Engine: Send + Sync {
    /// `gsapi_revision`.
    fn revision(&self) -> Result<GsRevision, BridgeError>;

    /// `gsapi_new_instance`. `Err` carries the engine's status code.
    fn new_instance(&self) -> Result<InstanceHandle, i32>;

    /// Configure the instance and run `gsapi_init_with_args`.
    ///
    /// `argv[0]` is the program-name token. Output written by the engine
    /// during the call lands in `output`. `Err` means the instance could not
    /// be configured and the interpreter never started; `Ok` carries the
    /// interpreter's status.
    fn init_with_args(
        &self,
        instance: InstanceHandle,
        argv: &[CString],
        output: &mut EngineOutput,
    ) -> Result<i32, BridgeError>;

    /// `gsapi_exit`. Only called after `init_with_args` returned `Ok`.
    fn exit(&self, instance: InstanceHandle, output: &mut EngineOutput) -> i32;

    /// `gsapi_delete_instance`. Called exactly once per created instance.
    fn delete_instance(&self, instance: InstanceHandle);
}
