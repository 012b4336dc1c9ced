//! [`Engine`] over a dynamically bound libgs.
//!
//! Each `init_with_args`/`exit` call points the instance's stdio at the
//! caller's [`EngineOutput`] for the duration of the call and detaches it
//! afterwards, so the engine never holds a pointer past the borrow.

use super::{Engine, EngineOutput, InstanceHandle};
use crate::error::BridgeError;
use crate::version::GsRevision;
use libgs_auto::{Libgs, GS_ARG_ENCODING_UTF8};
use std::ffi::{c_char, c_int, c_void, CString};
use std::path::Path;
use tracing::{debug, warn};

/// The real engine.
#[derive(Debug)]
pub struct LibgsEngine {
    lib: Libgs,
}

impl LibgsEngine {
    /// Bind libgs, at `path` if given, else via the loader's search order.
    pub fn bind(path: Option<&Path>) -> Result<Self, BridgeError> {
        let lib = libgs_auto::bind_libgs(path)?;
        debug!("Bound libgs from {}", lib.path().display());
        Ok(Self { lib })
    }

    pub fn from_libgs(lib: Libgs) -> Self {
        Self { lib }
    }

    /// Where the bound library came from.
    pub fn library_path(&self) -> &Path {
        self.lib.path()
    }

    fn attach_stdio(
        &self,
        instance: InstanceHandle,
        output: &mut EngineOutput,
    ) -> Result<(), BridgeError> {
        let handle = output as *mut EngineOutput as *mut c_void;
        // SAFETY: the instance is live and `handle` outlives the call that
        // follows; `detach_stdio` runs before the borrow ends.
        let code = unsafe {
            self.lib.set_stdio_with_handle(
                instance.as_ptr(),
                Some(stdin_eof),
                Some(stdout_sink),
                Some(stderr_sink),
                handle,
            )
        };
        if code < 0 {
            return Err(BridgeError::InstanceSetup {
                what: "gsapi_set_stdio_with_handle",
                code,
            });
        }
        Ok(())
    }

    fn detach_stdio(&self, instance: InstanceHandle) {
        // SAFETY: NULL handlers restore the engine's default stdio.
        let code = unsafe {
            self.lib.set_stdio_with_handle(
                instance.as_ptr(),
                None,
                None,
                None,
                std::ptr::null_mut(),
            )
        };
        if code < 0 {
            warn!("Failed to detach Ghostscript stdio (code {code})");
        }
    }
}

impl Engine for LibgsEngine {
    fn revision(&self) -> Result<GsRevision, BridgeError> {
        self.lib
            .revision()
            .map(GsRevision::from)
            .map_err(|e| BridgeError::Revision(e.to_string()))
    }

    fn new_instance(&self) -> Result<InstanceHandle, i32> {
        let ptr = self.lib.new_instance(std::ptr::null_mut())?;
        InstanceHandle::new(ptr).ok_or(-1)
    }

    fn init_with_args(
        &self,
        instance: InstanceHandle,
        argv: &[CString],
        output: &mut EngineOutput,
    ) -> Result<i32, BridgeError> {
        // SAFETY: the instance is live.
        let code = unsafe {
            self.lib
                .set_arg_encoding(instance.as_ptr(), GS_ARG_ENCODING_UTF8)
        };
        if code < 0 {
            return Err(BridgeError::InstanceSetup {
                what: "gsapi_set_arg_encoding",
                code,
            });
        }

        self.attach_stdio(instance, output)?;

        // libgs takes `char **` but does not write through it.
        let mut ptrs: Vec<*mut c_char> = argv.iter().map(|a| a.as_ptr() as *mut c_char).collect();
        let argc = ptrs.len() as c_int;
        // SAFETY: every pointer refers to a CString borrowed for this call.
        let code = unsafe {
            self.lib
                .init_with_args(instance.as_ptr(), argc, ptrs.as_mut_ptr())
        };

        self.detach_stdio(instance);
        Ok(code)
    }

    fn exit(&self, instance: InstanceHandle, output: &mut EngineOutput) -> i32 {
        let attached = self.attach_stdio(instance, output).is_ok();
        // SAFETY: the instance is live and was initialised.
        let code = unsafe { self.lib.exit(instance.as_ptr()) };
        if attached {
            self.detach_stdio(instance);
        }
        code
    }

    fn delete_instance(&self, instance: InstanceHandle) {
        // SAFETY: called exactly once per instance by the invoke guard.
        unsafe { self.lib.delete_instance(instance.as_ptr()) }
    }
}

// ── stdio callbacks ──────────────────────────────────────────────────────────

unsafe extern "system" fn stdin_eof(_handle: *mut c_void, _buf: *mut c_char, _len: c_int) -> c_int {
    0
}

unsafe extern "system" fn stdout_sink(handle: *mut c_void, s: *const c_char, len: c_int) -> c_int {
    if let Some((out, bytes)) = sink_args(handle, s, len) {
        out.write_stdout(bytes);
    }
    len.max(0)
}

unsafe extern "system" fn stderr_sink(handle: *mut c_void, s: *const c_char, len: c_int) -> c_int {
    if let Some((out, bytes)) = sink_args(handle, s, len) {
        out.write_stderr(bytes);
    }
    len.max(0)
}

/// # Safety
/// `handle` must be null or the `EngineOutput` registered by `attach_stdio`,
/// and `s` must point to `len` readable bytes.
unsafe fn sink_args<'a>(
    handle: *mut c_void,
    s: *const c_char,
    len: c_int,
) -> Option<(&'a mut EngineOutput, &'a [u8])> {
    if handle.is_null() || s.is_null() || len <= 0 {
        return None;
    }
    let out = &mut *(handle as *mut EngineOutput);
    let bytes = std::slice::from_raw_parts(s as *const u8, len as usize);
    Some((out, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_append_to_registered_output() {
        let mut out = EngineOutput::default();
        let handle = &mut out as *mut EngineOutput as *mut c_void;
        let msg = b"%%BoundingBox: 1 2 3 4\n";
        let n = unsafe { stderr_sink(handle, msg.as_ptr() as *const c_char, msg.len() as c_int) };
        assert_eq!(n as usize, msg.len());
        let n = unsafe { stdout_sink(handle, b"ok".as_ptr() as *const c_char, 2) };
        assert_eq!(n, 2);
        assert_eq!(out.stderr(), "%%BoundingBox: 1 2 3 4\n");
        assert_eq!(out.stdout(), "ok");
    }

    #[test]
    fn sinks_tolerate_null_handle() {
        let n = unsafe { stdout_sink(std::ptr::null_mut(), b"x".as_ptr() as *const c_char, 1) };
        assert_eq!(n, 1);
    }

    #[test]
    fn stdin_reports_eof() {
        let mut buf = [0 as c_char; 8];
        assert_eq!(unsafe { stdin_eof(std::ptr::null_mut(), buf.as_mut_ptr(), 8) }, 0);
    }

    #[test]
    fn binding_a_missing_library_is_unavailable() {
        let err = LibgsEngine::bind(Some(Path::new("/definitely/not/here/libgs.so"))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);
    }
}
