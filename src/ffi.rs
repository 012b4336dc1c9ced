//! C ABI for managed-runtime callers (JNI shims, P/Invoke, ctypes).
//!
//! Every entry point returns `bool` (or a nullable pointer) and never
//! unwinds across the boundary. When a call fails, [`gsb_last_error`] on the
//! same thread reports which kind of failure it was:
//!
//! | code | meaning |
//! |---|---|
//! | 0 | no error |
//! | 1 | Ghostscript unavailable |
//! | 2 | engine initialization failed |
//! | 3 | engine execution failed |
//! | 4 | no bounding box in bbox output |
//! | 5 | invalid argument |
//! | 6 | other (I/O, internal, panic) |
//!
//! The process-wide [`Bridge`] is loaded on first use with the default
//! configuration (`GS_LIB_PATH`, then the platform library names). A failed
//! load is not cached; the next call tries again. Call [`gsb_init`] first to
//! pin an explicit library path.

use crate::bridge::Bridge;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ErrorKind};
use std::cell::Cell;
use std::ffi::{c_char, c_int, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// No error recorded on this thread.
pub const GSB_OK: c_int = 0;

static BRIDGE: Mutex<Option<Bridge>> = Mutex::new(None);

thread_local! {
    static LAST_ERROR: Cell<c_int> = const { Cell::new(GSB_OK) };
}

/// Replace the process-wide bridge used by the C entry points.
///
/// Rust hosts embedding the C ABI (and tests) can install a bridge over any
/// engine here instead of letting the first call bind libgs.
pub fn install_bridge(bridge: Bridge) {
    *BRIDGE.lock().unwrap_or_else(PoisonError::into_inner) = Some(bridge);
}

fn shared_bridge() -> Result<Bridge, BridgeError> {
    shared_bridge_or(|| Bridge::load(BridgeConfig::default()))
}

/// The installed bridge, or the result of `load` stored for later calls.
/// A failed load leaves the slot empty so the next call tries again.
fn shared_bridge_or(load: impl FnOnce() -> Result<Bridge, BridgeError>) -> Result<Bridge, BridgeError> {
    let mut slot = BRIDGE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(bridge) = slot.as_ref() {
        return Ok(bridge.clone());
    }
    let bridge = load()?;
    *slot = Some(bridge.clone());
    Ok(bridge)
}

fn set_last_error(code: c_int) {
    LAST_ERROR.with(|c| c.set(code));
}

/// Run `f`, record the outcome for [`gsb_last_error`], and swallow panics.
fn guarded<T>(fallback: T, f: impl FnOnce() -> Result<T, BridgeError>) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => {
            set_last_error(GSB_OK);
            value
        }
        Ok(Err(e)) => {
            warn!("gsbridge call failed: {}", e);
            set_last_error(e.kind() as c_int);
            fallback
        }
        Err(_) => {
            warn!("gsbridge call panicked");
            set_last_error(ErrorKind::Other as c_int);
            fallback
        }
    }
}

/// # Safety
/// `ptr` must be null or a NUL-terminated string valid for `'a`.
unsafe fn arg_str<'a>(ptr: *const c_char, index: usize) -> Result<&'a str, BridgeError> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument {
            index,
            reason: "null pointer".into(),
        });
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|e| BridgeError::InvalidArgument {
            index,
            reason: format!("not valid UTF-8: {e}"),
        })
}

fn arg_dpi(dpi: c_int, index: usize) -> Result<u32, BridgeError> {
    u32::try_from(dpi)
        .ok()
        .filter(|&d| d > 0)
        .ok_or_else(|| BridgeError::InvalidArgument {
            index,
            reason: format!("dpi must be positive, got {dpi}"),
        })
}

/// Bind libgs from `library_path` (or the default search when null) and use
/// it for every later call.
///
/// # Safety
/// `library_path` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn gsb_init(library_path: *const c_char) -> bool {
    guarded(false, || {
        let mut config = BridgeConfig::default();
        if !library_path.is_null() {
            config.library_path = Some(PathBuf::from(arg_str(library_path, 0)?));
        }
        install_bridge(Bridge::load(config)?);
        Ok(true)
    })
}

/// Whether a Ghostscript engine can be loaded.
#[no_mangle]
pub extern "C" fn gsb_is_available() -> bool {
    guarded(false, || shared_bridge().map(|_| true))
}

/// Error kind of the most recent failed call on this thread, or 0.
#[no_mangle]
pub extern "C" fn gsb_last_error() -> c_int {
    LAST_ERROR.with(Cell::get)
}

/// Engine version as `major.minor.patch-build`, or null on failure.
/// Release the string with [`gsb_string_free`].
#[no_mangle]
pub extern "C" fn gsb_get_version() -> *mut c_char {
    guarded(std::ptr::null_mut(), || {
        let version = shared_bridge()?.version()?;
        let c = CString::new(version).map_err(|e| BridgeError::Internal(e.to_string()))?;
        Ok(c.into_raw())
    })
}

/// Free a string returned by this library. Null is ignored.
///
/// # Safety
/// `s` must be null or a pointer returned by [`gsb_get_version`] that has not
/// been freed.
#[no_mangle]
pub unsafe extern "C" fn gsb_string_free(s: *mut c_char) {
    if !s.is_null() {
        drop(CString::from_raw(s));
    }
}

/// # Safety
/// `input` and `output` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn gsb_render_to_png(
    input: *const c_char,
    output: *const c_char,
    dpi: c_int,
) -> bool {
    guarded(false, || {
        let (input, output) = (arg_str(input, 0)?, arg_str(output, 1)?);
        let dpi = arg_dpi(dpi, 2)?;
        shared_bridge()?.render_to_png(input, output, dpi)?;
        Ok(true)
    })
}

/// # Safety
/// `input` and `output` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn gsb_render_to_jpeg(
    input: *const c_char,
    output: *const c_char,
    dpi: c_int,
    quality: c_int,
) -> bool {
    guarded(false, || {
        let (input, output) = (arg_str(input, 0)?, arg_str(output, 1)?);
        let dpi = arg_dpi(dpi, 2)?;
        shared_bridge()?.render_to_jpeg(input, output, dpi, quality)?;
        Ok(true)
    })
}

/// # Safety
/// `input` and `output` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn gsb_convert_to_pdf(input: *const c_char, output: *const c_char) -> bool {
    guarded(false, || {
        let (input, output) = (arg_str(input, 0)?, arg_str(output, 1)?);
        shared_bridge()?.convert_to_pdf(input, output)?;
        Ok(true)
    })
}

/// Run the engine with `argc` caller-supplied arguments, verbatim.
///
/// # Safety
/// `argv` must point to `argc` valid NUL-terminated strings. It may be null
/// when `argc` is 0.
#[no_mangle]
pub unsafe extern "C" fn gsb_execute(argv: *const *const c_char, argc: usize) -> bool {
    guarded(false, || {
        let raw: &[*const c_char] = if argc == 0 {
            &[]
        } else if argv.is_null() {
            return Err(BridgeError::InvalidArgument {
                index: 0,
                reason: "null argv with non-zero argc".into(),
            });
        } else {
            std::slice::from_raw_parts(argv, argc)
        };
        let args = raw
            .iter()
            .enumerate()
            .map(|(i, &p)| arg_str(p, i).map(str::to_owned))
            .collect::<Result<Vec<_>, _>>()?;
        shared_bridge()?.execute(args)?;
        Ok(true)
    })
}

/// Measure `input` and write `[llx, lly, urx, ury]` to `out`.
///
/// `out` is left untouched on failure.
///
/// # Safety
/// `input` must be a valid NUL-terminated string and `out` must point to
/// four writable `int`s.
#[no_mangle]
pub unsafe extern "C" fn gsb_get_bounding_box(input: *const c_char, out: *mut c_int) -> bool {
    guarded(false, || {
        let input = arg_str(input, 0)?;
        if out.is_null() {
            return Err(BridgeError::InvalidArgument {
                index: 1,
                reason: "null output buffer".into(),
            });
        }
        let bb = shared_bridge()?.bounding_box(input)?;
        std::slice::from_raw_parts_mut(out, 4).copy_from_slice(&bb.as_array());
        Ok(true)
    })
}
