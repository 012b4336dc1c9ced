//! # libgs-auto
//!
//! Locate and dynamically bind the [Ghostscript](https://www.ghostscript.com/)
//! shared library (`libgs`), so that callers never link against it at build
//! time. A missing library is an ordinary runtime error rather than a
//! link failure.
//!
//! ## How it works
//!
//! On each call to [`bind_libgs`]:
//!
//! 1. Builds the ordered candidate list (see [`candidate_paths`]).
//! 2. Tries to `dlopen` each candidate and resolve every `gsapi_*` symbol the
//!    bridge needs.
//! 3. Returns the first candidate that binds completely; the winning path is
//!    remembered for the rest of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use libgs_auto::bind_libgs;
//!
//! let gs = bind_libgs(None).expect("libgs unavailable");
//! let rev = gs.revision().expect("revision query failed");
//! println!("Ghostscript revision {}", rev.revision);
//! ```
//!
//! ## Environment variable overrides
//!
//! - `GS_LIB_PATH`: path to an existing libgs; tried before platform names.
//! - `LIBGS_AUTO_CACHE_DIR`: override the cache directory used by the
//!   `bundled` feature.

use std::ffi::{c_char, c_int, c_long, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use libloading::Library;
use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit libgs path.
pub const GS_LIB_PATH_ENV: &str = "GS_LIB_PATH";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "LIBGS_AUTO_CACHE_DIR";

/// `GS_ARG_ENCODING_UTF8` from `iapi.h`.
pub const GS_ARG_ENCODING_UTF8: c_int = 1;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by libgs-auto operations.
#[derive(Error, Debug)]
pub enum LibgsAutoError {
    /// No candidate could be loaded.
    #[error("Ghostscript library not found (tried: {})", .tried.join(", "))]
    NotFound { tried: Vec<String> },

    /// `dlopen` failed for a specific path.
    #[error("Failed to load libgs from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },

    /// The library loaded but lacks a required `gsapi_*` entry point.
    #[error("libgs at '{path}' has no symbol '{symbol}': {reason}")]
    MissingSymbol {
        path: PathBuf,
        symbol: &'static str,
        reason: String,
    },

    /// Could not create or write the local cache directory.
    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    /// `gsapi_revision` reported a structure-size mismatch.
    #[error("gsapi_revision failed with code {0}")]
    Revision(c_int),
}

// ── Raw ABI ──────────────────────────────────────────────────────────────────

/// `gsapi_revision_t` from `iapi.h`.
#[repr(C)]
#[derive(Debug)]
pub struct RawRevision {
    pub product: *const c_char,
    pub copyright: *const c_char,
    pub revision: c_long,
    pub revisiondate: c_long,
}

/// Revision metadata copied out of the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibgsRevision {
    pub product: String,
    pub copyright: String,
    pub revision: i64,
    pub revision_date: i64,
}

/// stdin callback: `(caller_handle, buf, len) -> bytes read`.
pub type StdinFn = unsafe extern "system" fn(*mut c_void, *mut c_char, c_int) -> c_int;
/// stdout / stderr callback: `(caller_handle, str, len) -> bytes consumed`.
pub type StdoutFn = unsafe extern "system" fn(*mut c_void, *const c_char, c_int) -> c_int;

type RevisionFn = unsafe extern "system" fn(*mut RawRevision, c_int) -> c_int;
type NewInstanceFn = unsafe extern "system" fn(*mut *mut c_void, *mut c_void) -> c_int;
type DeleteInstanceFn = unsafe extern "system" fn(*mut c_void);
type SetArgEncodingFn = unsafe extern "system" fn(*mut c_void, c_int) -> c_int;
type SetStdioWithHandleFn = unsafe extern "system" fn(
    *mut c_void,
    Option<StdinFn>,
    Option<StdoutFn>,
    Option<StdoutFn>,
    *mut c_void,
) -> c_int;
type InitWithArgsFn = unsafe extern "system" fn(*mut c_void, c_int, *mut *mut c_char) -> c_int;
type ExitFn = unsafe extern "system" fn(*mut c_void) -> c_int;

/// A bound libgs: the loaded library plus its resolved entry points.
///
/// The function pointers stay valid for as long as `_lib` is alive, which is
/// exactly the lifetime of this struct.
pub struct Libgs {
    path: PathBuf,
    revision: RevisionFn,
    new_instance: NewInstanceFn,
    delete_instance: DeleteInstanceFn,
    set_arg_encoding: SetArgEncodingFn,
    set_stdio_with_handle: SetStdioWithHandleFn,
    init_with_args: InitWithArgsFn,
    exit: ExitFn,
    _lib: Library,
}

impl std::fmt::Debug for Libgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libgs").field("path", &self.path).finish()
    }
}

impl Libgs {
    /// Path (or bare library name) this binding was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Query the library's revision metadata.
    pub fn revision(&self) -> Result<LibgsRevision, LibgsAutoError> {
        let mut raw = RawRevision {
            product: std::ptr::null(),
            copyright: std::ptr::null(),
            revision: 0,
            revisiondate: 0,
        };
        // SAFETY: `raw` is a valid, writable gsapi_revision_t of the size passed.
        let code = unsafe {
            (self.revision)(&mut raw, std::mem::size_of::<RawRevision>() as c_int)
        };
        if code != 0 {
            return Err(LibgsAutoError::Revision(code));
        }
        Ok(LibgsRevision {
            product: c_str_lossy(raw.product),
            copyright: c_str_lossy(raw.copyright),
            revision: raw.revision as i64,
            revision_date: raw.revisiondate as i64,
        })
    }

    /// `gsapi_new_instance`. Returns the instance pointer or the error code.
    pub fn new_instance(&self, caller_handle: *mut c_void) -> Result<*mut c_void, c_int> {
        let mut instance: *mut c_void = std::ptr::null_mut();
        // SAFETY: `instance` is a valid out-pointer; libgs does not retain it.
        let code = unsafe { (self.new_instance)(&mut instance, caller_handle) };
        if code < 0 || instance.is_null() {
            Err(if code < 0 { code } else { -1 })
        } else {
            Ok(instance)
        }
    }

    /// `gsapi_delete_instance`.
    ///
    /// # Safety
    /// `instance` must come from [`Libgs::new_instance`] on this binding and
    /// must not be used afterwards.
    pub unsafe fn delete_instance(&self, instance: *mut c_void) {
        (self.delete_instance)(instance)
    }

    /// `gsapi_set_arg_encoding`.
    ///
    /// # Safety
    /// `instance` must be a live instance from this binding.
    pub unsafe fn set_arg_encoding(&self, instance: *mut c_void, encoding: c_int) -> c_int {
        (self.set_arg_encoding)(instance, encoding)
    }

    /// `gsapi_set_stdio_with_handle`.
    ///
    /// # Safety
    /// `instance` must be live, and `caller_handle` must stay valid for every
    /// callback invocation until the handlers are replaced.
    pub unsafe fn set_stdio_with_handle(
        &self,
        instance: *mut c_void,
        stdin_fn: Option<StdinFn>,
        stdout_fn: Option<StdoutFn>,
        stderr_fn: Option<StdoutFn>,
        caller_handle: *mut c_void,
    ) -> c_int {
        (self.set_stdio_with_handle)(instance, stdin_fn, stdout_fn, stderr_fn, caller_handle)
    }

    /// `gsapi_init_with_args`.
    ///
    /// # Safety
    /// `instance` must be live and `argv` must hold `argc` valid
    /// NUL-terminated strings for the duration of the call.
    pub unsafe fn init_with_args(
        &self,
        instance: *mut c_void,
        argc: c_int,
        argv: *mut *mut c_char,
    ) -> c_int {
        (self.init_with_args)(instance, argc, argv)
    }

    /// `gsapi_exit`.
    ///
    /// # Safety
    /// `instance` must be a live instance from this binding.
    pub unsafe fn exit(&self, instance: *mut c_void) -> c_int {
        (self.exit)(instance)
    }
}

fn c_str_lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: libgs returns static NUL-terminated strings for revision fields.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

// ── Platform library names ───────────────────────────────────────────────────

/// Library names handed to the OS loader when no explicit path is known.
pub fn default_library_names() -> &'static [&'static str] {
    match std::env::consts::OS {
        "macos" => &["libgs.10.dylib", "libgs.dylib", "libgs.9.dylib"],
        "windows" => &["gsdll64.dll", "gsdll32.dll"],
        _ => &["libgs.so.10", "libgs.so.9", "libgs.so"],
    }
}

/// File name used for the bundled copy inside the cache directory.
fn bundled_file_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "libgs.dylib",
        "windows" => "gsdll.dll",
        _ => "libgs.so",
    }
}

// ── Cache directory resolution ───────────────────────────────────────────────

/// Returns the cache directory for an extracted bundled libgs.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/gsbridge/libgs/`
/// - **Linux**: `~/.cache/gsbridge/libgs/`
/// - **Windows**: `%LOCALAPPDATA%\gsbridge\libgs\`
///
/// Override by setting `LIBGS_AUTO_CACHE_DIR`.
pub fn libgs_cache_dir() -> PathBuf {
    if let Ok(override_dir) = std::env::var(CACHE_DIR_ENV) {
        return PathBuf::from(override_dir).join("libgs");
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("gsbridge").join("libgs")
}

// ── Bundled library ──────────────────────────────────────────────────────────

#[cfg(feature = "bundled")]
mod bundled {
    include!(concat!(env!("OUT_DIR"), "/bundled.rs"));
}

/// Writes the embedded libgs into the cache directory if it is not already
/// there, and returns its path.
#[cfg(feature = "bundled")]
pub fn ensure_libgs_bundled() -> Result<PathBuf, LibgsAutoError> {
    let dir = libgs_cache_dir();
    let path = dir.join(bundled_file_name());
    let up_to_date = std::fs::metadata(&path)
        .map(|m| m.len() == bundled::LIBGS_BYTES.len() as u64)
        .unwrap_or(false);
    if !up_to_date {
        std::fs::create_dir_all(&dir).map_err(LibgsAutoError::CacheDir)?;
        let tmp = dir.join(format!("{}.partial", bundled_file_name()));
        std::fs::write(&tmp, bundled::LIBGS_BYTES).map_err(LibgsAutoError::CacheDir)?;
        std::fs::rename(&tmp, &path).map_err(LibgsAutoError::CacheDir)?;
    }
    Ok(path)
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Ordered list of libgs candidates.
///
/// 1. `explicit`, when given.
/// 2. `GS_LIB_PATH`, when it names an existing file.
/// 3. The path that bound successfully earlier in this process.
/// 4. The bundled copy in the cache directory, if present on disk.
/// 5. [`default_library_names`], resolved by the OS loader.
pub fn candidate_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut push = |p: PathBuf| {
        if !out.contains(&p) {
            out.push(p);
        }
    };

    if let Some(p) = explicit {
        push(p.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(GS_LIB_PATH_ENV) {
        let p = PathBuf::from(env_path);
        if p.exists() {
            push(p);
        }
    }
    if let Some(p) = RESOLVED_PATH.get() {
        push(p.clone());
    }
    let cached = libgs_cache_dir().join(bundled_file_name());
    if cached.exists() {
        push(cached);
    }
    for name in default_library_names() {
        push(PathBuf::from(name));
    }
    out
}

/// Binds to libgs, trying every candidate in order.
///
/// With the `bundled` feature the embedded copy is extracted first so it is
/// available as a candidate.
pub fn bind_libgs(explicit: Option<&Path>) -> Result<Libgs, LibgsAutoError> {
    #[cfg(feature = "bundled")]
    ensure_libgs_bundled()?;

    // An explicit path is authoritative: do not silently fall back.
    if let Some(path) = explicit {
        return bind_libgs_from_path(path);
    }

    let mut tried = Vec::new();
    for candidate in candidate_paths(None) {
        match bind_libgs_from_path(&candidate) {
            Ok(lib) => {
                let _ = RESOLVED_PATH.set(candidate);
                return Ok(lib);
            }
            Err(e) => tried.push(format!("{} ({e})", candidate.display())),
        }
    }
    Err(LibgsAutoError::NotFound { tried })
}

/// Binds to a libgs at an explicit `path` (or bare library name).
pub fn bind_libgs_from_path(path: &Path) -> Result<Libgs, LibgsAutoError> {
    // SAFETY: loading libgs runs its static initialisers, which have no
    // preconditions beyond a conforming platform loader.
    let lib = unsafe { Library::new(path) }.map_err(|e| LibgsAutoError::Bind {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    macro_rules! sym {
        ($name:literal, $ty:ty) => {{
            // SAFETY: the type matches the prototype declared in iapi.h.
            let s: libloading::Symbol<'_, $ty> =
                unsafe { lib.get(concat!($name, "\0").as_bytes()) }.map_err(|e| {
                    LibgsAutoError::MissingSymbol {
                        path: path.to_path_buf(),
                        symbol: $name,
                        reason: e.to_string(),
                    }
                })?;
            *s
        }};
    }

    let revision = sym!("gsapi_revision", RevisionFn);
    let new_instance = sym!("gsapi_new_instance", NewInstanceFn);
    let delete_instance = sym!("gsapi_delete_instance", DeleteInstanceFn);
    let set_arg_encoding = sym!("gsapi_set_arg_encoding", SetArgEncodingFn);
    let set_stdio_with_handle = sym!("gsapi_set_stdio_with_handle", SetStdioWithHandleFn);
    let init_with_args = sym!("gsapi_init_with_args", InitWithArgsFn);
    let exit = sym!("gsapi_exit", ExitFn);

    Ok(Libgs {
        path: path.to_path_buf(),
        revision,
        new_instance,
        delete_instance,
        set_arg_encoding,
        set_stdio_with_handle,
        init_with_args,
        exit,
        _lib: lib,
    })
}

/// Returns `true` if some candidate binds successfully.
pub fn is_libgs_available() -> bool {
    bind_libgs(None).is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that read or write process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_names_nonempty() {
        let names = default_library_names();
        assert!(!names.is_empty());
        assert!(names.iter().all(|n| n.contains("gs")));
    }

    #[test]
    fn cache_dir_is_deterministic() {
        let _env = ENV_LOCK.lock().unwrap();
        let d1 = libgs_cache_dir();
        let d2 = libgs_cache_dir();
        assert_eq!(d1, d2);
        assert!(d1.ends_with("libgs"));
    }

    #[test]
    fn cache_dir_override_via_env() {
        let _env = ENV_LOCK.lock().unwrap();
        std::env::set_var(CACHE_DIR_ENV, "/tmp/test_libgs_override");
        let d = libgs_cache_dir();
        std::env::remove_var(CACHE_DIR_ENV);
        assert!(d.starts_with("/tmp/test_libgs_override"));
    }

    #[test]
    fn explicit_path_comes_first() {
        let _env = ENV_LOCK.lock().unwrap();
        let explicit = Path::new("/opt/custom/libgs.so");
        let candidates = candidate_paths(Some(explicit));
        assert_eq!(candidates[0], explicit);
        // Platform names are always present as the final fallbacks.
        for name in default_library_names() {
            assert!(candidates.contains(&PathBuf::from(name)));
        }
    }

    #[test]
    fn env_path_is_used_only_when_it_exists() {
        let _env = ENV_LOCK.lock().unwrap();
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::env::set_var(GS_LIB_PATH_ENV, tmp.path());
        let with_file = candidate_paths(None);
        std::env::set_var(GS_LIB_PATH_ENV, "/definitely/not/here/libgs.so");
        let without_file = candidate_paths(None);
        std::env::remove_var(GS_LIB_PATH_ENV);

        assert_eq!(with_file[0], tmp.path());
        assert!(!without_file
            .iter()
            .any(|p| p == Path::new("/definitely/not/here/libgs.so")));
    }

    #[test]
    fn binding_missing_file_is_bind_error() {
        let err = bind_libgs_from_path(Path::new("/definitely/not/here/libgs.so")).unwrap_err();
        match err {
            LibgsAutoError::Bind { path, .. } => {
                assert_eq!(path, Path::new("/definitely/not/here/libgs.so"))
            }
            other => panic!("expected Bind, got {other:?}"),
        }
    }

    #[test]
    fn explicit_path_does_not_fall_back() {
        let err = bind_libgs(Some(Path::new("/definitely/not/here/libgs.so"))).unwrap_err();
        assert!(matches!(err, LibgsAutoError::Bind { .. }));
    }

    #[test]
    fn not_found_lists_every_candidate() {
        let e = LibgsAutoError::NotFound {
            tried: vec!["a".into(), "b".into()],
        };
        assert_eq!(e.to_string(), "Ghostscript library not found (tried: a, b)");
    }

    #[cfg(feature = "bundled")]
    #[test]
    fn bundled_bytes_extract_into_cache_dir() {
        let _env = ENV_LOCK.lock().unwrap();
        let cache = tempfile::tempdir().unwrap();
        std::env::set_var(CACHE_DIR_ENV, cache.path());

        let path = ensure_libgs_bundled().unwrap();
        assert!(path.starts_with(cache.path()));
        assert_eq!(std::fs::read(&path).unwrap(), bundled::LIBGS_BYTES);
        assert!(candidate_paths(None).contains(&path));

        // Second call reuses the extracted copy.
        assert_eq!(ensure_libgs_bundled().unwrap(), path);
        let partial = path.with_file_name(format!("{}.partial", bundled_file_name()));
        assert!(!partial.exists());

        std::env::remove_var(CACHE_DIR_ENV);
    }
}
