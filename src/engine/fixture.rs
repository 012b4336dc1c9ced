//! A scripted [`Engine`] for tests and for hosts without Ghostscript.
//!
//! ```rust
//! use gsbridge::engine::{FixtureEngine, GS_ERROR_QUIT};
//! use gsbridge::{Bridge, BridgeConfig};
//! use std::sync::Arc;
//!
//! let engine = Arc::new(FixtureEngine::new().with_init_status(GS_ERROR_QUIT));
//! let bridge = Bridge::with_engine(engine.clone(), BridgeConfig::default());
//! bridge.render_to_png("a.eps", "a.png", 150).unwrap();
//! assert_eq!(engine.delete_calls(), 1);
//! ```

use super::{Engine, EngineOutput, InstanceHandle};
use crate::error::BridgeError;
use crate::version::GsRevision;
use std::ffi::CString;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted engine. Every lifecycle call is counted and every argv recorded.
#[derive(Debug)]
pub struct FixtureEngine {
    revision: Option<GsRevision>,
    new_instance_error: Option<i32>,
    setup_error: Option<i32>,
    init_status: i32,
    exit_status: i32,
    stdout: String,
    stderr: String,
    output_file: Option<Vec<u8>>,

    new_instance_calls: AtomicUsize,
    init_calls: AtomicUsize,
    exit_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    argv_log: Mutex<Vec<Vec<String>>>,
}

impl Default for FixtureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureEngine {
    /// An engine that succeeds with status 0 and reports 10.02.1.
    pub fn new() -> Self {
        Self {
            revision: Some(GsRevision {
                product: "GPL Ghostscript (fixture)".into(),
                copyright: "Copyright (C) Artifex Software, Inc.".into(),
                revision: 10021,
                revision_date: 20230913,
            }),
            new_instance_error: None,
            setup_error: None,
            init_status: 0,
            exit_status: 0,
            stdout: String::new(),
            stderr: String::new(),
            output_file: None,
            new_instance_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            exit_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            argv_log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_revision(mut self, revision: GsRevision) -> Self {
        self.revision = Some(revision);
        self
    }

    /// Make `revision()` fail.
    pub fn without_revision(mut self) -> Self {
        self.revision = None;
        self
    }

    /// Make `new_instance()` fail with `code`.
    pub fn failing_new_instance(mut self, code: i32) -> Self {
        self.new_instance_error = Some(code);
        self
    }

    /// Make instance configuration fail before the interpreter starts.
    pub fn failing_setup(mut self, code: i32) -> Self {
        self.setup_error = Some(code);
        self
    }

    /// Status returned by `init_with_args`.
    pub fn with_init_status(mut self, code: i32) -> Self {
        self.init_status = code;
        self
    }

    /// Status returned by `exit`.
    pub fn with_exit_status(mut self, code: i32) -> Self {
        self.exit_status = code;
        self
    }

    /// Text written to stdout during `init_with_args`.
    pub fn with_stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout = text.into();
        self
    }

    /// Text written to stderr during `init_with_args`.
    pub fn with_stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = text.into();
        self
    }

    /// Write `bytes` to the `-o<path>` target, as a device would.
    pub fn with_output_file(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.output_file = Some(bytes.into());
        self
    }

    pub fn new_instance_calls(&self) -> usize {
        self.new_instance_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn exit_calls(&self) -> usize {
        self.exit_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Every argv passed to `init_with_args`, program name included.
    pub fn argv_log(&self) -> Vec<Vec<String>> {
        self.argv_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn last_argv(&self) -> Option<Vec<String>> {
        self.argv_log().pop()
    }
}

impl Engine for FixtureEngine {
    fn revision(&self) -> Result<GsRevision, BridgeError> {
        self.revision
            .clone()
            .ok_or_else(|| BridgeError::Revision("fixture has no revision".into()))
    }

    fn new_instance(&self) -> Result<InstanceHandle, i32> {
        self.new_instance_calls.fetch_add(1, Ordering::SeqCst);
        match self.new_instance_error {
            Some(code) => Err(code),
            None => Ok(InstanceHandle(NonNull::dangling())),
        }
    }

    fn init_with_args(
        &self,
        _instance: InstanceHandle,
        argv: &[CString],
        output: &mut EngineOutput,
    ) -> Result<i32, BridgeError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.setup_error {
            return Err(BridgeError::InstanceSetup {
                what: "gsapi_set_arg_encoding",
                code,
            });
        }
        let argv: Vec<String> = argv
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        if let Some(bytes) = &self.output_file {
            if let Some(path) = argv.iter().find_map(|a| a.strip_prefix("-o")) {
                std::fs::write(path, bytes).map_err(|e| BridgeError::Internal(e.to_string()))?;
            }
        }
        self.argv_log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(argv);
        output.write_stdout(self.stdout.as_bytes());
        output.write_stderr(self.stderr.as_bytes());
        Ok(self.init_status)
    }

    fn exit(&self, _instance: InstanceHandle, _output: &mut EngineOutput) -> i32 {
        self.exit_calls.fetch_add(1, Ordering::SeqCst);
        self.exit_status
    }

    fn delete_instance(&self, _instance: InstanceHandle) {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
    }
}
