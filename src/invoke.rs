//! Scoped engine invocation.
//!
//! One call to [`invoke`] is one Ghostscript instance: created, run, exited
//! and deleted before the function returns. The [`Instance`] guard owns the
//! teardown, so `gsapi_delete_instance` runs exactly once on every path out,
//! early returns and panics included.
//!
//! Ghostscript does not support concurrent instances within one process, so
//! every invocation holds a process-wide lock from instance creation until
//! deletion. Callers on other threads block until the engine is free.

use crate::args::ArgumentVector;
use crate::engine::{is_success, Engine, EngineOutput, InstanceHandle};
use crate::error::BridgeError;
use std::ffi::CString;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

/// `argv[0]` handed to the engine.
pub const PROGRAM_NAME: &str = "gs";

static ENGINE_LOCK: Mutex<()> = Mutex::new(());

/// Run the engine once with `args` and return what it printed.
///
/// Success is status `0` or [`crate::engine::GS_ERROR_QUIT`]. Any other
/// status becomes [`BridgeError::Execution`] carrying the captured stderr.
/// No retry is attempted.
pub fn invoke(engine: &dyn Engine, args: &ArgumentVector) -> Result<EngineOutput, BridgeError> {
    let argv = to_c_argv(args)?;
    debug!("gs argv: {} {}", PROGRAM_NAME, args);

    let _lock = ENGINE_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    let start = Instant::now();

    let mut instance = Instance::create(engine)?;
    let init_code = instance.run(&argv)?;
    let (exit_code, output) = instance.finish();

    // Same rule as Ghostscript's own example client: a clean run still fails
    // if gsapi_exit reports an error (e.g. the output device failed to flush).
    let code = if is_success(init_code) {
        exit_code
    } else {
        init_code
    };

    debug!(
        "gs finished: init={} exit={} in {}ms",
        init_code,
        exit_code,
        start.elapsed().as_millis()
    );

    if is_success(code) {
        Ok(output)
    } else {
        let stderr = output.stderr().into_owned();
        if !stderr.is_empty() {
            debug!("gs stderr:\n{}", stderr);
        }
        Err(BridgeError::Execution { code, stderr })
    }
}

/// Prepend the program name and convert to C strings.
fn to_c_argv(args: &ArgumentVector) -> Result<Vec<CString>, BridgeError> {
    std::iter::once(PROGRAM_NAME)
        .chain(args.iter().map(String::as_str))
        .enumerate()
        .map(|(i, a)| {
            CString::new(a).map_err(|_| BridgeError::InvalidArgument {
                // Index into the caller's vector, not the prefixed argv.
                index: i.saturating_sub(1),
                reason: format!("contains a NUL byte: {a:?}"),
            })
        })
        .collect()
}

/// A live engine instance. Dropping it exits (if initialised) and deletes.
struct Instance<'e> {
    engine: &'e dyn Engine,
    handle: InstanceHandle,
    initialised: bool,
    torn_down: bool,
    exit_code: i32,
    output: EngineOutput,
}

impl<'e> Instance<'e> {
    fn create(engine: &'e dyn Engine) -> Result<Self, BridgeError> {
        let handle = engine.new_instance().map_err(|code| {
            warn!("gsapi_new_instance failed with {}", code);
            BridgeError::InstanceCreation { code }
        })?;
        Ok(Self {
            engine,
            handle,
            initialised: false,
            torn_down: false,
            exit_code: 0,
            output: EngineOutput::default(),
        })
    }

    fn run(&mut self, argv: &[CString]) -> Result<i32, BridgeError> {
        let code = self
            .engine
            .init_with_args(self.handle, argv, &mut self.output)?;
        self.initialised = true;
        Ok(code)
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if self.initialised {
            self.exit_code = self.engine.exit(self.handle, &mut self.output);
        }
        self.engine.delete_instance(self.handle);
    }

    /// Tear down now and hand back `(exit_code, output)`.
    fn finish(mut self) -> (i32, EngineOutput) {
        self.teardown();
        (self.exit_code, std::mem::take(&mut self.output))
    }
}

impl Drop for Instance<'_> {
    fn drop(&mut self) {
        self.teardown();
    }
}
