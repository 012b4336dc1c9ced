//! Progress-callback trait for batch export events.
//!
//! Pass an [`Arc<dyn BatchProgressCallback>`] to
//! [`crate::export::batch_export`] to hear about each file as it is
//! converted. The CLI drives an `indicatif` bar from it; a GUI host can
//! forward the events to its own channel.
//!
//! # Example
//!
//! ```rust
//! use gsbridge::BatchProgressCallback;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, output: &std::path::Path) {
//!         let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{}/{} -> {}", done, total, output.display());
//!         let _ = index;
//!     }
//! }
//!
//! let cb: Arc<dyn BatchProgressCallback> = Arc::new(CountingCallback {
//!     done: AtomicUsize::new(0),
//! });
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by [`crate::export::batch_export`] as it works through its inputs.
///
/// Files are exported one at a time, so calls never overlap, but they may
/// arrive on different threads. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called just before a file is handed to the engine.
    ///
    /// # Arguments
    /// * `index`: 1-based position in the batch
    /// * `total`: number of files in the batch
    /// * `input`: the file about to be converted
    fn on_file_start(&self, index: usize, total: usize, input: &Path) {
        let _ = (index, total, input);
    }

    /// Called when a file has been written to `output`.
    fn on_file_complete(&self, index: usize, total: usize, output: &Path) {
        let _ = (index, total, output);
    }

    /// Called when a file fails. The batch continues.
    fn on_file_error(&self, index: usize, total: usize, input: &Path, error: &str) {
        let _ = (index, total, input, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// Ignores every event.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// The shape `batch_export` accepts.
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        total: AtomicUsize,
    }

    impl BatchProgressCallback for Tracking {
        fn on_batch_start(&self, total: usize) {
            self.total.store(total, Ordering::SeqCst);
        }

        fn on_file_start(&self, _index: usize, _total: usize, _input: &Path) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _index: usize, _total: usize, _output: &Path) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_error(&self, _index: usize, _total: usize, _input: &Path, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(2);
        cb.on_file_start(1, 2, Path::new("a.eps"));
        cb.on_file_complete(1, 2, Path::new("a.png"));
        cb.on_file_error(2, 2, Path::new("b.eps"), "status -100");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn overridden_methods_receive_events() {
        let t = Tracking::default();
        t.on_batch_start(3);
        for i in 1..=3 {
            t.on_file_start(i, 3, Path::new("x.eps"));
        }
        t.on_file_complete(1, 3, Path::new("x.png"));
        t.on_file_error(2, 3, Path::new("y.eps"), "boom");
        t.on_batch_complete(3, 1);

        assert_eq!(t.total.load(Ordering::SeqCst), 3);
        assert_eq!(t.starts.load(Ordering::SeqCst), 3);
        assert_eq!(t.completes.load(Ordering::SeqCst), 1);
        assert_eq!(t.errors.load(Ordering::SeqCst), 1);
    }
}
