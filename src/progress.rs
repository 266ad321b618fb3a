//! Progress tracking and the callback trait it publishes to.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConverterConfigBuilder::progress_callback`] to receive
//! events as a run processes each file.
//!
//! # Publication rules
//!
//! * Per-file runs publish `completed / total * 100` after every file.
//! * Batch runs publish exactly once, `100`, when the response arrives.
//! * Within one run the published value never decreases and the last value
//!   of a completed run is exactly `100`.
//!
//! # Example
//!
//! ```rust
//! use fileconv::{ConversionProgressCallback, ConverterConfig};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Recorder(Mutex<Vec<f64>>);
//!
//! impl ConversionProgressCallback for Recorder {
//!     fn on_progress(&self, percent: f64) {
//!         self.0.lock().unwrap().push(percent);
//!     }
//! }
//!
//! let config = ConverterConfig::builder()
//!     .progress_callback(Arc::new(Recorder::default()))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ConversionResult;
use crate::request::RunMode;
use std::sync::Arc;

/// Called by a run as it processes files.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first file is dispatched.
    fn on_run_start(&self, total_files: usize, mode: RunMode) {
        let _ = (total_files, mode);
    }

    /// Called just before a file is converted (per-file runs only).
    ///
    /// # Arguments
    /// * `index`: 1-indexed position in the selection
    fn on_file_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called for every recorded result, in record order.
    fn on_file_complete(&self, index: usize, total: usize, result: &ConversionResult) {
        let _ = (index, total, result);
    }

    /// Called with the new completion percentage (0.0–100.0).
    fn on_progress(&self, percent: f64) {
        let _ = percent;
    }

    /// Called once after a run finished without a run-level failure.
    fn on_run_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }

    /// Called once when a run aborts.
    fn on_run_failed(&self, error: &str) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConverterConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Maps completion counts to a percentage and publishes it.
pub struct ProgressTracker {
    callback: ProgressCallback,
    percent: f64,
}

impl ProgressTracker {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback,
            percent: 0.0,
        }
    }

    pub fn callback(&self) -> &ProgressCallback {
        &self.callback
    }

    /// Last published value.
    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Reset for a new run. Does not publish a value.
    pub fn start(&mut self, total: usize, mode: RunMode) {
        self.percent = 0.0;
        self.callback.on_run_start(total, mode);
    }

    /// A sequential unit finished: publish `completed / total * 100`.
    pub fn on_unit_complete(&mut self, completed: usize, total: usize) {
        let percent = if total == 0 || completed >= total {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        self.publish(percent);
    }

    /// A batch finished: publish `100` once.
    pub fn on_batch_complete(&mut self) {
        self.publish(100.0);
    }

    fn publish(&mut self, percent: f64) {
        self.percent = self.percent.max(percent);
        self.callback.on_progress(self.percent);
    }
}
