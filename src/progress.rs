//! Progress-callback trait for fusion job events.
//!
//! Inject an [`Arc<dyn FusionProgressCallback>`] via
//! [`crate::config::FusionConfigBuilder::progress_callback`] to receive
//! events as the job reads documents, waits for the model, and rebuilds the
//! output.
//!
//! # Example
//!
//! ```rust
//! use docfuse::{FusionConfig, FusionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     loaded: AtomicUsize,
//! }
//!
//! impl FusionProgressCallback for CountingCallback {
//!     fn on_document_loaded(&self, index: usize, total: usize, name: &str, chars: usize) {
//!         self.loaded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("[{}/{}] {} ({} chars)", index, total, name, chars);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { loaded: AtomicUsize::new(0) });
//!
//! let config = FusionConfig::builder()
//!     .progress_callback(counter as Arc<dyn FusionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the job driver as it moves through the pipeline.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The job is sequential, so events arrive in order.
pub trait FusionProgressCallback: Send + Sync {
    /// Called once after inputs are validated.
    ///
    /// # Arguments
    /// * `total_documents`: number of documents that will be read
    fn on_job_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called after a document has been read and linearized.
    ///
    /// # Arguments
    /// * `index`: 1-indexed document position
    /// * `total`: total documents
    /// * `name`: file name shown in the prompt
    /// * `chars`: character count of the linearized text
    fn on_document_loaded(&self, index: usize, total: usize, name: &str, chars: usize) {
        let _ = (index, total, name, chars);
    }

    /// Called just before the completion request is sent.
    fn on_completion_start(&self, prompt_chars: usize) {
        let _ = prompt_chars;
    }

    /// Called when the completion returned non-empty content.
    fn on_completion_done(&self, response_chars: usize, duration_ms: u64) {
        let _ = (response_chars, duration_ms);
    }

    /// Called for every response block the builder had to skip.
    fn on_block_skipped(&self, index: usize, reason: &str) {
        let _ = (index, reason);
    }

    /// Called once the output file has been written.
    fn on_job_complete(&self, units: usize, skipped_blocks: usize) {
        let _ = (units, skipped_blocks);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl FusionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::FusionConfig`].
pub type ProgressCallback = Arc<dyn FusionProgressCallback>;
