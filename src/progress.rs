//! Progress-callback trait for processing events.
//!
//! Inject an [`Arc<dyn ProcessingProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to observe
//! compression attempts, split assembly, and archive writes as they happen.
//!
//! # Why callbacks instead of channels?
//!
//! Callers can forward events to a terminal progress bar, a metrics sink, or a
//! log line without the library knowing how the host communicates. The trait
//! is `Send + Sync` because split parts are assembled on concurrent blocking
//! threads and archive entries are written from a blocking thread.
//!
//! # Example
//!
//! ```rust
//! use docforge::{ProcessingProgressCallback, ProcessingConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct AttemptCounter {
//!     attempts: AtomicUsize,
//! }
//!
//! impl ProcessingProgressCallback for AttemptCounter {
//!     fn on_compression_attempt(&self, attempt: usize, quality: u8, size_bytes: usize) {
//!         self.attempts.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("attempt {attempt}: q={quality} → {size_bytes} bytes");
//!     }
//! }
//!
//! let counter = Arc::new(AttemptCounter { attempts: AtomicUsize::new(0) });
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(counter as Arc<dyn ProcessingProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the processing pipelines as work advances.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_part_assembled` may be called concurrently from the two assembler
/// threads of a split. Implementations must protect shared mutable state with
/// appropriate synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait ProcessingProgressCallback: Send + Sync {
    /// Called after each encode of the compression search.
    ///
    /// # Arguments
    /// * `attempt`    — 1-based attempt number
    /// * `quality`    — JPEG quality used for this attempt
    /// * `size_bytes` — encoded size
    fn on_compression_attempt(&self, attempt: usize, quality: u8, size_bytes: usize) {
        let _ = (attempt, quality, size_bytes);
    }

    /// Called once the compression search has stopped.
    fn on_compression_complete(&self, final_quality: u8, size_bytes: usize, target_met: bool) {
        let _ = (final_quality, size_bytes, target_met);
    }

    /// Called once a split has been validated, before assembly starts.
    ///
    /// # Arguments
    /// * `total_pages` — pages in the source document
    /// * `split_at`    — last page (1-based) of the first part
    fn on_split_start(&self, total_pages: usize, split_at: usize) {
        let _ = (total_pages, split_at);
    }

    /// Called when one output document has been serialised.
    ///
    /// # Arguments
    /// * `part`       — 1-based part number
    /// * `page_count` — pages in the part
    /// * `size_bytes` — serialised size
    fn on_part_assembled(&self, part: usize, page_count: usize, size_bytes: usize) {
        let _ = (part, page_count, size_bytes);
    }

    /// Called after an archive entry's payload has been written to the zip.
    fn on_entry_written(&self, name: &str, size_bytes: usize) {
        let _ = (name, size_bytes);
    }

    /// Called when the archive has been finalised.
    ///
    /// # Arguments
    /// * `bytes_written` — total bytes handed to the sink
    fn on_archive_complete(&self, bytes_written: u64) {
        let _ = bytes_written;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ProcessingProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ProcessingProgressCallback>;
