//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as [`crate::extract::extract_pages`] works through a document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_index: usize, text_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {} done ({} bytes)", page_index + 1, text_len);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::InterruptedError;
use crate::metering::OcrTokensMetering;
use std::sync::Arc;

/// Called by the extraction driver as it processes each page.
///
/// All methods default to no-ops so callers only override what they care
/// about. Page indices are zero-based.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first page.
    fn on_extraction_start(&self) {}

    /// Called just before a page is handed to the backend.
    fn on_page_start(&self, page_index: usize) {
        let _ = page_index;
    }

    /// Called when a page was recognised.
    ///
    /// # Arguments
    /// * `page_index` — zero-based page index
    /// * `text_len`   — byte length of the page's body text
    fn on_page_complete(&self, page_index: usize, text_len: usize) {
        let _ = (page_index, text_len);
    }

    /// Called when a page failed and the configured policy skipped it.
    fn on_page_error(&self, page_index: Option<usize>, error: &str) {
        let _ = (page_index, error);
    }

    /// Called when the run stopped cleanly on abort or token exhaustion.
    fn on_interrupted(&self, outcome: &InterruptedError) {
        let _ = outcome;
    }

    /// Called once after every page was attempted. Not called when the run
    /// ends on a hard error or stops early through [`Self::on_interrupted`].
    ///
    /// # Arguments
    /// * `success_count` — pages recognised
    /// * `metering`      — total tokens spent
    fn on_extraction_complete(&self, success_count: usize, metering: OcrTokensMetering) {
        let _ = (success_count, metering);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
