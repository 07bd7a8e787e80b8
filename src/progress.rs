//! Progress-callback trait for per-stage and per-page events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages and settles each page.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2html::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, html_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page_num, total_pages, html_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::convert::PipelineStage;
use std::sync::Arc;

/// Called by the pipeline as it advances through stages and pages.
///
/// Page events fire from concurrently polled tasks and may arrive in any
/// page order. Implementations must be `Send + Sync` and protect shared
/// mutable state themselves (`Mutex`, atomics). All methods default to
/// no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after rasterisation, with the number of pages found.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called on every stage transition, including the terminal
    /// [`PipelineStage::Done`] or [`PipelineStage::Failed`].
    fn on_stage_change(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// Called just before the model request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when HTML was recovered for a page.
    ///
    /// * `html_len` — byte length of the extracted HTML
    fn on_page_complete(&self, page_num: usize, total_pages: usize, html_len: usize) {
        let _ = (page_num, total_pages, html_len);
    }

    /// Called when a page's model call failed or its reply held no HTML.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
