//! Error types for the edgequake-pdf2html library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Pdf2HtmlError`] — **Fatal**: the run cannot proceed at all (missing
//!   API key, bad input file, zero pages rasterised, output directory not
//!   writable). Returned as `Err(Pdf2HtmlError)` from [`crate::convert`]
//!   and aborts every remaining stage.
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (model call timed
//!   out, reply contained no HTML, Chromium could not print it) but every
//!   other page is fine. Stored inside [`crate::output::PageRecord`] and
//!   written to that page's manifest entry, so no page ever disappears
//!   from the output silently.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2html library.
#[derive(Debug, Error)]
pub enum Pdf2HtmlError {
    // ── Configuration errors ─────────────────────────────────────────────
    /// No API key was supplied, or the supplied one is a template placeholder.
    #[error("Model API key not found.\nSet CLAUDE_API_KEY or pass --api-key.")]
    MissingApiKey,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The side-data file could not be read.
    #[error("Failed to read side-data file '{path}': {source}")]
    SideDataUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Rasterisation errors ──────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// The rasteriser finished without producing a single page image.
    #[error("No pages were rasterised from '{path}'")]
    NoPages { path: PathBuf },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// An output directory could not be created.
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a manifest, HTML or PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A manifest could not be serialised or read back.
    #[error("Invalid manifest '{path}': {detail}")]
    ManifestInvalid { path: PathBuf, detail: String },

    /// `reextract` found nothing to work on.
    #[error("No page manifests found in '{path}'\nRun a conversion into this directory first.")]
    NoManifests { path: PathBuf },

    // ── Rendering / merging errors ────────────────────────────────────────
    /// Headless Chromium could not be started.
    #[error("Failed to launch browser: {0}")]
    BrowserLaunch(String),

    /// The single-page PDFs could not be combined.
    #[error("Failed to merge PDFs: {0}")]
    MergeFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Transport failures (`ModelCallFailed`, `Timeout`, `ImageUnreadable`) are
/// kept distinct from `NoHtml`, where the model answered but nothing usable
/// could be recovered from its reply.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The screenshot for this page could not be read or encoded.
    #[error("Page {page}: screenshot unreadable: {detail}")]
    ImageUnreadable { page: usize, detail: String },

    /// The model call failed (network, non-2xx status, undecodable body).
    #[error("Page {page}: model call failed: {detail}")]
    ModelCallFailed { page: usize, detail: String },

    /// The model call did not finish within the configured timeout.
    #[error("Page {page}: model call timed out after {ms}ms")]
    Timeout { page: usize, ms: u64 },

    /// The call succeeded but no HTML could be recovered from the reply.
    #[error("Page {page}: no HTML recoverable from model reply")]
    NoHtml { page: usize },

    /// Converting the page HTML back to PDF failed.
    #[error("Page {page}: HTML to PDF rendering failed: {detail}")]
    RenderFailed { page: usize, detail: String },
}

impl PageError {
    /// 1-based ordinal of the page this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ImageUnreadable { page, .. }
            | PageError::ModelCallFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::NoHtml { page }
            | PageError::RenderFailed { page, .. } => *page,
        }
    }
}
