//! Pipeline stages for PDF-to-HTML recreation.
//!
//! Each submodule implements exactly one step. The external engines
//! (pdfium, the model endpoint, Chromium) sit behind traits so the
//! orchestrator in [`crate::convert`] can run against in-process fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ rasterize ──▶ encode ──▶ client ──▶ extract ──▶ persist ──▶ html_render ──▶ merge
//! (checks)   (pdfium)     (base64)   (VLM)     (HTML)      (JSON)      (Chromium)      (lopdf)
//!                         └──────── process: concurrent, per page ────────┘
//! ```
//!
//! 1. [`input`]     — validate the PDF path, load side data
//! 2. [`rasterize`] — one screenshot per page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]    — base64-wrap each screenshot for the request body
//! 4. [`client`]    — one model call per page; the only network I/O
//! 5. [`extract`]   — recover an HTML document from the free-form reply
//! 6. [`process`]   — fans 3–5 out over all pages and restores page order
//! 7. [`persist`]   — manifests and HTML files, named by ordinal
//! 8. [`html_render`] — optional: print each HTML page to PDF
//! 9. [`merge`]     — optional: concatenate the page PDFs in order

pub mod client;
pub mod encode;
pub mod extract;
pub mod html_render;
pub mod input;
pub mod merge;
pub mod persist;
pub mod process;
pub mod rasterize;
