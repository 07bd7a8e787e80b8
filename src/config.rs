//! Configuration types for PDF-to-HTML recreation.
//!
//! All run behaviour is controlled through [`ConversionConfig`], built via
//! its [`ConversionConfigBuilder`]. Nothing is read from process-global
//! state: the CLI maps flags and environment variables onto the builder,
//! and library callers set exactly the fields they care about.

use crate::error::Pdf2HtmlError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default model used for page recreation.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default Messages API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Value of the `anthropic-version` header sent with every request.
pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// Key values shipped in template `.env` files; treated as "no key".
const PLACEHOLDER_API_KEYS: &[&str] = &["your-claude-api-key-here", "your-api-key-here"];

/// Configuration for a PDF-to-HTML run.
///
/// # Example
/// ```rust
/// use edgequake_pdf2html::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .api_key("sk-ant-...")
///     .output_dir("./output")
///     .concurrency(4)
///     .render_pdf(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// API key for the model endpoint. Required unless a custom
    /// [`crate::pipeline::client::ModelClient`] is injected.
    pub api_key: Option<String>,

    /// Model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Messages API endpoint. Default: [`DEFAULT_API_URL`].
    pub api_url: String,

    /// `anthropic-version` header value. Default: [`DEFAULT_API_VERSION`].
    pub api_version: String,

    /// Maximum tokens the model may generate per page. Default: 4096.
    ///
    /// A Tailwind slide usually needs 1 500–3 000 tokens; anything cut off
    /// mid-document fails extraction and is recorded as "no HTML".
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Prompt sent with every page image. If None, uses
    /// [`crate::prompts::DEFAULT_RECREATE_PROMPT`].
    pub prompt: Option<String>,

    /// Directory for manifests, HTML, PDFs and the summary. Default: `./output`.
    pub output_dir: PathBuf,

    /// Directory for page screenshots. Default: `<output_dir>/screenshots`.
    pub screenshot_dir: Option<PathBuf>,

    /// Optional CSV side-data copied verbatim into every page manifest.
    pub side_data_path: Option<PathBuf>,

    /// Rasterisation settings.
    pub raster: RasterOptions,

    /// Number of model calls in flight at once. Default: 10.
    pub concurrency: usize,

    /// Per-call timeout. Default: 60 s. A timed-out call is recorded as that
    /// page's failure and is not retried.
    pub api_timeout: Duration,

    /// Stagger between dispatches in milliseconds. Default: 0.
    ///
    /// The page at submission position `k` waits `k × request_delay_ms`
    /// before its call, spreading requests out for rate-limited keys.
    pub request_delay_ms: u64,

    /// Re-render extracted HTML to PDF and merge into one document. Default: false.
    pub render_pdf: bool,

    /// Chrome/Chromium executable used for HTML → PDF. If None, chromiumoxide
    /// searches the usual install locations.
    pub chrome_path: Option<PathBuf>,

    /// Receives per-page and per-stage events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_tokens: 4096,
            temperature: 0.1,
            prompt: None,
            output_dir: PathBuf::from("./output"),
            screenshot_dir: None,
            side_data_path: None,
            raster: RasterOptions::default(),
            concurrency: 10,
            api_timeout: Duration::from_secs(60),
            request_delay_ms: 0,
            render_pdf: false,
            chrome_path: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("output_dir", &self.output_dir)
            .field("screenshot_dir", &self.screenshot_dir)
            .field("side_data_path", &self.side_data_path)
            .field("raster", &self.raster)
            .field("concurrency", &self.concurrency)
            .field("api_timeout", &self.api_timeout)
            .field("request_delay_ms", &self.request_delay_ms)
            .field("render_pdf", &self.render_pdf)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The API key, or [`Pdf2HtmlError::MissingApiKey`] when it is absent,
    /// blank, or a template placeholder.
    pub fn require_api_key(&self) -> Result<&str, Pdf2HtmlError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && !PLACEHOLDER_API_KEYS.contains(&key) => Ok(key),
            _ => Err(Pdf2HtmlError::MissingApiKey),
        }
    }

    /// Where screenshots are written.
    pub fn screenshot_dir(&self) -> PathBuf {
        self.screenshot_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("screenshots"))
    }

    pub fn prompt(&self) -> &str {
        self.prompt
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_RECREATE_PROMPT)
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 1.0);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = Some(prompt.into());
        self
    }

    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn screenshot_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.config.screenshot_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn side_data_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.side_data_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn raster(mut self, raster: RasterOptions) -> Self {
        self.config.raster = raster;
        self
    }

    pub fn density(mut self, dpi: u32) -> Self {
        self.config.raster.density = dpi.clamp(36, 600);
        self
    }

    pub fn page_size(mut self, width: u32, height: u32) -> Self {
        self.config.raster.width = width.max(100);
        self.config.raster.height = height.max(100);
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.raster.format = format;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout = Duration::from_secs(secs);
        self
    }

    pub fn request_delay_ms(mut self, ms: u64) -> Self {
        self.config.request_delay_ms = ms;
        self
    }

    pub fn render_pdf(mut self, v: bool) -> Self {
        self.config.render_pdf = v;
        self
    }

    pub fn chrome_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config.chrome_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Pdf2HtmlError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2HtmlError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout.is_zero() {
            return Err(Pdf2HtmlError::InvalidConfig(
                "API timeout must be greater than zero".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(Pdf2HtmlError::InvalidConfig("Model id is empty".into()));
        }
        Ok(self.config)
    }
}

// ── Raster options ───────────────────────────────────────────────────────

/// Screenshot format written by the rasteriser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// Lossless; keeps small slide text crisp for the model. (default)
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// How each page is rasterised.
///
/// Pages are scaled by `density / 72` and then fitted inside
/// `width × height`, preserving aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterOptions {
    /// Rendering resolution in DPI. Default: 100.
    pub density: u32,
    /// Maximum output width in pixels. Default: 800.
    pub width: u32,
    /// Maximum output height in pixels. Default: 600.
    pub height: u32,
    pub format: ImageFormat,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            density: 100,
            width: 800,
            height: 600,
            format: ImageFormat::Png,
        }
    }
}
