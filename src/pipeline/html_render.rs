//! HTML → PDF: print each recreated page through headless Chromium.
//!
//! One browser is launched for the whole rendering stage and each page gets
//! its own tab, loaded from the HTML file on disk so relative assets and
//! CDN scripts (Tailwind, Google Fonts) resolve exactly as they would when
//! the file is opened by hand.

use crate::error::{Pdf2HtmlError, PageError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use futures::StreamExt;
use std::path::Path;
use reqwest::Url;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 16:9 slide, in inches.
pub const SLIDE_WIDTH_IN: f64 = 13.333;
pub const SLIDE_HEIGHT_IN: f64 = 7.5;

/// Renders one page's HTML file to PDF bytes.
#[async_trait]
pub trait HtmlRenderer: Send + Sync {
    async fn render_page(&self, page: usize, html_path: &Path) -> Result<Vec<u8>, PageError>;

    /// Release any resources held by the renderer.
    async fn close(&self) {}
}

/// Print settings: background graphics on, no margins, slide-sized paper
/// unless the document declares its own `@page` size.
pub fn print_params() -> PrintToPdfParams {
    PrintToPdfParams {
        print_background: Some(true),
        prefer_css_page_size: Some(true),
        paper_width: Some(SLIDE_WIDTH_IN),
        paper_height: Some(SLIDE_HEIGHT_IN),
        margin_top: Some(0.0),
        margin_bottom: Some(0.0),
        margin_left: Some(0.0),
        margin_right: Some(0.0),
        ..Default::default()
    }
}

/// Percent-encoded `file://` URL for an absolute path; `None` for relative paths.
pub fn file_url(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

/// [`HtmlRenderer`] driving a headless Chrome/Chromium via CDP.
pub struct ChromiumRenderer {
    browser: RwLock<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Start a headless browser. `chrome_path` overrides executable discovery.
    pub async fn launch(chrome_path: Option<&Path>) -> Result<Self, Pdf2HtmlError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--allow-file-access-from-files");

        if let Some(path) = chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(Pdf2HtmlError::BrowserLaunch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| Pdf2HtmlError::BrowserLaunch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("Headless browser started");
        Ok(Self {
            browser: RwLock::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl HtmlRenderer for ChromiumRenderer {
    async fn render_page(&self, page: usize, html_path: &Path) -> Result<Vec<u8>, PageError> {
        let failed = |detail: String| PageError::RenderFailed { page, detail };

        let absolute = tokio::fs::canonicalize(html_path)
            .await
            .map_err(|e| failed(format!("{}: {}", html_path.display(), e)))?;
        let url = file_url(&absolute)
            .ok_or_else(|| failed(format!("{}: not an absolute path", absolute.display())))?;

        let tab = self
            .browser
            .read()
            .await
            .new_page(CreateTargetParams::new(url.as_str()))
            .await
            .map_err(|e| failed(e.to_string()))?;

        let result = async {
            tab.wait_for_navigation()
                .await
                .map_err(|e| failed(e.to_string()))?;
            tab.pdf(print_params()).await.map_err(|e| failed(e.to_string()))
        }
        .await;

        let _ = tab.close().await;

        let bytes = result?;
        debug!("Page {}: printed {} bytes of PDF", page, bytes.len());
        Ok(bytes)
    }

    async fn close(&self) {
        let _ = self.browser.write().await.close().await;
        self.handler.abort();
        debug!("Headless browser closed");
    }
}
