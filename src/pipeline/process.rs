//! Page processing: fan model calls out over every page, then restore order.
//!
//! All pages are dispatched through `buffer_unordered`, so up to
//! `config.concurrency` calls are in flight at once, multiplexed on the
//! calling task. Completion order is arbitrary; the returned records are
//! sorted by page ordinal before anything else sees them.
//!
//! Failure isolation is per page. A timeout, HTTP error or unreadable
//! screenshot becomes that page's `ReplyOutcome::TransportFailure`; a reply
//! with nothing extractable becomes `html: None`. Neither stops the batch,
//! and every input page yields exactly one record.

use crate::config::ConversionConfig;
use crate::error::PageError;
use crate::output::{ExtractedDocument, ModelReply, Page, PageRecord};
use crate::pipeline::client::{ClientError, ModelClient};
use crate::pipeline::encode;
use crate::pipeline::extract::extract_html;
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

/// Run the model over every page and return one record per page, sorted
/// ascending by ordinal.
pub async fn process_all(
    pages: &[Page],
    client: &dyn ModelClient,
    config: &ConversionConfig,
) -> Vec<PageRecord> {
    let total = pages.len();
    let prompt = config.prompt();
    let dispatch_start = Instant::now();

    debug!(
        "Dispatching {} pages to {} (concurrency {})",
        total,
        client.name(),
        config.concurrency
    );

    let mut records: Vec<PageRecord> = stream::iter(pages.iter().enumerate().map(
        |(position, page)| {
            let ready_at = dispatch_start
                + Duration::from_millis(config.request_delay_ms.saturating_mul(position as u64));
            process_page(client, page, prompt, ready_at, total, config)
        },
    ))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    records.sort_by_key(|r| r.page.index);
    records
}

/// Call the model for one page and extract its HTML.
async fn process_page(
    client: &dyn ModelClient,
    page: &Page,
    prompt: &str,
    ready_at: Instant,
    total: usize,
    config: &ConversionConfig,
) -> PageRecord {
    if ready_at > Instant::now() {
        sleep_until(ready_at).await;
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page.index, total);
    }

    let reply = call_model(client, page, prompt, config.api_timeout).await;
    let extracted = ExtractedDocument {
        page_index: page.index,
        html: reply.raw_text().and_then(extract_html),
    };
    let record = PageRecord::new(page.clone(), reply, extracted);

    match record.error() {
        None => {
            let len = record.html().map_or(0, str::len);
            info!("Page {}: recovered {} bytes of HTML", page.index, len);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_complete(page.index, total, len);
            }
        }
        Some(e) => {
            warn!("{}", e);
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_error(page.index, total, &e.to_string());
            }
        }
    }
    record
}

/// Send one page to the model, bounded by `limit`.
///
/// Never fails: every problem is folded into a failed [`ModelReply`].
pub async fn call_model(
    client: &dyn ModelClient,
    page: &Page,
    prompt: &str,
    limit: Duration,
) -> ModelReply {
    let image = match encode::load_image(&page.image_path).await {
        Ok(image) => image,
        Err(e) => {
            return ModelReply::failure(
                page.index,
                PageError::ImageUnreadable {
                    page: page.index,
                    detail: format!("{}: {}", page.image_path.display(), e),
                },
            )
        }
    };

    match timeout(limit, client.send(&image, prompt)).await {
        Ok(Ok(response)) => ModelReply::success(page.index, response.text, response.body),
        Ok(Err(ClientError::Timeout { ms })) => {
            ModelReply::failure(page.index, PageError::Timeout { page: page.index, ms })
        }
        Ok(Err(e)) => ModelReply::failure(
            page.index,
            PageError::ModelCallFailed {
                page: page.index,
                detail: e.to_string(),
            },
        ),
        Err(_elapsed) => ModelReply::failure(
            page.index,
            PageError::Timeout {
                page: page.index,
                ms: limit.as_millis() as u64,
            },
        ),
    }
}
