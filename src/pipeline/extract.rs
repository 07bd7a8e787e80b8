//! Response extraction: recover an HTML document from a free-form model reply.
//!
//! Even when told to answer with `{"output": "..."}`, vision models reply in
//! several shapes: bare JSON, JSON inside a ```` ```json ```` fence, a raw
//! HTML document, an HTML fence, or HTML buried in commentary. Strategies are
//! tried in a fixed order and the first hit wins:
//!
//! 1. Whole reply parses as JSON with a non-empty string `output` field
//! 2. Otherwise (only when step 1 failed to *parse*), the first
//!    ```` ```json ```` fence parses as JSON with an `output` field
//! 3. Trimmed reply starts with `<!DOCTYPE html` or `<html`: returned verbatim
//! 4. First ```` ```html ```` fence, trimmed
//! 5. First `<html ... </html>` span, case-insensitive
//!
//! Every strategy is a pure `&str → Option<String>`; a parse error only means
//! "try the next one". Nothing here panics or returns an error.
//!
//! ## Backslash escapes in `output`
//!
//! Models frequently double-escape the HTML inside `output`, so after JSON
//! decoding the string may still contain literal `\n`, `\t`, `\r`, `\"` and
//! `\\` sequences. These are resolved in a single left-to-right scan: each
//! backslash consumes exactly the character after it, so an escaped
//! backslash followed by `n` decodes to a literal `\n` rather than a newline.
//! Chained `replace` calls cannot get that case right in any order.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// Which strategy recovered the HTML.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    JsonOutput,
    FencedJson,
    RawHtml,
    FencedHtml,
    HtmlSpan,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionStrategy::JsonOutput => "json output key",
            ExtractionStrategy::FencedJson => "fenced json block",
            ExtractionStrategy::RawHtml => "raw html document",
            ExtractionStrategy::FencedHtml => "fenced html block",
            ExtractionStrategy::HtmlSpan => "html span",
        };
        f.write_str(s)
    }
}

/// Extract HTML from a raw model reply, or `None` if nothing is recoverable.
pub fn extract_html(raw_text: &str) -> Option<String> {
    extract_with_strategy(raw_text).map(|(_, html)| html)
}

/// Like [`extract_html`], also reporting which strategy matched.
pub fn extract_with_strategy(raw_text: &str) -> Option<(ExtractionStrategy, String)> {
    let found = from_json(raw_text)
        .or_else(|| from_raw_html(raw_text).map(|h| (ExtractionStrategy::RawHtml, h)))
        .or_else(|| from_fenced_html(raw_text).map(|h| (ExtractionStrategy::FencedHtml, h)))
        .or_else(|| from_html_span(raw_text).map(|h| (ExtractionStrategy::HtmlSpan, h)));

    match &found {
        Some((strategy, html)) => {
            debug!("Extracted {} bytes of HTML via {}", html.len(), strategy)
        }
        None => debug!(
            "No HTML found in model reply; preview: {:?}",
            preview(raw_text, 200)
        ),
    }
    found
}

/// The text block of a Messages API reply body (`content[0].text`).
pub fn reply_text(body: &Value) -> Option<&str> {
    body.pointer("/content/0/text").and_then(Value::as_str)
}

// ── Strategies 1 + 2: JSON `output` key ──────────────────────────────────────

static RE_FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

fn from_json(text: &str) -> Option<(ExtractionStrategy, String)> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => output_field(&value).map(|h| (ExtractionStrategy::JsonOutput, h)),
        Err(_) => {
            let caps = RE_FENCED_JSON.captures(text)?;
            let value = serde_json::from_str::<Value>(caps[1].trim()).ok()?;
            output_field(&value).map(|h| (ExtractionStrategy::FencedJson, h))
        }
    }
}

fn output_field(value: &Value) -> Option<String> {
    value
        .get("output")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(unescape_output)
}

/// Resolve `\n`, `\t`, `\r`, `\"` and `\\` left over after JSON decoding.
///
/// Unknown escapes and a trailing lone backslash are kept as-is.
pub fn unescape_output(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let decoded = match chars.peek() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('"') => '"',
            Some('\\') => '\\',
            _ => {
                out.push('\\');
                continue;
            }
        };
        chars.next();
        out.push(decoded);
    }
    out
}

// ── Strategy 3: reply is already an HTML document ────────────────────────────

fn from_raw_html(text: &str) -> Option<String> {
    let head = text.trim_start_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if starts_with_ignore_case(head, "<!doctype html") || starts_with_ignore_case(head, "<html") {
        Some(text.to_string())
    } else {
        None
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

// ── Strategy 4: ```html fence ────────────────────────────────────────────────

static RE_FENCED_HTML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```html\s*(.*?)\s*```").unwrap());

fn from_fenced_html(text: &str) -> Option<String> {
    RE_FENCED_HTML
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

// ── Strategy 5: any <html>…</html> span ──────────────────────────────────────

static RE_HTML_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<html.*?</html>").unwrap());

fn from_html_span(text: &str) -> Option<String> {
    RE_HTML_SPAN.find(text).map(|m| m.as_str().to_string())
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
