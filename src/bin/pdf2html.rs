//! CLI binary for edgequake-pdf2html.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2html::{
    convert, reextract, ConversionConfig, ConversionProgressCallback, ImageFormat, PipelineStage,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per settled page. Pages settle out
/// of order, so start times are tracked per page number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recreating");
        self.bar.reset_eta();
    }

    fn take_elapsed(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recreating {total_pages} pages…"))
        ));
    }

    fn on_stage_change(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Rasterizing => self.bar.set_message("Rasterising pages…"),
            PipelineStage::Rendering => self.bar.set_prefix("Rendering"),
            PipelineStage::Merging => self.bar.set_prefix("Merging"),
            _ => {}
        }
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, html_len: usize) {
        let elapsed = self.take_elapsed(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{html_len:>6} bytes")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.take_elapsed(page_num);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages recreated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages recreated  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recreate every slide as HTML under ./output
  pdf2html deck.pdf

  # Attach CSV side data to every page manifest
  pdf2html deck.pdf --side-data figures.csv -o out/

  # Also print the HTML back to PDF and merge it into <slug>-combined.pdf
  pdf2html deck.pdf --render-pdf

  # Gentle on a rate-limited key: 3 in flight, 500 ms between dispatches
  pdf2html deck.pdf --concurrency 3 --request-delay-ms 500

  # Re-run HTML extraction over an existing output directory (no API calls)
  pdf2html --reextract-only out/

OUTPUT LAYOUT:
  <out>/screenshots/page.<N>.png       page screenshots
  <out>/model_output_page_<N>.json     per-page manifest (raw reply, status)
  <out>/html_output_page_<N>.html      recreated HTML (pages with HTML only)
  <out>/html_output_page_<N>.pdf       re-rendered page (--render-pdf)
  <out>/<slug>-combined.pdf            merged document (--render-pdf)
  <out>/processing_summary.json        run summary

ENVIRONMENT VARIABLES:
  CLAUDE_API_KEY          Anthropic API key
  PDF2HTML_MODEL          Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override log filter
"#;

/// Recreate slide-deck PDF pages as HTML using a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2html",
    version,
    about = "Recreate slide-deck PDF pages as HTML using a vision model",
    long_about = "Rasterise every page of a PDF, ask a vision model to rebuild each page as a \
standalone Tailwind HTML document, and write per-page manifests. Optionally print the HTML \
back to PDF with headless Chromium and merge the pages into one document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF to convert (or, with --reextract-only, an output directory).
    input: PathBuf,

    /// CSV file copied verbatim into every page manifest.
    #[arg(long, env = "PDF2HTML_SIDE_DATA")]
    side_data: Option<PathBuf>,

    /// Directory for manifests, HTML and PDFs.
    #[arg(short, long, env = "PDF2HTML_OUTPUT_DIR", default_value = "./output")]
    output_dir: PathBuf,

    /// Directory for page screenshots. Default: <output-dir>/screenshots.
    #[arg(long, env = "PDF2HTML_SCREENSHOT_DIR")]
    screenshot_dir: Option<PathBuf>,

    /// Anthropic API key.
    #[arg(long, env = "CLAUDE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "PDF2HTML_MODEL")]
    model: Option<String>,

    /// Messages API endpoint.
    #[arg(long, env = "PDF2HTML_API_URL")]
    api_url: Option<String>,

    /// Rasterisation density in DPI (36–600).
    #[arg(long, env = "PDF2HTML_DENSITY", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(36..=600))]
    density: u32,

    /// Maximum screenshot width in pixels.
    #[arg(long, env = "PDF2HTML_WIDTH", default_value_t = 800)]
    width: u32,

    /// Maximum screenshot height in pixels.
    #[arg(long, env = "PDF2HTML_HEIGHT", default_value_t = 600)]
    height: u32,

    /// Screenshot format.
    #[arg(long, env = "PDF2HTML_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// Number of concurrent model calls.
    #[arg(short, long, env = "PDF2HTML_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Milliseconds between successive dispatches.
    #[arg(long, env = "PDF2HTML_REQUEST_DELAY_MS", default_value_t = 0)]
    request_delay_ms: u64,

    /// Max model output tokens per page.
    #[arg(long, env = "PDF2HTML_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Model temperature (0.0–1.0).
    #[arg(long, env = "PDF2HTML_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-page model call timeout in seconds.
    #[arg(long, env = "PDF2HTML_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Text file whose contents replace the default recreation prompt.
    #[arg(long, env = "PDF2HTML_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Print each HTML page to PDF and merge them into one document.
    #[arg(long, env = "PDF2HTML_RENDER_PDF")]
    render_pdf: bool,

    /// Chrome/Chromium executable for --render-pdf.
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Re-run HTML extraction over the manifests in INPUT; no API calls.
    #[arg(long)]
    reextract_only: bool,

    /// Print processing_summary.json to stdout when done.
    #[arg(long, env = "PDF2HTML_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2HTML_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2HTML_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2HTML_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Jpeg,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Jpeg => ImageFormat::Jpeg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.reextract_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Re-extract mode ──────────────────────────────────────────────────
    if cli.reextract_only {
        let written = reextract(&cli.input)
            .await
            .with_context(|| format!("Re-extraction failed in {}", cli.input.display()))?;
        if !cli.quiet {
            eprintln!(
                "{} {} pages re-extracted into {}",
                green("✔"),
                bold(&written.len().to_string()),
                cli.input.join("extracted-html").display()
            );
        }
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&written).context("Failed to serialise paths")?
            );
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run conversion ───────────────────────────────────────────────────
    let result = convert(&cli.input, &config)
        .await
        .context("Conversion failed")?;

    let stats = &result.stats;
    if cli.json {
        let summary = tokio::fs::read_to_string(&result.summary_path)
            .await
            .with_context(|| format!("Failed to read {}", result.summary_path.display()))?;
        println!("{summary}");
    } else if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Recreated {}/{} pages in {}ms",
                stats.succeeded_pages, stats.total_pages, stats.total_duration_ms
            );
        }
        if stats.transport_failures > 0 || stats.extraction_failures > 0 {
            eprintln!(
                "   {} model call failures  /  {} replies without HTML",
                red(&stats.transport_failures.to_string()),
                red(&stats.extraction_failures.to_string()),
            );
        }
        if stats.render_failures > 0 {
            eprintln!(
                "   {} pages failed to render to PDF",
                red(&stats.render_failures.to_string())
            );
        }
        if let Some(ref combined) = result.combined_pdf {
            eprintln!("   {} {}", green("→"), bold(&combined.display().to_string()));
        }
        eprintln!(
            "   {}  {}ms total",
            dim(&result.summary_path.display().to_string()),
            stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .output_dir(&cli.output_dir)
        .density(cli.density)
        .page_size(cli.width, cli.height)
        .image_format(cli.format.into())
        .concurrency(cli.concurrency)
        .request_delay_ms(cli.request_delay_ms)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .render_pdf(cli.render_pdf);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = cli.api_url {
        builder = builder.api_url(url);
    }
    if let Some(ref dir) = cli.screenshot_dir {
        builder = builder.screenshot_dir(dir);
    }
    if let Some(ref path) = cli.side_data {
        builder = builder.side_data_path(path);
    }
    if let Some(ref path) = cli.chrome_path {
        builder = builder.chrome_path(path);
    }
    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
