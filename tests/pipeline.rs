//! Orchestrator integration tests with in-process collaborators.
//!
//! The rasteriser writes real PNG screenshots whose first pixel encodes the
//! page number, the model client reads that pixel back to decide how to
//! answer, and the HTML renderer emits real single-page PDFs whose width
//! encodes the page number. No pdfium, network or browser is needed.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_pdf2html::{
    convert, reextract, ClientError, ConversionConfig, ConversionProgressCallback, HtmlRenderer,
    ModelClient, ModelResponse, Page, PageError, PageRasterizer, Pdf2HtmlError, Pipeline,
    PipelineStage, RasterOptions,
};
use edgequake_pdf2html::pipeline::encode::ImageData;
use image::{DynamicImage, Rgba, RgbaImage};
use lopdf::{dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeRasterizer {
    pages: usize,
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn rasterize(
        &self,
        _pdf_path: &Path,
        output_dir: &Path,
        options: &RasterOptions,
    ) -> Result<Vec<Page>, Pdf2HtmlError> {
        let mut pages = Vec::new();
        for index in 1..=self.pages {
            let image_path = output_dir.join(format!("page.{index}.png"));
            let img = RgbaImage::from_pixel(
                options.width.min(16),
                options.height.min(9),
                Rgba([index as u8, 0, 0, 255]),
            );
            DynamicImage::ImageRgba8(img)
                .save_with_format(&image_path, image::ImageFormat::Png)
                .map_err(|e| Pdf2HtmlError::Internal(e.to_string()))?;
            pages.push(Page { index, image_path });
        }
        Ok(pages)
    }
}

fn page_of(image: &ImageData) -> usize {
    let bytes = STANDARD.decode(&image.data).unwrap();
    let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
    img.get_pixel(0, 0)[0] as usize
}

#[derive(Clone, Copy)]
enum Reply {
    JsonHtml,
    FencedHtml,
    NoHtml,
    HttpError,
    Hang,
}

#[derive(Default)]
struct ScriptedClient {
    replies: HashMap<usize, Reply>,
    latency_ms: HashMap<usize, u64>,
}

fn slide_html(page: usize) -> String {
    format!("<!DOCTYPE html><html><body><h1>Slide {page}</h1></body></html>")
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn send(&self, image: &ImageData, _prompt: &str) -> Result<ModelResponse, ClientError> {
        let page = page_of(image);
        if let Some(ms) = self.latency_ms.get(&page) {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        let text = match self.replies.get(&page).copied().unwrap_or(Reply::JsonHtml) {
            Reply::JsonHtml => serde_json::json!({ "output": slide_html(page) }).to_string(),
            Reply::FencedHtml => format!("Here you go:\n```html\n{}\n```", slide_html(page)),
            Reply::NoHtml => "I am unable to recreate this slide.".to_string(),
            Reply::HttpError => {
                return Err(ClientError::Http {
                    status: 529,
                    body: "overloaded".into(),
                })
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(10)).await;
                return Err(ClientError::Transport("gave up".into()));
            }
        };
        Ok(ModelResponse {
            body: serde_json::json!({
                "id": format!("msg_{page}"),
                "content": [{ "type": "text", "text": text.clone() }]
            }),
            text,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct FakeHtmlRenderer {
    fail_pages: HashSet<usize>,
}

fn single_page_pdf(width: i64) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), 540.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

#[async_trait]
impl HtmlRenderer for FakeHtmlRenderer {
    async fn render_page(&self, page: usize, html_path: &Path) -> Result<Vec<u8>, PageError> {
        assert!(html_path.exists(), "renderer given a missing file");
        if self.fail_pages.contains(&page) {
            return Err(PageError::RenderFailed {
                page,
                detail: "print failed".into(),
            });
        }
        Ok(single_page_pdf(900 + page as i64))
    }
}

#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<PipelineStage>>,
    page_errors: Mutex<Vec<usize>>,
}

impl ConversionProgressCallback for StageRecorder {
    fn on_stage_change(&self, stage: PipelineStage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_page_error(&self, page_num: usize, _total: usize, _error: &str) {
        self.page_errors.lock().unwrap().push(page_num);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn fake_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.4\n%fake\n").unwrap();
    path
}

/// `RUST_LOG=debug cargo test --test pipeline` shows the pipeline's logs.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_for(out: &Path) -> edgequake_pdf2html::ConversionConfigBuilder {
    init_tracing();
    ConversionConfig::builder()
        .api_key("sk-ant-test")
        .output_dir(out)
        .api_timeout(Duration::from_millis(250))
        .concurrency(8)
}

fn pipeline(
    config: ConversionConfig,
    pages: usize,
    client: ScriptedClient,
    renderer: Option<FakeHtmlRenderer>,
) -> Pipeline {
    Pipeline::with_components(
        config,
        Arc::new(FakeRasterizer { pages }),
        Arc::new(client),
        renderer.map(|r| Arc::new(r) as Arc<dyn HtmlRenderer>),
    )
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn pdf_page_widths(path: &Path) -> Vec<i64> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_object(*id).unwrap().as_dict().unwrap();
            page.get(b"MediaBox").unwrap().as_array().unwrap()[2]
                .as_i64()
                .unwrap()
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_pages_with_timeout_on_page_two() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "Quarterly Review.pdf");
    let client = ScriptedClient {
        replies: HashMap::from([(2, Reply::Hang)]),
        ..Default::default()
    };
    let p = pipeline(config_for(&out).build().unwrap(), 3, client, None);

    let result = p.run(&pdf).await.expect("run should succeed");

    assert_eq!(result.slug, "quarterly-review");
    assert_eq!(result.pages.len(), 3);
    assert!(matches!(
        result.pages[1].error(),
        Some(PageError::Timeout { page: 2, .. })
    ));

    for n in 1..=3 {
        assert!(out.join(format!("model_output_page_{n}.json")).exists());
    }
    assert!(out.join("html_output_page_1.html").exists());
    assert!(!out.join("html_output_page_2.html").exists());
    assert!(out.join("html_output_page_3.html").exists());
    assert_eq!(
        std::fs::read_to_string(out.join("html_output_page_3.html")).unwrap(),
        slide_html(3)
    );

    let summary = read_json(&out.join("processing_summary.json"));
    assert_eq!(summary["totalPages"], 3);
    assert_eq!(summary["succeededPages"], 2);
    assert_eq!(summary["failedPages"], 1);
    assert_eq!(summary["slug"], "quarterly-review");
    assert_eq!(summary["pages"][1]["page"], 2);
    assert_eq!(summary["pages"][1]["status"], "model_call_failed");
    assert!(summary["pages"][1]["error"].as_str().unwrap().contains("timed out"));
    assert!(summary["pages"][1]["htmlPath"].is_null());
    assert!(summary["combinedPdfPath"].is_null());

    let page2 = read_json(&out.join("model_output_page_2.json"));
    assert_eq!(page2["page"], 2);
    assert_eq!(page2["status"], "model_call_failed");
    assert!(page2["modelResponse"].is_null());
    assert!(page2["screenshotPath"].as_str().unwrap().ends_with("page.2.png"));
}

#[tokio::test]
async fn output_order_is_independent_of_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let client = ScriptedClient {
        latency_ms: (1..=10).map(|p| (p, fastrand::u64(0..60))).collect(),
        ..Default::default()
    };
    let p = pipeline(config_for(&out).build().unwrap(), 10, client, None);

    let result = p.run(&pdf).await.unwrap();

    let order: Vec<usize> = result.pages.iter().map(|r| r.index()).collect();
    assert_eq!(order, (1..=10).collect::<Vec<_>>());
    for record in &result.pages {
        assert_eq!(record.html(), Some(slide_html(record.index()).as_str()));
    }

    let summary = read_json(&result.summary_path);
    let listed: Vec<u64> = summary["pages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["page"].as_u64().unwrap())
        .collect();
    assert_eq!(listed, (1..=10).collect::<Vec<u64>>());
}

#[tokio::test]
async fn failures_are_isolated_and_distinguished() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let client = ScriptedClient {
        replies: HashMap::from([(2, Reply::HttpError), (3, Reply::NoHtml), (4, Reply::FencedHtml)]),
        ..Default::default()
    };
    let recorder = Arc::new(StageRecorder::default());
    let config = config_for(&out)
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let p = pipeline(config, 4, client, None);

    let result = p.run(&pdf).await.unwrap();

    assert_eq!(result.stats.total_pages, 4);
    assert_eq!(result.stats.succeeded_pages, 2);
    assert_eq!(result.stats.transport_failures, 1);
    assert_eq!(result.stats.extraction_failures, 1);

    assert_eq!(read_json(&out.join("model_output_page_2.json"))["status"], "model_call_failed");
    let page3 = read_json(&out.join("model_output_page_3.json"));
    assert_eq!(page3["status"], "no_html");
    assert_eq!(page3["modelResponse"]["id"], "msg_3");
    assert_eq!(read_json(&out.join("model_output_page_4.json"))["status"], "ok");

    let mut errored = recorder.page_errors.lock().unwrap().clone();
    errored.sort_unstable();
    assert_eq!(errored, vec![2, 3]);
}

#[tokio::test]
async fn stages_run_in_order_and_end_in_done() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let recorder = Arc::new(StageRecorder::default());
    let config = config_for(&out)
        .render_pdf(true)
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let p = pipeline(config, 2, ScriptedClient::default(), Some(FakeHtmlRenderer::default()));

    p.run(&pdf).await.unwrap();

    assert_eq!(
        *recorder.stages.lock().unwrap(),
        vec![
            PipelineStage::Rasterizing,
            PipelineStage::ModelProcessing,
            PipelineStage::Persisting,
            PipelineStage::Rendering,
            PipelineStage::Merging,
            PipelineStage::Done,
        ]
    );
}

#[tokio::test]
async fn render_mode_merges_pages_in_ordinal_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "Board Deck.pdf");
    let client = ScriptedClient {
        replies: HashMap::from([(3, Reply::NoHtml)]),
        latency_ms: (1..=5).map(|p| (p, (6 - p as u64) * 10)).collect(),
    };
    let renderer = FakeHtmlRenderer {
        fail_pages: HashSet::from([4]),
    };
    let config = config_for(&out).render_pdf(true).build().unwrap();
    let p = pipeline(config, 5, client, Some(renderer));

    let result = p.run(&pdf).await.unwrap();

    let combined = result.combined_pdf.clone().expect("combined PDF");
    assert_eq!(combined, out.join("board-deck-combined.pdf"));
    // Page 3 had no HTML, page 4 failed to render.
    assert_eq!(pdf_page_widths(&combined), vec![901, 902, 905]);

    assert!(out.join("html_output_page_1.pdf").exists());
    assert!(!out.join("html_output_page_3.pdf").exists());
    assert!(!out.join("html_output_page_4.pdf").exists());

    assert_eq!(result.stats.render_failures, 1);
    assert!(matches!(
        result.pages[3].render_error,
        Some(PageError::RenderFailed { page: 4, .. })
    ));

    let summary = read_json(&result.summary_path);
    assert_eq!(summary["pages"][3]["status"], "render_failed");
    assert_eq!(
        summary["combinedPdfPath"].as_str().unwrap(),
        combined.to_str().unwrap()
    );
    assert!(result.generated_paths.contains(&combined));
}

#[tokio::test]
async fn render_mode_without_any_html_skips_merge() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let client = ScriptedClient {
        replies: HashMap::from([(1, Reply::NoHtml), (2, Reply::HttpError)]),
        ..Default::default()
    };
    let config = config_for(&out).render_pdf(true).build().unwrap();
    let p = pipeline(config, 2, client, Some(FakeHtmlRenderer::default()));

    let result = p.run(&pdf).await.unwrap();

    assert!(result.combined_pdf.is_none());
    assert!(!out.join("deck-combined.pdf").exists());
    assert_eq!(result.stats.succeeded_pages, 0);
}

#[tokio::test]
async fn side_data_is_copied_into_every_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let csv = dir.path().join("figures.csv");
    std::fs::write(&csv, "metric,value\nrevenue,42\n").unwrap();
    let config = config_for(&out).side_data_path(&csv).build().unwrap();
    let p = pipeline(config, 2, ScriptedClient::default(), None);

    p.run(&pdf).await.unwrap();

    for n in 1..=2 {
        let m = read_json(&out.join(format!("model_output_page_{n}.json")));
        assert_eq!(m["sideData"], "metric,value\nrevenue,42\n");
    }
    let summary = read_json(&out.join("processing_summary.json"));
    assert_eq!(summary["sideDataPath"].as_str().unwrap(), csv.to_str().unwrap());
}

#[tokio::test]
async fn missing_pdf_is_fatal_and_reported_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let recorder = Arc::new(StageRecorder::default());
    let config = config_for(&out)
        .progress_callback(recorder.clone() as Arc<dyn ConversionProgressCallback>)
        .build()
        .unwrap();
    let p = pipeline(config, 3, ScriptedClient::default(), None);

    let err = p.run(dir.path().join("absent.pdf")).await.unwrap_err();

    assert!(matches!(err, Pdf2HtmlError::FileNotFound { .. }));
    assert_eq!(*recorder.stages.lock().unwrap(), vec![PipelineStage::Failed]);
    assert!(!out.join("processing_summary.json").exists());
}

#[tokio::test]
async fn zero_pages_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "empty.pdf");
    let p = pipeline(config_for(&out).build().unwrap(), 0, ScriptedClient::default(), None);

    let err = p.run(&pdf).await.unwrap_err();

    assert!(matches!(err, Pdf2HtmlError::NoPages { .. }));
    assert!(!out.join("processing_summary.json").exists());
}

#[tokio::test]
async fn placeholder_key_is_rejected_before_any_work() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let config = ConversionConfig::builder()
        .api_key("your-claude-api-key-here")
        .output_dir(&out)
        .build()
        .unwrap();

    let err = convert(&pdf, &config).await.unwrap_err();

    assert!(matches!(err, Pdf2HtmlError::MissingApiKey));
    assert!(!out.exists());
}

#[tokio::test]
async fn reextract_recovers_html_from_a_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let pdf = fake_pdf(dir.path(), "deck.pdf");
    let client = ScriptedClient {
        replies: HashMap::from([(2, Reply::HttpError), (3, Reply::FencedHtml)]),
        ..Default::default()
    };
    let p = pipeline(config_for(&out).build().unwrap(), 3, client, None);
    p.run(&pdf).await.unwrap();

    let written = reextract(&out).await.unwrap();

    assert_eq!(
        written,
        vec![
            out.join("extracted-html/page_1_extracted.html"),
            out.join("extracted-html/page_3_extracted.html"),
        ]
    );
    assert_eq!(std::fs::read_to_string(&written[1]).unwrap(), slide_html(3));
}
