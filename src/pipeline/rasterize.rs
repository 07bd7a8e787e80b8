//! PDF rasterisation: one screenshot file per page via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole render. `tokio::task::spawn_blocking`
//! moves the work onto the blocking pool so Tokio workers keep polling
//! other tasks while a large deck renders.
//!
//! Screenshots are named `page.<N>.<ext>` with `N` 1-based, and the returned
//! [`Page`] list is in ascending ordinal order.

use crate::config::{ImageFormat, RasterOptions};
use crate::error::Pdf2HtmlError;
use crate::output::Page;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium library file or directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Turns a PDF into per-page screenshots.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Render every page of `pdf_path` into `output_dir`.
    ///
    /// Returns one [`Page`] per PDF page, ordinals `1..=N` ascending.
    async fn rasterize(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        options: &RasterOptions,
    ) -> Result<Vec<Page>, Pdf2HtmlError>;
}

/// `page.<N>.<ext>`
pub fn screenshot_file_name(index: usize, format: ImageFormat) -> String {
    format!("page.{}.{}", index, format.extension())
}

/// pdfium renders at 72 points per inch; scale up to the requested density.
pub fn scale_factor(density: u32) -> f32 {
    density as f32 / 72.0
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    /// Explicit library location; falls back to [`PDFIUM_LIB_PATH_ENV`],
    /// then the system library search path.
    pub library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library_path(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    async fn rasterize(
        &self,
        pdf_path: &Path,
        output_dir: &Path,
        options: &RasterOptions,
    ) -> Result<Vec<Page>, Pdf2HtmlError> {
        let pdf = pdf_path.to_path_buf();
        let out = output_dir.to_path_buf();
        let options = *options;
        let library = self.library_path.clone();

        tokio::task::spawn_blocking(move || {
            rasterize_blocking(&pdf, &out, &options, library.as_deref())
        })
        .await
        .map_err(|e| Pdf2HtmlError::Internal(format!("Raster task panicked: {}", e)))?
    }
}

/// Bind to pdfium: explicit path, then `PDFIUM_LIB_PATH`, then the system library.
pub fn load_pdfium(explicit: Option<&Path>) -> Result<Pdfium, Pdf2HtmlError> {
    let from_env = std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from);
    let bindings = match explicit.map(Path::to_path_buf).or(from_env) {
        Some(path) => {
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| Pdf2HtmlError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn rasterize_blocking(
    pdf_path: &Path,
    output_dir: &Path,
    options: &RasterOptions,
    library: Option<&Path>,
) -> Result<Vec<Page>, Pdf2HtmlError> {
    let pdfium = load_pdfium(library)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| Pdf2HtmlError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let total = document.pages().len() as usize;
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(scale_factor(options.density))
        .set_maximum_width(options.width as i32)
        .set_maximum_height(options.height as i32);

    let mut pages = Vec::with_capacity(total);
    for (i, page) in document.pages().iter().enumerate() {
        let index = i + 1;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Pdf2HtmlError::RasterisationFailed {
                page: index,
                detail: format!("{:?}", e),
            }
        })?;

        let image_path = output_dir.join(screenshot_file_name(index, options.format));
        save_screenshot(bitmap.as_image(), &image_path, options.format).map_err(|e| {
            Pdf2HtmlError::RasterisationFailed {
                page: index,
                detail: format!("{}: {}", image_path.display(), e),
            }
        })?;
        debug!("Rendered page {} → {}", index, image_path.display());

        pages.push(Page { index, image_path });
    }

    Ok(pages)
}

/// Write one screenshot. JPEG has no alpha channel, so it is flattened first.
pub fn save_screenshot(
    image: DynamicImage,
    path: &Path,
    format: ImageFormat,
) -> image::ImageResult<()> {
    match format {
        ImageFormat::Png => image.save_with_format(path, image::ImageFormat::Png),
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
            .save_with_format(path, image::ImageFormat::Jpeg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn file_names_are_one_based_with_extension() {
        assert_eq!(screenshot_file_name(1, ImageFormat::Png), "page.1.png");
        assert_eq!(screenshot_file_name(12, ImageFormat::Jpeg), "page.12.jpg");
    }

    #[test]
    fn density_scales_from_72_dpi() {
        assert!((scale_factor(72) - 1.0).abs() < f32::EPSILON);
        assert!((scale_factor(144) - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn jpeg_screenshot_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.1.jpg");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 128])));
        save_screenshot(img, &path, ImageFormat::Jpeg).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn bad_explicit_library_path_is_binding_error() {
        let err = load_pdfium(Some(Path::new("/nonexistent/libpdfium.so")));
        assert!(matches!(err, Err(Pdf2HtmlError::PdfiumBindingFailed(_))));
    }
}
