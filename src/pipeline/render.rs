//! Document rendering: turn a submitted file into model-ready page images.
//!
//! PDFs are rasterised page by page through pdfium; raster images pass
//! through untouched as a single page. The contract towards the pipeline is
//! deliberately forgiving: **any** failure (corrupt file, unsupported
//! format, pdfium library unavailable, page encode error) yields an empty
//! sequence and a warning, never an error. The caller treats "no pages" as
//! "no extractable content" and stops before spending a model call.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound. Rendering runs on Tokio's blocking pool so the
//! HTTP workers never stall behind a 40-page scan.

use crate::pipeline::encode::{encode_image_bytes, encode_page};
use crate::pipeline::input::{classify, DocumentKind};
use edgequake_llm::ImageData;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// PDF user-space units per inch.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Render the document at `path` into page images, in page order.
///
/// Returns an empty vector when the document cannot be rendered or is not
/// a visual document at all (plain text, unknown bytes).
pub async fn render_document(path: &Path, dpi: u32, max_pixels: u32) -> Vec<ImageData> {
    match classify(path) {
        Some(DocumentKind::Pdf) => render_pdf(path, dpi, max_pixels).await,
        Some(DocumentKind::Image) => passthrough_image(path).await,
        Some(DocumentKind::Text) | None => {
            debug!("{} is not a visual document; nothing to render", path.display());
            Vec::new()
        }
    }
}

/// Rasterise every page of a PDF.
pub async fn render_pdf(path: &Path, dpi: u32, max_pixels: u32) -> Vec<ImageData> {
    let owned = path.to_path_buf();
    let result =
        tokio::task::spawn_blocking(move || render_pdf_blocking(&owned, dpi, max_pixels)).await;

    match result {
        Ok(Ok(pages)) => {
            info!("Rendered {} pages from {}", pages.len(), path.display());
            pages
        }
        Ok(Err(detail)) => {
            warn!("Could not render {}: {}", path.display(), detail);
            Vec::new()
        }
        Err(e) => {
            warn!("Render task for {} panicked: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Blocking implementation of PDF rendering. All-or-nothing: one bad page
/// fails the whole document.
fn render_pdf_blocking(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<ImageData>, String> {
    let pdfium = pdfium_auto::bind_pdfium_silent().map_err(|e| format!("pdfium unavailable: {e}"))?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| format!("cannot open PDF: {:?}", e))?;

    let pages = document.pages();
    debug!("PDF loaded: {} pages", pages.len());

    let mut results = Vec::with_capacity(pages.len() as usize);

    for (idx, page) in pages.iter().enumerate() {
        let (width, height) =
            target_size(page.width().value, page.height().value, dpi, max_pixels);

        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_target_height(height);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| format!("page {}: {:?}", idx + 1, e))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );

        let encoded =
            encode_page(&image).map_err(|e| format!("page {}: encode failed: {}", idx + 1, e))?;
        results.push(encoded);
    }

    Ok(results)
}

/// Read an uploaded image and pass it through as the only page.
async fn passthrough_image(path: &Path) -> Vec<ImageData> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            warn!("Could not read image {}: {}", path.display(), e);
            return Vec::new();
        }
    };

    match encode_image_bytes(&bytes) {
        Some(image) => vec![image],
        None => {
            warn!("{} is not a recognisable image", path.display());
            Vec::new()
        }
    }
}

/// Pixel size for a page of `width_pts` × `height_pts` at `dpi`, scaled down
/// proportionally so neither edge exceeds `max_pixels`.
pub fn target_size(width_pts: f32, height_pts: f32, dpi: u32, max_pixels: u32) -> (i32, i32) {
    let scale = dpi as f32 / PDF_POINTS_PER_INCH;
    let mut w = width_pts * scale;
    let mut h = height_pts * scale;

    let longest = w.max(h);
    if longest > max_pixels as f32 {
        let shrink = max_pixels as f32 / longest;
        w *= shrink;
        h *= shrink;
    }

    ((w.round() as i32).max(1), (h.round() as i32).max(1))
}
