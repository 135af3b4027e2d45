//! Evidence: what the extraction model actually gets to see.
//!
//! An [`EvidenceProvider`] turns a stored upload into model-facing
//! [`Evidence`]. The shipped [`DirectEvidence`] renders PDFs and images to
//! page images and reads plain-text uploads verbatim. Alternative front-ends
//! (a retrieval step that selects passages, an OCR pre-pass) plug in by
//! implementing the trait and handing it to
//! [`crate::intake::Intake::with_parts`].

use crate::pipeline::input::{classify, DocumentKind};
use crate::pipeline::render::render_document;
use async_trait::async_trait;
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::{debug, warn};

/// Model-facing content of one submission.
#[derive(Debug, Clone)]
pub enum Evidence {
    /// Page images, in page order.
    Images(Vec<ImageData>),
    /// Document text, sent after the extraction instruction.
    Text(String),
}

impl Evidence {
    /// True when there is nothing worth sending to the model.
    pub fn is_empty(&self) -> bool {
        match self {
            Evidence::Images(pages) => pages.is_empty(),
            Evidence::Text(text) => text.trim().is_empty(),
        }
    }

    /// Number of page images (0 for text evidence).
    pub fn page_count(&self) -> usize {
        match self {
            Evidence::Images(pages) => pages.len(),
            Evidence::Text(_) => 0,
        }
    }
}

/// Produces [`Evidence`] for a stored upload.
///
/// Implementations must not fail: an unreadable document yields empty
/// evidence and the pipeline stops with a render-empty error.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    async fn gather(&self, path: &Path) -> Evidence;
}

/// Renders the document itself: PDF pages and images as pixels, text files
/// as text.
#[derive(Debug, Clone)]
pub struct DirectEvidence {
    dpi: u32,
    max_pixels: u32,
}

impl DirectEvidence {
    pub fn new(dpi: u32, max_pixels: u32) -> Self {
        Self { dpi, max_pixels }
    }
}

#[async_trait]
impl EvidenceProvider for DirectEvidence {
    async fn gather(&self, path: &Path) -> Evidence {
        match classify(path) {
            Some(DocumentKind::Text) => Evidence::Text(read_text(path).await),
            _ => Evidence::Images(render_document(path, self.dpi, self.max_pixels).await),
        }
    }
}

async fn read_text(path: &Path) -> String {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return String::new();
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => {
            debug!("Read {} chars of text from {}", text.len(), path.display());
            text
        }
        Err(_) => {
            warn!("{} is not valid UTF-8; treating as empty", path.display());
            String::new()
        }
    }
}
