//! Document pipeline stages: from an uploaded file to model-ready pages.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode
//! (classify)  (pdfium)   (base64 ImageData)
//! ```
//!
//! 1. [`input`]: classify the upload (PDF, image, text) and sanitise its
//!    client-supplied name
//! 2. [`render`]: rasterise PDF pages in `spawn_blocking`; images pass
//!    through; every failure degrades to "no pages"
//! 3. [`encode`]: PNG-encode and base64-wrap each page for the multimodal
//!    request body
//!
//! The model calls themselves live in [`crate::extractor`] and
//! [`crate::reconciler`].

pub mod encode;
pub mod input;
pub mod render;
