//! Input classification: decide how a submitted file becomes evidence.
//!
//! Uploads arrive with a client-chosen name. Before anything touches the
//! filesystem the name is reduced to a single safe path component, and
//! before rendering the file is classified into a [`DocumentKind`] from its
//! extension, falling back to magic-byte sniffing for extensionless names.

use std::path::Path;
use tracing::debug;

/// Longest filename kept after sanitising, in characters.
const MAX_FILENAME_CHARS: usize = 100;

/// What kind of document a submitted file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A PDF: every page is rasterised.
    Pdf,
    /// A raster image: passed through as the single page.
    Image,
    /// Plain text: sent to the model as text, not pixels.
    Text,
}

impl DocumentKind {
    /// Classify from a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "png" | "jpg" | "jpeg" | "gif" => Some(DocumentKind::Image),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }

    /// Classify from the first bytes of the file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(DocumentKind::Pdf);
        }
        if image::guess_format(bytes).is_ok() {
            return Some(DocumentKind::Image);
        }
        None
    }
}

/// Classify the file at `path`.
///
/// The extension wins when it is known; otherwise the first bytes are
/// sniffed. Returns `None` for anything unreadable or unrecognised.
pub fn classify(path: &Path) -> Option<DocumentKind> {
    if let Some(kind) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(DocumentKind::from_extension)
    {
        return Some(kind);
    }

    let bytes = std::fs::read(path).ok()?;
    let kind = DocumentKind::sniff(&bytes);
    debug!("Sniffed {} as {:?}", path.display(), kind);
    kind
}

/// Reduce a client-supplied filename to one safe path component.
///
/// Directory parts are discarded, anything outside `[A-Za-z0-9._-]` (and
/// other alphanumerics) becomes `_`, `..` sequences are removed, and the
/// result is capped at 100 characters. An empty result becomes `document`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let sanitized: String = base
        .chars()
        .filter(|&c| c != '\0')
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.replace("..", "");
    let sanitized: String = sanitized.chars().take(MAX_FILENAME_CHARS).collect();
    let sanitized = sanitized.trim_start_matches('.').to_string();

    if sanitized.is_empty() {
        "document".into()
    } else {
        sanitized
    }
}
