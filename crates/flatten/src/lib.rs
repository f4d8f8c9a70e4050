//! Flatten and export: burn overlay annotations into the source PDF.
//!
//! The overlay model lives in display space; this crate owns the
//! one-way transform into each page's native coordinate space and the
//! lopdf plumbing that appends the drawn annotations as new content
//! streams. Delivery of the finished bytes goes through a
//! preference-ordered chain of [`DeliveryTarget`]s, and a raster
//! fallback can rebuild the output from page bitmaps when the vector
//! path fails outright.

mod delivery;
mod transform;

pub use delivery::{deliver_with_fallback, DeliveryTarget, FileTarget};
pub use transform::{flatten, rasterize_pages};

/// Errors raised on the export path.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The source bytes could not be re-parsed for mutation.
    #[error("could not load document for export: {0}")]
    DocumentLoad(#[from] lopdf::Error),

    /// A signature image could not be decoded or embedded. Isolated:
    /// the offending annotation is skipped, the export continues.
    #[error("could not embed asset on page {page}: {reason}")]
    AssetEmbed { page: usize, reason: String },

    #[error("could not serialize exported document: {0}")]
    Save(String),

    /// Raster fallback was asked to build a document with no pages.
    #[error("no page bitmaps available for raster export")]
    NoPages,

    /// Every target in the delivery chain refused the bytes.
    #[error("every delivery target failed")]
    AllTargetsFailed,
}

/// Derive the output filename: `-signed` goes in front of the `.pdf`
/// extension, matching case-insensitively.
pub fn signed_filename(source: &str) -> String {
    // `get` refuses a split inside a multi-byte character, so names
    // whose tail is not ASCII ".pdf" fall through whole.
    let stem = source
        .get(source.len().wrapping_sub(4)..)
        .filter(|suffix| suffix.eq_ignore_ascii_case(".pdf"))
        .map(|_| &source[..source.len() - 4])
        .unwrap_or(source);
    format!("{stem}-signed.pdf")
}
