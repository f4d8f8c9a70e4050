//! Annotation overlay model.
//!
//! Per-page collections of positioned, resizable, stylable elements
//! (text, checkmark stamps, raster signatures) living on top of rendered
//! pages. All coordinates accepted and returned here are page-local,
//! unscaled display units; converting raw pointer coordinates is the
//! interaction controller's job.

pub mod annotation;
pub mod model;
pub mod signature;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, Color, Position, Size, TextStyle, ToolKind,
    MIN_SIGNATURE_WIDTH, STAMP_SIZE,
};
pub use model::{OverlayModel, PageBounds};
pub use signature::{SignatureAsset, SignatureSlot};

/// Errors raised by overlay operations.
///
/// `InvalidMode` and `NoSignatureCaptured` are user-sequencing errors:
/// recoverable conditions the caller surfaces as a prompt, not crashes.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("no placement tool is armed")]
    InvalidMode,
    #[error("no signature has been captured yet")]
    NoSignatureCaptured,
    #[error("signature image is not a valid PNG")]
    InvalidSignatureImage,
    #[error("unknown annotation {0}")]
    NotFound(AnnotationId),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("only signature annotations can be resized")]
    NotResizable,
    #[error("only text annotations have editable content")]
    NotEditable,
}

/// Result type for overlay operations.
pub type OverlayResult<T> = Result<T, OverlayError>;
