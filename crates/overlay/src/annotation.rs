//! Annotation entities and their payload variants.

use crate::signature::SignatureAsset;
use serde::{Deserialize, Serialize};

/// Unique identifier for an annotation, stable for the lifetime of the
/// open document.
pub type AnnotationId = uuid::Uuid;

/// Fixed edge length of a checkmark stamp, in display units.
pub const STAMP_SIZE: f32 = 24.0;

/// Smallest width a signature can be resized to, in display units.
pub const MIN_SIGNATURE_WIDTH: f32 = 24.0;

/// RGB color, stored as 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse a `#rgb` or `#rrggbb` hex color. Anything else resolves to
    /// black, matching how an unset style falls back.
    pub fn from_hex(hex: &str) -> Self {
        let digits = hex.trim_start_matches('#');
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Color::BLACK;
        }
        match digits.len() {
            3 => {
                let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).unwrap_or(0);
                Color {
                    r: nibble(0) * 17,
                    g: nibble(1) * 17,
                    b: nibble(2) * 17,
                }
            }
            6 => {
                let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).unwrap_or(0);
                Color {
                    r: byte(0),
                    g: byte(2),
                    b: byte(4),
                }
            }
            _ => Color::BLACK,
        }
    }

    /// Normalized channels in `0.0..=1.0`, the range PDF color operators
    /// expect.
    pub fn to_normalized(self) -> (f32, f32, f32) {
        (
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        )
    }
}

/// Style applied to a text annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Font size in display points.
    pub font_size_pt: f32,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub family: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size_pt: 16.0,
            color: Color::BLACK,
            bold: false,
            italic: false,
            family: "Arial, sans-serif".to_owned(),
        }
    }
}

/// Top-left position in page-local, unscaled display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Extent in page-local, unscaled display units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// The three placement tools a user can arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    Text,
    Stamp,
    Signature,
}

/// Variant payload of an annotation.
///
/// Kind is an explicit tagged union; nothing in the codebase dispatches
/// on names or styling to discover what an element is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationKind {
    /// Single-line editable text. Size is intrinsic: it tracks the
    /// content and is not user-resizable.
    Text { content: String, style: TextStyle },

    /// Fixed-size checkmark glyph with no payload.
    Stamp,

    /// Raster signature image. Width drives height through the captured
    /// image's pixel aspect ratio.
    Signature { asset: SignatureAsset },
}

impl AnnotationKind {
    pub fn tool(&self) -> ToolKind {
        match self {
            AnnotationKind::Text { .. } => ToolKind::Text,
            AnnotationKind::Stamp => ToolKind::Stamp,
            AnnotationKind::Signature { .. } => ToolKind::Signature,
        }
    }
}

/// A positioned overlay element owned by a single page.
///
/// `page_index` is immutable after creation; position and size are
/// always expressed in the same unscaled unit as the page's display
/// dimensions, with the viewport scale divided out before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page_index: usize,
    pub position: Position,
    pub size: Size,
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn new(page_index: usize, position: Position, size: Size, kind: AnnotationKind) -> Self {
        Self {
            id: AnnotationId::new_v4(),
            page_index,
            position,
            size,
            kind,
        }
    }
}

/// Intrinsic extent of a single line of text.
///
/// The rendering surface is not available to the model, so layout is
/// approximated from the glyph count: average advance of roughly 0.6 em
/// and a 1.25 line height. The same operation that edits content keeps
/// the stored size in step, so geometry stays testable without a DOM.
pub fn text_intrinsic_size(content: &str, style: &TextStyle) -> Size {
    let glyphs = content.chars().count().max(1) as f32;
    Size::new(glyphs * style.font_size_pt * 0.6, style.font_size_pt * 1.25)
}
