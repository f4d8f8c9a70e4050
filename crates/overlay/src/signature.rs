//! Captured signature image and the process-wide capture slot.

use crate::{OverlayError, OverlayResult};
use serde::{Deserialize, Serialize};

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// A captured signature: encoded PNG bytes plus the pixel dimensions the
/// capture surface reported. The aspect ratio drives resize behavior of
/// every signature annotation placed from this asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureAsset {
    png: Vec<u8>,
    pixel_width: u32,
    pixel_height: u32,
}

impl SignatureAsset {
    /// Wrap an encoded PNG captured from the signature pad.
    ///
    /// Rejects byte buffers without the PNG magic header and degenerate
    /// dimensions before they can reach placement or export.
    pub fn from_png(png: Vec<u8>, pixel_width: u32, pixel_height: u32) -> OverlayResult<Self> {
        if png.len() < PNG_MAGIC.len() || !png.starts_with(&PNG_MAGIC) {
            return Err(OverlayError::InvalidSignatureImage);
        }
        if pixel_width == 0 || pixel_height == 0 {
            return Err(OverlayError::InvalidSignatureImage);
        }
        Ok(Self {
            png,
            pixel_width,
            pixel_height,
        })
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn pixel_width(&self) -> u32 {
        self.pixel_width
    }

    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    /// Width-over-height ratio of the captured image.
    pub fn aspect_ratio(&self) -> f32 {
        self.pixel_width as f32 / self.pixel_height as f32
    }

    /// Height that keeps this asset's aspect ratio at the given width.
    pub fn height_for_width(&self, width: f32) -> f32 {
        width / self.aspect_ratio()
    }
}

/// Single-slot holder for the most recently captured signature.
///
/// Overwritten on every signature-pad confirm, consumed by every
/// subsequent signature placement until replaced. Last writer wins;
/// there is no history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignatureSlot {
    current: Option<SignatureAsset>,
}

impl SignatureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents with a freshly captured asset.
    pub fn capture(&mut self, asset: SignatureAsset) {
        self.current = Some(asset);
    }

    pub fn current(&self) -> Option<&SignatureAsset> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
pub(crate) fn test_png(pixel_width: u32, pixel_height: u32) -> SignatureAsset {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(&[0; 16]);
    SignatureAsset::from_png(bytes, pixel_width, pixel_height).expect("test asset")
}
