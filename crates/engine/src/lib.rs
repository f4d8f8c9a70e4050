//! Page surface set and the rasterizer seam.
//!
//! This crate captures per-page geometry for an open document and holds
//! the rendered page bitmaps. Actual pixel production belongs to an
//! external rasterization engine behind the [`Rasterizer`] trait; the
//! bundled [`GeometryRasterizer`] backend reads page dimensions with
//! lopdf and produces blank placeholder bitmaps, which is all the
//! geometry core needs to run and be tested.

use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use tracing::warn;

/// Rendered page pixels, RGBA8.
pub type PageBitmap = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// The 5-byte marker every PDF carries near the start of the buffer.
const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// Window at the start of the buffer scanned for the magic marker.
const MAGIC_SCAN_WINDOW: usize = 8;

/// Check for the `%PDF-` marker at any offset within the first 8 bytes.
///
/// Some producers prepend a few junk bytes before the header, so the
/// marker is scanned rather than matched at offset 0.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    let window = bytes.len().min(MAGIC_SCAN_WINDOW + PDF_MAGIC.len() - 1);
    bytes[..window]
        .windows(PDF_MAGIC.len())
        .take(MAGIC_SCAN_WINDOW)
        .any(|candidate| candidate == PDF_MAGIC)
}

/// Errors raised while building or updating the page surface set.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The byte buffer is not a PDF; rejected before any engine call.
    #[error("input is not a PDF (missing %PDF- marker)")]
    InvalidInput,

    /// The rasterization engine rejected the document outright.
    #[error("engine could not open document: {0}")]
    Open(String),

    /// A single page failed to render. Non-fatal: the page is absent
    /// and the rest of the document stays usable.
    #[error("page {page} failed to render: {reason}")]
    PageRender { page: usize, reason: String },

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
}

/// Native page extent in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

/// Per-page geometry captured at render time.
///
/// `display_*` is the unscaled on-screen size chosen when the page was
/// rendered; `native_*` comes from the source document and is fixed.
/// Both stay immutable until the document is replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub index: usize,
    pub display_width: f32,
    pub display_height: f32,
    pub native_width: f32,
    pub native_height: f32,
}

impl PageGeometry {
    /// Per-axis display-to-native scale factors `(fx, fy)`.
    ///
    /// Pages are assumed undistorted but the two factors are kept
    /// independent; nothing downstream may assume `fx == fy`.
    pub fn native_scale(&self) -> (f32, f32) {
        (
            self.native_width / self.display_width,
            self.native_height / self.display_height,
        )
    }
}

/// Seam to the external rasterization engine.
///
/// `open` consumes raw bytes and reports the page count; `page_size`
/// exposes native dimensions; `render_page` produces a complete bitmap
/// at the requested display scale.
pub trait Rasterizer {
    fn open(&mut self, bytes: &[u8]) -> Result<usize, EngineError>;
    fn page_size(&self, page_index: usize) -> Result<PageSize, EngineError>;
    fn render_page(&self, page_index: usize, scale: f32) -> Result<PageBitmap, EngineError>;
}

/// Default backend: page geometry via lopdf, blank placeholder pixels.
///
/// Real rasterization is an external collaborator; this backend keeps
/// the geometry pipeline honest about page counts and dimensions
/// without shipping a render engine.
#[derive(Debug, Default)]
pub struct GeometryRasterizer {
    sizes: Vec<PageSize>,
}

impl GeometryRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn media_box(document: &Document, page_id: ObjectId) -> Option<[f32; 4]> {
        // MediaBox may live on an ancestor Pages node; walk Parent links
        // until it turns up.
        let mut current = page_id;
        for _ in 0..32 {
            let dict = document.get_object(current).ok()?.as_dict().ok()?;
            if let Ok(value) = dict.get(b"MediaBox") {
                let array = match value {
                    Object::Reference(id) => document.get_object(*id).ok()?.as_array().ok()?,
                    other => other.as_array().ok()?,
                };
                if array.len() == 4 {
                    let mut corners = [0.0f32; 4];
                    for (slot, object) in corners.iter_mut().zip(array) {
                        *slot = match object {
                            Object::Integer(value) => *value as f32,
                            Object::Real(value) => *value as f32,
                            _ => return None,
                        };
                    }
                    return Some(corners);
                }
                return None;
            }
            match dict.get(b"Parent") {
                Ok(Object::Reference(id)) => current = *id,
                _ => return None,
            }
        }
        None
    }
}

/// US Letter, the fallback when a page carries no resolvable MediaBox.
const FALLBACK_PAGE: PageSize = PageSize {
    width_pt: 612.0,
    height_pt: 792.0,
};

impl Rasterizer for GeometryRasterizer {
    fn open(&mut self, bytes: &[u8]) -> Result<usize, EngineError> {
        let document = Document::load_mem(bytes).map_err(|e| EngineError::Open(e.to_string()))?;

        self.sizes = document
            .get_pages()
            .values()
            .map(|page_id| {
                Self::media_box(&document, *page_id)
                    .map(|[x0, y0, x1, y1]| PageSize {
                        width_pt: (x1 - x0).abs(),
                        height_pt: (y1 - y0).abs(),
                    })
                    .unwrap_or(FALLBACK_PAGE)
            })
            .collect();

        if self.sizes.is_empty() {
            return Err(EngineError::Open("document has no pages".to_owned()));
        }
        Ok(self.sizes.len())
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize, EngineError> {
        self.sizes
            .get(page_index)
            .copied()
            .ok_or(EngineError::PageOutOfRange {
                page: page_index,
                page_count: self.sizes.len(),
            })
    }

    fn render_page(&self, page_index: usize, scale: f32) -> Result<PageBitmap, EngineError> {
        let size = self.page_size(page_index)?;
        let width = (size.width_pt * scale).round().max(1.0) as u32;
        let height = (size.height_pt * scale).round().max(1.0) as u32;
        Ok(ImageBuffer::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ))
    }
}

/// One rendered page: geometry plus (optionally, once the decode worker
/// delivers it) the bitmap.
#[derive(Debug)]
pub struct PageSurface {
    pub geometry: PageGeometry,
    pub bitmap: Option<PageBitmap>,
}

/// Ordered set of rendered page surfaces for the open document.
///
/// Rebuilt wholesale when the document is replaced. Each rebuild bumps
/// a generation counter; bitmap completions arriving from a superseded
/// render are recognized by their stale generation and discarded.
#[derive(Debug, Default)]
pub struct PageSurfaceSet {
    generation: u64,
    pages: Vec<Option<PageSurface>>,
}

impl PageSurfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture geometry for every page of `bytes`, replacing whatever
    /// was rendered before.
    ///
    /// The magic precheck runs before the rasterizer sees the buffer.
    /// A page whose size or render fails is logged and left absent; the
    /// rest of the document stays usable. Returns the new generation.
    pub fn render<R: Rasterizer>(
        &mut self,
        rasterizer: &mut R,
        bytes: &[u8],
        display_scale: f32,
    ) -> Result<u64, EngineError> {
        if !has_pdf_magic(bytes) {
            return Err(EngineError::InvalidInput);
        }

        let page_count = rasterizer.open(bytes)?;

        self.generation += 1;
        self.pages.clear();

        for index in 0..page_count {
            let surface = Self::render_one(rasterizer, index, display_scale);
            if surface.is_none() {
                warn!(page = index, "skipping page that failed to render");
            }
            self.pages.push(surface);
        }

        Ok(self.generation)
    }

    fn render_one<R: Rasterizer>(
        rasterizer: &mut R,
        index: usize,
        display_scale: f32,
    ) -> Option<PageSurface> {
        let size = rasterizer.page_size(index).ok()?;
        let bitmap = rasterizer.render_page(index, display_scale).ok()?;

        Some(PageSurface {
            geometry: PageGeometry {
                index,
                display_width: size.width_pt * display_scale,
                display_height: size.height_pt * display_scale,
                native_width: size.width_pt,
                native_height: size.height_pt,
            },
            bitmap: Some(bitmap),
        })
    }

    /// Drop all surfaces, invalidating in-flight completions.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.pages.clear();
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Total page slots, including absent pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&PageSurface> {
        self.pages.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn geometry(&self, index: usize) -> Option<PageGeometry> {
        self.page(index).map(|surface| surface.geometry)
    }

    /// Geometries of every present page, in page order.
    pub fn geometries(&self) -> impl Iterator<Item = PageGeometry> + '_ {
        self.pages
            .iter()
            .filter_map(|slot| slot.as_ref().map(|surface| surface.geometry))
    }

    /// Unscaled display extent of the whole page stack: widest page by
    /// summed heights.
    pub fn content_extent(&self) -> (f32, f32) {
        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        for geometry in self.geometries() {
            width = width.max(geometry.display_width);
            height += geometry.display_height;
        }
        (width, height)
    }

    /// Accept a bitmap produced by the background decode worker.
    ///
    /// Completions tagged with a superseded generation (the document
    /// was replaced while the worker ran) are discarded. Returns
    /// whether the bitmap was accepted.
    pub fn complete_render(
        &mut self,
        generation: u64,
        page_index: usize,
        bitmap: PageBitmap,
    ) -> bool {
        if generation != self.generation {
            warn!(
                generation,
                current = self.generation,
                page = page_index,
                "discarding stale page bitmap"
            );
            return false;
        }
        match self.pages.get_mut(page_index).and_then(Option::as_mut) {
            Some(surface) => {
                surface.bitmap = Some(bitmap);
                true
            }
            None => false,
        }
    }
}
