//! One open document and everything hanging off it.
//!
//! A [`Session`] owns the source bytes, the rendered page surfaces, the
//! annotation overlay, the viewport, the captured-signature slot, and
//! the gesture controller. There is exactly one session per open
//! document; replacing the document rebuilds the whole thing (and bumps
//! the render generation so stale bitmap completions get discarded).

use overmark_controller::{GestureResponse, HitTarget, InteractionController, PointerEvent};
use overmark_engine::{EngineError, PageBitmap, PageGeometry, PageSurfaceSet, Rasterizer};
use overmark_flatten::{
    deliver_with_fallback, flatten, rasterize_pages, signed_filename, DeliveryTarget, ExportError,
};
use overmark_overlay::{
    AnnotationId, OverlayModel, OverlayResult, PageBounds, SignatureAsset, SignatureSlot, ToolKind,
};
use overmark_viewport::Viewport;
use tracing::{info, warn};

/// Base scale pages are rasterized at; the viewport zooms on top.
const BASE_RENDER_SCALE: f32 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// What an export produced and where it went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub filename: String,
    /// Name of the delivery target that accepted the bytes.
    pub sink: String,
    /// True when the vector path failed and the output was rebuilt
    /// from page bitmaps.
    pub raster_fallback: bool,
}

/// Context object for one open document.
pub struct Session<R: Rasterizer> {
    rasterizer: R,
    filename: String,
    bytes: Vec<u8>,
    surfaces: PageSurfaceSet,
    model: OverlayModel,
    viewport: Viewport,
    signatures: SignatureSlot,
    controller: InteractionController,
}

impl<R: Rasterizer> Session<R> {
    /// Open a document and build its page surfaces and overlay.
    ///
    /// The byte buffer goes through the magic precheck before the
    /// rasterizer sees it; a buffer without the PDF marker fails with
    /// [`EngineError::InvalidInput`] and no engine call is made.
    pub fn open(
        mut rasterizer: R,
        filename: impl Into<String>,
        bytes: Vec<u8>,
        mut viewport: Viewport,
    ) -> Result<Self, SessionError> {
        let mut surfaces = PageSurfaceSet::new();
        surfaces.render(&mut rasterizer, &bytes, BASE_RENDER_SCALE)?;

        let model = OverlayModel::new(Self::bounds_of(&surfaces));
        let (content_width, content_height) = surfaces.content_extent();
        viewport.set_content_size(content_width, content_height);

        let filename = filename.into();
        info!(
            filename = %filename,
            pages = surfaces.page_count(),
            "document opened"
        );

        Ok(Self {
            rasterizer,
            filename,
            bytes,
            surfaces,
            model,
            viewport,
            signatures: SignatureSlot::new(),
            controller: InteractionController::new(),
        })
    }

    /// Swap in a different document.
    ///
    /// Annotations and selection are dropped with the old overlay; the
    /// captured signature survives, it belongs to the user rather than
    /// the document. In-flight bitmap completions for the old document
    /// die on the generation bump.
    pub fn replace(&mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Result<(), SessionError> {
        self.surfaces
            .render(&mut self.rasterizer, &bytes, BASE_RENDER_SCALE)?;

        self.model.rebuild(Self::bounds_of(&self.surfaces));
        let (content_width, content_height) = self.surfaces.content_extent();
        self.viewport.set_content_size(content_width, content_height);
        self.controller = InteractionController::new();
        self.filename = filename.into();
        self.bytes = bytes;

        info!(
            filename = %self.filename,
            pages = self.surfaces.page_count(),
            "document replaced"
        );
        Ok(())
    }

    /// Flatten the overlay into the document and hand the result to the
    /// delivery chain.
    ///
    /// When the vector flatten fails outright, one raster rebuild from
    /// the rendered page bitmaps is attempted before giving up. The
    /// session itself survives a failed export untouched.
    pub fn export_signed(
        &self,
        targets: &mut [Box<dyn DeliveryTarget>],
    ) -> Result<ExportOutcome, SessionError> {
        let geometries: Vec<PageGeometry> = self.surfaces.geometries().collect();

        let (output, raster_fallback) = match flatten(&self.bytes, &geometries, &self.model) {
            Ok(output) => (output, false),
            Err(error) => {
                warn!(%error, "vector flatten failed, trying raster fallback");
                (self.rasterize()?, true)
            }
        };

        let filename = signed_filename(&self.filename);
        let sink = deliver_with_fallback(targets, &filename, &output)?;
        info!(%filename, %sink, raster_fallback, "export delivered");

        Ok(ExportOutcome {
            filename,
            sink,
            raster_fallback,
        })
    }

    fn rasterize(&self) -> Result<Vec<u8>, ExportError> {
        let pages: Vec<(PageGeometry, &PageBitmap)> = (0..self.surfaces.page_count())
            .filter_map(|index| self.surfaces.page(index))
            .filter_map(|surface| {
                surface
                    .bitmap
                    .as_ref()
                    .map(|bitmap| (surface.geometry, bitmap))
            })
            .collect();
        rasterize_pages(pages)
    }

    /// One bounds slot per document page, holes included, so overlay
    /// page indices always equal document page indices. A page that
    /// failed to render gets degenerate bounds; it cannot host a
    /// meaningful placement but its siblings keep their true indices.
    fn bounds_of(surfaces: &PageSurfaceSet) -> Vec<PageBounds> {
        (0..surfaces.page_count())
            .map(|index| match surfaces.geometry(index) {
                Some(geometry) => {
                    PageBounds::new(geometry.display_width, geometry.display_height)
                }
                None => PageBounds::new(0.0, 0.0),
            })
            .collect()
    }

    /// Store a freshly captured signature for subsequent placements.
    pub fn capture_signature(&mut self, asset: SignatureAsset) {
        self.signatures.capture(asset);
    }

    pub fn signatures(&self) -> &SignatureSlot {
        &self.signatures
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn surfaces(&self) -> &PageSurfaceSet {
        &self.surfaces
    }

    pub fn surfaces_mut(&mut self) -> &mut PageSurfaceSet {
        &mut self.surfaces
    }

    pub fn model(&self) -> &OverlayModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut OverlayModel {
        &mut self.model
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn controller_state(&self) -> overmark_controller::ControllerState {
        self.controller.state(&self.model)
    }

    pub fn select_tool(&mut self, tool: ToolKind) -> Option<ToolKind> {
        self.controller.select_tool(&mut self.model, tool)
    }

    pub fn pointer_down(
        &mut self,
        event: PointerEvent,
        target: HitTarget,
    ) -> OverlayResult<GestureResponse> {
        self.controller.pointer_down(
            &mut self.model,
            &mut self.viewport,
            &self.signatures,
            event,
            target,
        )
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> OverlayResult<GestureResponse> {
        self.controller
            .pointer_move(&mut self.model, &mut self.viewport, event)
    }

    pub fn pointer_up(&mut self, event: &PointerEvent) -> GestureResponse {
        self.controller.pointer_up(&mut self.viewport, event)
    }

    pub fn pointer_cancel(&mut self, event: &PointerEvent) -> GestureResponse {
        self.controller.pointer_cancel(&mut self.viewport, event)
    }

    pub fn undo(&mut self) -> Option<AnnotationId> {
        self.model.undo()
    }

    pub fn redo(&mut self) -> Option<AnnotationId> {
        self.model.redo()
    }
}
