//! Overlay model: placement, drag/resize, content edits, selection and
//! the creation-only undo history.

use crate::annotation::{
    text_intrinsic_size, Annotation, AnnotationId, AnnotationKind, Position, Size, TextStyle,
    ToolKind, MIN_SIGNATURE_WIDTH, STAMP_SIZE,
};
use crate::signature::SignatureSlot;
use crate::{OverlayError, OverlayResult};
use serde::{Deserialize, Serialize};

/// Unscaled display extent of one page, the clamping rectangle for every
/// annotation the page owns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBounds {
    pub width: f32,
    pub height: f32,
}

impl PageBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// One overlay per rendered page. Annotations are kept in creation
/// order, which is also the deterministic flatten order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageOverlay {
    bounds: PageBounds,
    annotations: Vec<Annotation>,
}

/// Creation-only edit history.
///
/// In-place drag/resize mutation is deliberately not tracked; only the
/// existence of an annotation moves between the two stacks. An undone
/// creation carries the whole annotation so redo restores it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct EditHistory {
    undo: Vec<AnnotationId>,
    redo: Vec<Annotation>,
}

/// The annotation model for one open document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayModel {
    pages: Vec<PageOverlay>,
    mode: Option<ToolKind>,
    selected: Option<AnnotationId>,
    history: EditHistory,
    text_style: TextStyle,
}

impl OverlayModel {
    /// Build an empty overlay set for the given pages.
    pub fn new(bounds: impl IntoIterator<Item = PageBounds>) -> Self {
        Self {
            pages: bounds
                .into_iter()
                .map(|bounds| PageOverlay {
                    bounds,
                    annotations: Vec::new(),
                })
                .collect(),
            mode: None,
            selected: None,
            history: EditHistory::default(),
            text_style: TextStyle::default(),
        }
    }

    /// Drop every overlay and rebuild for a replacement document.
    pub fn rebuild(&mut self, bounds: impl IntoIterator<Item = PageBounds>) {
        *self = Self::new(bounds);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_bounds(&self, page_index: usize) -> OverlayResult<PageBounds> {
        self.pages
            .get(page_index)
            .map(|page| page.bounds)
            .ok_or(OverlayError::PageOutOfRange {
                page: page_index,
                page_count: self.pages.len(),
            })
    }

    /// Annotations of a page in creation order.
    pub fn annotations(&self, page_index: usize) -> &[Annotation] {
        self.pages
            .get(page_index)
            .map(|page| page.annotations.as_slice())
            .unwrap_or_default()
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.pages
            .iter()
            .flat_map(|page| page.annotations.iter())
            .find(|annotation| annotation.id == id)
    }

    /// The currently armed placement tool, if any.
    pub fn mode(&self) -> Option<ToolKind> {
        self.mode
    }

    /// Arm a placement tool; selecting the armed tool again disarms it.
    /// Changing tools drops the selection.
    pub fn toggle_mode(&mut self, tool: ToolKind) -> Option<ToolKind> {
        self.mode = if self.mode == Some(tool) {
            None
        } else {
            Some(tool)
        };
        self.selected = None;
        self.mode
    }

    /// Disarm whatever tool is active.
    pub fn clear_mode(&mut self) {
        self.mode = None;
        self.selected = None;
    }

    /// Default style applied to newly placed text annotations.
    pub fn text_style(&self) -> &TextStyle {
        &self.text_style
    }

    pub fn set_text_style(&mut self, style: TextStyle) {
        self.text_style = style;
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    /// Select one annotation, or none. Purely a highlight concern; the
    /// selection never affects geometry.
    pub fn select(&mut self, id: Option<AnnotationId>) -> OverlayResult<()> {
        if let Some(id) = id {
            if self.annotation(id).is_none() {
                return Err(OverlayError::NotFound(id));
            }
        }
        self.selected = id;
        Ok(())
    }

    /// Place a new annotation of the armed kind at a page-local point.
    ///
    /// Fails with [`OverlayError::InvalidMode`] when no tool is armed
    /// and with [`OverlayError::NoSignatureCaptured`] when a signature
    /// placement finds the capture slot empty; the caller redirects the
    /// user to the signature pad in that case.
    pub fn place(
        &mut self,
        page_index: usize,
        x: f32,
        y: f32,
        signatures: &SignatureSlot,
    ) -> OverlayResult<AnnotationId> {
        let tool = self.mode.ok_or(OverlayError::InvalidMode)?;
        let bounds = self.page_bounds(page_index)?;

        let (size, kind) = match tool {
            ToolKind::Text => {
                let style = self.text_style.clone();
                (
                    text_intrinsic_size("", &style),
                    AnnotationKind::Text {
                        content: String::new(),
                        style,
                    },
                )
            }
            ToolKind::Stamp => (Size::new(STAMP_SIZE, STAMP_SIZE), AnnotationKind::Stamp),
            ToolKind::Signature => {
                let asset = signatures
                    .current()
                    .ok_or(OverlayError::NoSignatureCaptured)?
                    .clone();
                // Half the page width is the placement hint the pad
                // promises; narrower pages shrink it further.
                let width = (bounds.width * 0.5).max(MIN_SIGNATURE_WIDTH);
                let height = asset.height_for_width(width);
                (
                    Size::new(width, height),
                    AnnotationKind::Signature { asset },
                )
            }
        };

        let annotation = Annotation::new(page_index, Position::new(x, y), size, kind);
        let id = annotation.id;

        self.pages[page_index].annotations.push(annotation);
        self.history.undo.push(id);
        self.history.redo.clear();

        Ok(id)
    }

    /// Move an annotation, clamping it fully inside its page's display
    /// bounds. The owning page never changes.
    pub fn drag(&mut self, id: AnnotationId, x: f32, y: f32) -> OverlayResult<()> {
        let (page_index, slot) = self.locate(id)?;
        let bounds = self.pages[page_index].bounds;
        let annotation = &mut self.pages[page_index].annotations[slot];

        let max_x = (bounds.width - annotation.size.width).max(0.0);
        let max_y = (bounds.height - annotation.size.height).max(0.0);
        annotation.position = Position::new(x.clamp(0.0, max_x), y.clamp(0.0, max_y));
        Ok(())
    }

    /// Resize a signature annotation by width; height follows the
    /// captured image's aspect ratio. Width never drops below
    /// [`MIN_SIGNATURE_WIDTH`].
    pub fn resize(&mut self, id: AnnotationId, new_width: f32) -> OverlayResult<()> {
        let (page_index, slot) = self.locate(id)?;
        let annotation = &mut self.pages[page_index].annotations[slot];

        let AnnotationKind::Signature { asset } = &annotation.kind else {
            return Err(OverlayError::NotResizable);
        };

        let width = new_width.max(MIN_SIGNATURE_WIDTH);
        annotation.size = Size::new(width, asset.height_for_width(width));
        Ok(())
    }

    /// Replace the content of a text annotation and recompute its
    /// intrinsic size.
    pub fn edit_content(&mut self, id: AnnotationId, text: &str) -> OverlayResult<()> {
        let (page_index, slot) = self.locate(id)?;
        let annotation = &mut self.pages[page_index].annotations[slot];

        let AnnotationKind::Text { content, style } = &mut annotation.kind else {
            return Err(OverlayError::NotEditable);
        };

        *content = text.to_owned();
        annotation.size = text_intrinsic_size(text, style);
        Ok(())
    }

    /// Remove an annotation outright. Also forgets it in the history so
    /// a later undo cannot resurrect a deleted element.
    pub fn remove(&mut self, id: AnnotationId) -> OverlayResult<Annotation> {
        let (page_index, slot) = self.locate(id)?;
        let annotation = self.pages[page_index].annotations.remove(slot);

        self.history.undo.retain(|entry| *entry != id);
        if self.selected == Some(id) {
            self.selected = None;
        }
        Ok(annotation)
    }

    /// Detach the most recent creation from its page. Returns the id of
    /// the removed annotation, or `None` when there is nothing to undo.
    pub fn undo(&mut self) -> Option<AnnotationId> {
        let id = self.history.undo.pop()?;
        let Ok((page_index, slot)) = self.locate(id) else {
            // Already removed through `remove`; nothing to detach.
            return None;
        };

        let annotation = self.pages[page_index].annotations.remove(slot);
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.history.redo.push(annotation);
        Some(id)
    }

    /// Reattach the most recently undone creation, restoring the
    /// annotation exactly as it was removed.
    pub fn redo(&mut self) -> Option<AnnotationId> {
        let annotation = self.history.redo.pop()?;
        let id = annotation.id;
        self.pages[annotation.page_index].annotations.push(annotation);
        self.history.undo.push(id);
        Some(id)
    }

    fn locate(&self, id: AnnotationId) -> OverlayResult<(usize, usize)> {
        for (page_index, page) in self.pages.iter().enumerate() {
            if let Some(slot) = page
                .annotations
                .iter()
                .position(|annotation| annotation.id == id)
            {
                return Ok((page_index, slot));
            }
        }
        Err(OverlayError::NotFound(id))
    }
}
