//! Pointer-gesture state machine for the annotation overlay.
//!
//! Routes raw pointer events into placement, drag, resize, and pinch
//! zoom against the overlay model and the viewport engine. Screen
//! coordinates are converted to page-local units in exactly one place
//! ([`InteractionController::to_page_local`]); every read goes through
//! it.

use overmark_overlay::{AnnotationId, OverlayError, OverlayModel, OverlayResult, SignatureSlot, ToolKind};
use overmark_viewport::Viewport;
use tracing::debug;

/// Second confirming tap must arrive within this window.
const DOUBLE_TAP_WINDOW_MS: u64 = 300;

/// ...and land within this page-unit radius of the first tap.
const DOUBLE_TAP_RADIUS: f32 = 24.0;

/// Wheel step factors, one notch per event.
const WHEEL_ZOOM_IN: f32 = 1.1;
const WHEEL_ZOOM_OUT: f32 = 0.9;

/// A pointer contact in screen coordinates, paired with the screen
/// position of the hit page overlay's top-left corner.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub pointer_id: u64,
    pub x: f32,
    pub y: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub timestamp_ms: u64,
}

/// What the pointer landed on, resolved by the caller's hit test.
#[derive(Debug, Clone, Copy)]
pub enum HitTarget {
    PageBackground { page_index: usize },
    AnnotationBody { id: AnnotationId },
    ResizeHandle { id: AnnotationId },
}

/// Instruction back to the windowing layer after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureResponse {
    None,
    /// Pointer capture must be requested so the gesture keeps receiving
    /// events outside the element's bounds.
    CaptureStarted(u64),
    CaptureReleased(u64),
    Placed(AnnotationId),
    /// First tap of a two-tap placement was recorded.
    AwaitingConfirmTap,
}

/// Externally observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    PlacementArmed(ToolKind),
    Dragging(AnnotationId),
    Resizing(AnnotationId),
    PinchZooming,
}

#[derive(Debug, Clone, Copy)]
struct Contact {
    pointer_id: u64,
    x: f32,
    y: f32,
}

#[derive(Debug, Clone, Copy)]
struct PendingTap {
    page_index: usize,
    x: f32,
    y: f32,
    timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy)]
enum Gesture {
    Idle,
    Dragging {
        pointer_id: u64,
        id: AnnotationId,
        grab_x: f32,
        grab_y: f32,
    },
    Resizing {
        pointer_id: u64,
        id: AnnotationId,
        start_width: f32,
        start_x: f32,
    },
    Pinching {
        start_scale: f32,
        start_distance: f32,
    },
}

/// Drives the overlay model and viewport from pointer input.
///
/// Single-threaded by design: all mutation happens on the event
/// dispatch thread that owns the model and the viewport.
#[derive(Debug)]
pub struct InteractionController {
    gesture: Gesture,
    pending_tap: Option<PendingTap>,
    contacts: Vec<Contact>,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    pub fn new() -> Self {
        Self {
            gesture: Gesture::Idle,
            pending_tap: None,
            contacts: Vec::new(),
        }
    }

    /// Toggle a placement tool. Selecting the armed tool again disarms
    /// it. Any half-finished confirm tap is dropped.
    pub fn select_tool(&mut self, model: &mut OverlayModel, tool: ToolKind) -> Option<ToolKind> {
        self.pending_tap = None;
        model.toggle_mode(tool)
    }

    pub fn state(&self, model: &OverlayModel) -> ControllerState {
        match self.gesture {
            Gesture::Dragging { id, .. } => ControllerState::Dragging(id),
            Gesture::Resizing { id, .. } => ControllerState::Resizing(id),
            Gesture::Pinching { .. } => ControllerState::PinchZooming,
            Gesture::Idle => match model.mode() {
                Some(tool) => ControllerState::PlacementArmed(tool),
                None => ControllerState::Idle,
            },
        }
    }

    pub fn pointer_down(
        &mut self,
        model: &mut OverlayModel,
        viewport: &mut Viewport,
        signatures: &SignatureSlot,
        event: PointerEvent,
        target: HitTarget,
    ) -> OverlayResult<GestureResponse> {
        // A down for an id we already track replaces the stale contact;
        // platforms recycle pointer ids between taps.
        self.contacts
            .retain(|contact| contact.pointer_id != event.pointer_id);
        self.contacts.push(Contact {
            pointer_id: event.pointer_id,
            x: event.x,
            y: event.y,
        });

        // Two simultaneous contacts are pinch-zoom, full stop. Whatever
        // the second finger landed on is ignored.
        if self.contacts.len() >= 2 {
            return Ok(self.begin_pinch(viewport));
        }

        match target {
            HitTarget::AnnotationBody { id } => {
                model.select(Some(id))?;
                let annotation = model.annotation(id).ok_or(OverlayError::NotFound(id))?;
                let (px, py) = Self::to_page_local(viewport, &event);
                self.gesture = Gesture::Dragging {
                    pointer_id: event.pointer_id,
                    id,
                    grab_x: px - annotation.position.x,
                    grab_y: py - annotation.position.y,
                };
                viewport.suspend();
                Ok(GestureResponse::CaptureStarted(event.pointer_id))
            }
            HitTarget::ResizeHandle { id } => {
                model.select(Some(id))?;
                let annotation = model.annotation(id).ok_or(OverlayError::NotFound(id))?;
                let (px, _) = Self::to_page_local(viewport, &event);
                self.gesture = Gesture::Resizing {
                    pointer_id: event.pointer_id,
                    id,
                    start_width: annotation.size.width,
                    start_x: px,
                };
                viewport.suspend();
                Ok(GestureResponse::CaptureStarted(event.pointer_id))
            }
            HitTarget::PageBackground { page_index } => {
                self.background_tap(model, viewport, signatures, page_index, &event)
            }
        }
    }

    pub fn pointer_move(
        &mut self,
        model: &mut OverlayModel,
        viewport: &mut Viewport,
        event: PointerEvent,
    ) -> OverlayResult<GestureResponse> {
        if let Some(contact) = self
            .contacts
            .iter_mut()
            .find(|contact| contact.pointer_id == event.pointer_id)
        {
            contact.x = event.x;
            contact.y = event.y;
        }

        match self.gesture {
            Gesture::Dragging {
                pointer_id,
                id,
                grab_x,
                grab_y,
            } if pointer_id == event.pointer_id => {
                let (px, py) = Self::to_page_local(viewport, &event);
                model.drag(id, px - grab_x, py - grab_y)?;
            }
            Gesture::Resizing {
                pointer_id,
                id,
                start_width,
                start_x,
            } if pointer_id == event.pointer_id => {
                let (px, _) = Self::to_page_local(viewport, &event);
                model.resize(id, start_width + (px - start_x))?;
            }
            Gesture::Pinching {
                start_scale,
                start_distance,
            } => {
                if let Some(((ax, ay), (bx, by))) = self.pinch_points() {
                    let distance = (ax - bx).hypot(ay - by).max(1.0);
                    viewport.set_scale(
                        start_scale * distance / start_distance,
                        (ax + bx) / 2.0,
                        (ay + by) / 2.0,
                    );
                }
            }
            _ => {}
        }
        Ok(GestureResponse::None)
    }

    pub fn pointer_up(&mut self, viewport: &mut Viewport, event: &PointerEvent) -> GestureResponse {
        self.contacts
            .retain(|contact| contact.pointer_id != event.pointer_id);

        match self.gesture {
            Gesture::Dragging { pointer_id, .. } | Gesture::Resizing { pointer_id, .. }
                if pointer_id == event.pointer_id =>
            {
                self.gesture = Gesture::Idle;
                viewport.resume();
                GestureResponse::CaptureReleased(event.pointer_id)
            }
            Gesture::Pinching { .. } if self.contacts.len() < 2 => {
                // The remaining finger does not degrade into a drag.
                self.gesture = Gesture::Idle;
                GestureResponse::None
            }
            _ => GestureResponse::None,
        }
    }

    /// Cancellation tears down exactly like pointer-up.
    pub fn pointer_cancel(
        &mut self,
        viewport: &mut Viewport,
        event: &PointerEvent,
    ) -> GestureResponse {
        self.pointer_up(viewport, event)
    }

    /// One wheel notch zooms by a fixed factor around the cursor.
    pub fn wheel_zoom(
        &self,
        viewport: &mut Viewport,
        delta_y: f32,
        focal_x: f32,
        focal_y: f32,
    ) -> bool {
        let factor = if delta_y < 0.0 {
            WHEEL_ZOOM_IN
        } else {
            WHEEL_ZOOM_OUT
        };
        viewport.set_scale(viewport.scale() * factor, focal_x, focal_y)
    }

    fn background_tap(
        &mut self,
        model: &mut OverlayModel,
        viewport: &Viewport,
        signatures: &SignatureSlot,
        page_index: usize,
        event: &PointerEvent,
    ) -> OverlayResult<GestureResponse> {
        let Some(tool) = model.mode() else {
            model.select(None)?;
            return Ok(GestureResponse::None);
        };
        let (px, py) = Self::to_page_local(viewport, event);

        match tool {
            // A stamp carries no editable content, one tap suffices.
            ToolKind::Stamp => {
                let id = model.place(page_index, px, py, signatures)?;
                Ok(GestureResponse::Placed(id))
            }
            // Content-bearing kinds need a deliberate second tap so a
            // stray touch never creates one.
            ToolKind::Text | ToolKind::Signature => {
                if let Some(pending) = self.pending_tap.take() {
                    let confirms = pending.page_index == page_index
                        && event.timestamp_ms.saturating_sub(pending.timestamp_ms)
                            <= DOUBLE_TAP_WINDOW_MS
                        && (px - pending.x).hypot(py - pending.y) <= DOUBLE_TAP_RADIUS;
                    if confirms {
                        let id = model.place(page_index, px, py, signatures)?;
                        return Ok(GestureResponse::Placed(id));
                    }
                }
                self.pending_tap = Some(PendingTap {
                    page_index,
                    x: px,
                    y: py,
                    timestamp_ms: event.timestamp_ms,
                });
                Ok(GestureResponse::AwaitingConfirmTap)
            }
        }
    }

    fn begin_pinch(&mut self, viewport: &mut Viewport) -> GestureResponse {
        let released = match self.gesture {
            Gesture::Dragging { pointer_id, .. } | Gesture::Resizing { pointer_id, .. } => {
                viewport.resume();
                Some(pointer_id)
            }
            _ => None,
        };
        self.pending_tap = None;

        if let Some(((ax, ay), (bx, by))) = self.pinch_points() {
            let start_distance = (ax - bx).hypot(ay - by).max(1.0);
            debug!(start_distance, "pinch gesture started");
            self.gesture = Gesture::Pinching {
                start_scale: viewport.scale(),
                start_distance,
            };
        }

        match released {
            Some(pointer_id) => GestureResponse::CaptureReleased(pointer_id),
            None => GestureResponse::None,
        }
    }

    fn pinch_points(&self) -> Option<((f32, f32), (f32, f32))> {
        match self.contacts.as_slice() {
            [a, b, ..] => Some(((a.x, a.y), (b.x, b.y))),
            _ => None,
        }
    }

    /// Screen to page-local units: subtract the overlay's screen origin
    /// and divide by the viewport scale.
    fn to_page_local(viewport: &Viewport, event: &PointerEvent) -> (f32, f32) {
        (
            (event.x - event.origin_x) / viewport.scale(),
            (event.y - event.origin_y) / viewport.scale(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overmark_overlay::{PageBounds, SignatureAsset};

    fn model() -> OverlayModel {
        OverlayModel::new([PageBounds::new(612.0, 792.0), PageBounds::new(612.0, 792.0)])
    }

    fn viewport() -> Viewport {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.set_content_size(612.0, 1584.0);
        viewport
    }

    fn event(pointer_id: u64, x: f32, y: f32, timestamp_ms: u64) -> PointerEvent {
        PointerEvent {
            pointer_id,
            x,
            y,
            origin_x: 100.0,
            origin_y: 50.0,
            timestamp_ms,
        }
    }

    fn captured_signature() -> SignatureSlot {
        let mut png = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        png.extend_from_slice(&[0; 8]);
        let mut slot = SignatureSlot::new();
        slot.capture(SignatureAsset::from_png(png, 800, 400).expect("asset"));
        slot
    }

    #[test]
    fn tool_selection_toggles_armed_state() {
        let mut controller = InteractionController::new();
        let mut model = model();

        controller.select_tool(&mut model, ToolKind::Text);
        assert_eq!(
            controller.state(&model),
            ControllerState::PlacementArmed(ToolKind::Text)
        );

        controller.select_tool(&mut model, ToolKind::Text);
        assert_eq!(controller.state(&model), ControllerState::Idle);
    }

    #[test]
    fn stamp_places_on_a_single_tap_in_page_units() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        viewport.set_scale(2.0, 0.0, 0.0);
        let slot = SignatureSlot::new();

        controller.select_tool(&mut model, ToolKind::Stamp);
        let response = controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 150.0, 150.0, 0),
                HitTarget::PageBackground { page_index: 0 },
            )
            .expect("place");

        let GestureResponse::Placed(id) = response else {
            panic!("expected placement, got {response:?}");
        };
        let annotation = model.annotation(id).expect("annotation");
        // (150-100)/2, (150-50)/2
        assert_eq!(annotation.position.x, 25.0);
        assert_eq!(annotation.position.y, 50.0);
    }

    #[test]
    fn text_needs_a_confirming_second_tap() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = SignatureSlot::new();
        let target = HitTarget::PageBackground { page_index: 0 };

        controller.select_tool(&mut model, ToolKind::Text);
        let first = controller
            .pointer_down(&mut model, &mut viewport, &slot, event(1, 200.0, 200.0, 0), target)
            .expect("first tap");
        assert_eq!(first, GestureResponse::AwaitingConfirmTap);
        assert!(model.annotations(0).is_empty());
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 10));

        let second = controller
            .pointer_down(&mut model, &mut viewport, &slot, event(1, 205.0, 203.0, 200), target)
            .expect("second tap");
        assert!(matches!(second, GestureResponse::Placed(_)));
        assert_eq!(model.annotations(0).len(), 1);
    }

    #[test]
    fn slow_or_distant_second_tap_restarts_the_confirm_window() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = SignatureSlot::new();
        let target = HitTarget::PageBackground { page_index: 0 };
        controller.select_tool(&mut model, ToolKind::Text);

        controller
            .pointer_down(&mut model, &mut viewport, &slot, event(1, 200.0, 200.0, 0), target)
            .expect("tap");
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 5));
        // 301 ms later: too slow.
        let late = controller
            .pointer_down(&mut model, &mut viewport, &slot, event(1, 200.0, 200.0, 301), target)
            .expect("tap");
        assert_eq!(late, GestureResponse::AwaitingConfirmTap);
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 310));

        // Quick but 30 page units away: too far.
        let far = controller
            .pointer_down(&mut model, &mut viewport, &slot, event(1, 230.0, 200.0, 400), target)
            .expect("tap");
        assert_eq!(far, GestureResponse::AwaitingConfirmTap);
        assert!(model.annotations(0).is_empty());
    }

    #[test]
    fn signature_confirm_without_capture_fails_and_creates_nothing() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = SignatureSlot::new();
        let target = HitTarget::PageBackground { page_index: 1 };
        controller.select_tool(&mut model, ToolKind::Signature);

        controller
            .pointer_down(&mut model, &mut viewport, &slot, event(1, 200.0, 200.0, 0), target)
            .expect("first tap");
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 10));
        let result = controller.pointer_down(
            &mut model,
            &mut viewport,
            &slot,
            event(1, 200.0, 200.0, 100),
            target,
        );

        assert!(matches!(result, Err(OverlayError::NoSignatureCaptured)));
        assert!(model.annotations(1).is_empty());
    }

    #[test]
    fn drag_suspends_the_viewport_and_honors_the_grab_offset() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = SignatureSlot::new();

        controller.select_tool(&mut model, ToolKind::Stamp);
        let GestureResponse::Placed(id) = controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 200.0, 200.0, 0),
                HitTarget::PageBackground { page_index: 0 },
            )
            .expect("place")
        else {
            panic!("expected placement");
        };
        controller.select_tool(&mut model, ToolKind::Stamp);
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 10));

        // Grab the stamp 4 units in from its corner.
        let response = controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(2, 204.0, 204.0, 500),
                HitTarget::AnnotationBody { id },
            )
            .expect("grab");
        assert_eq!(response, GestureResponse::CaptureStarted(2));
        assert!(viewport.is_suspended());
        assert_eq!(controller.state(&model), ControllerState::Dragging(id));

        controller
            .pointer_move(&mut model, &mut viewport, event(2, 254.0, 224.0, 550))
            .expect("drag");
        let annotation = model.annotation(id).expect("annotation");
        assert_eq!(annotation.position.x, 150.0);
        assert_eq!(annotation.position.y, 170.0);

        let release = controller.pointer_up(&mut viewport, &event(2, 254.0, 224.0, 600));
        assert_eq!(release, GestureResponse::CaptureReleased(2));
        assert!(!viewport.is_suspended());
        assert_eq!(controller.state(&model), ControllerState::Idle);
    }

    #[test]
    fn resize_tracks_width_from_the_handle_grab_point() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = captured_signature();

        model.toggle_mode(ToolKind::Signature);
        let id = model.place(0, 10.0, 10.0, &slot).expect("place");
        model.clear_mode();
        let start_width = model.annotation(id).expect("annotation").size.width;

        controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 400.0, 100.0, 0),
                HitTarget::ResizeHandle { id },
            )
            .expect("grab handle");
        controller
            .pointer_move(&mut model, &mut viewport, event(1, 450.0, 100.0, 50))
            .expect("resize");

        let annotation = model.annotation(id).expect("annotation");
        assert_eq!(annotation.size.width, start_width + 50.0);
        // Aspect ratio 2:1 from the captured asset.
        assert_eq!(annotation.size.height, (start_width + 50.0) / 2.0);

        controller.pointer_up(&mut viewport, &event(1, 450.0, 100.0, 100));
    }

    #[test]
    fn second_contact_turns_any_gesture_into_pinch_zoom() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = SignatureSlot::new();

        controller.select_tool(&mut model, ToolKind::Stamp);
        let GestureResponse::Placed(id) = controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 200.0, 200.0, 0),
                HitTarget::PageBackground { page_index: 0 },
            )
            .expect("place")
        else {
            panic!("expected placement");
        };
        controller.select_tool(&mut model, ToolKind::Stamp);
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 10));

        controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 200.0, 300.0, 500),
                HitTarget::AnnotationBody { id },
            )
            .expect("grab");
        let response = controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(2, 300.0, 300.0, 520),
                HitTarget::AnnotationBody { id },
            )
            .expect("second contact");

        // Drag capture is released, the viewport runs again.
        assert_eq!(response, GestureResponse::CaptureReleased(1));
        assert!(!viewport.is_suspended());
        assert_eq!(controller.state(&model), ControllerState::PinchZooming);

        let before = model.annotation(id).expect("annotation").position;
        controller
            .pointer_move(&mut model, &mut viewport, event(2, 400.0, 300.0, 540))
            .expect("pinch");
        // Fingers doubled their distance: scale doubles, stamp stays put.
        assert!((viewport.scale() - 2.0).abs() < 1e-4);
        assert_eq!(model.annotation(id).expect("annotation").position, before);

        controller.pointer_up(&mut viewport, &event(2, 400.0, 300.0, 560));
        controller.pointer_up(&mut viewport, &event(1, 200.0, 300.0, 570));
        assert_eq!(controller.state(&model), ControllerState::Idle);
    }

    #[test]
    fn wheel_zoom_steps_by_a_fixed_factor() {
        let controller = InteractionController::new();
        let mut viewport = viewport();

        assert!(controller.wheel_zoom(&mut viewport, -1.0, 400.0, 300.0));
        assert!((viewport.scale() - 1.1).abs() < 1e-5);

        assert!(controller.wheel_zoom(&mut viewport, 1.0, 400.0, 300.0));
        assert!((viewport.scale() - 0.99).abs() < 1e-5);
    }

    #[test]
    fn tapping_empty_space_without_a_tool_clears_selection() {
        let mut controller = InteractionController::new();
        let mut model = model();
        let mut viewport = viewport();
        let slot = SignatureSlot::new();

        controller.select_tool(&mut model, ToolKind::Stamp);
        let GestureResponse::Placed(id) = controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 200.0, 200.0, 0),
                HitTarget::PageBackground { page_index: 0 },
            )
            .expect("place")
        else {
            panic!("expected placement");
        };
        controller.select_tool(&mut model, ToolKind::Stamp);
        controller.pointer_up(&mut viewport, &event(1, 200.0, 200.0, 10));
        model.select(Some(id)).expect("select");

        controller
            .pointer_down(
                &mut model,
                &mut viewport,
                &slot,
                event(1, 500.0, 500.0, 100),
                HitTarget::PageBackground { page_index: 0 },
            )
            .expect("tap");
        assert_eq!(model.selected(), None);
    }
}
