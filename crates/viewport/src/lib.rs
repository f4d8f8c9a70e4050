//! Zoom and scroll state for a clipped document viewport.
//!
//! The viewport owns a single uniform scale factor applied to the whole
//! page stack plus the scroll offsets of the clipped scroll area. Zoom
//! gestures go through [`Viewport::set_scale`], which keeps the content
//! point under the gesture focal point visually stationary, including the
//! centering gutter that appears when the scaled content is narrower or
//! shorter than the viewport.
//!
//! All content coordinates handled here are unscaled display units; the
//! scale is applied on the way to screen space and divided out on the way
//! back.

use serde::{Deserialize, Serialize};

/// A point in screen space, relative to the scroll area origin.
pub type ScreenPoint = (f32, f32);

/// A point in unscaled content space.
pub type ContentPoint = (f32, f32);

/// Allowed zoom range for gesture-driven scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
}

impl ZoomLimits {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamp a requested scale into the allowed range.
    pub fn clamp(&self, scale: f32) -> f32 {
        scale.clamp(self.min, self.max)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.6, max: 3.0 }
    }
}

/// Layout policy for the horizontal axis.
///
/// The two variants are mutually exclusive UX directions, not a
/// progression; callers pick one when constructing the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisPolicy {
    /// Both axes scroll freely and reconcile the focal point.
    FreePan,
    /// The horizontal axis is always centered and never reconciles the
    /// focal point, avoiding sideways drift on narrow single-column
    /// layouts. Only the vertical axis follows the gesture.
    LockHorizontal,
}

/// Viewport transform state.
///
/// Invariants:
/// - `limits.min <= scale <= limits.max`
/// - scroll offsets stay within `[0, content_extent - viewport_extent]`
///   per axis; when the scaled content does not overflow an axis, that
///   axis's offset is 0 and a centering gutter takes over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    scale: f32,
    scroll_x: f32,
    scroll_y: f32,
    viewport_width: f32,
    viewport_height: f32,
    content_width: f32,
    content_height: f32,
    limits: ZoomLimits,
    policy: AxisPolicy,
    suspended: bool,
}

impl Viewport {
    /// Create a viewport with the given clip extent, default zoom limits
    /// and free panning on both axes.
    pub fn new(viewport_width: f32, viewport_height: f32) -> Self {
        Self {
            scale: 1.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
            viewport_width,
            viewport_height,
            content_width: 0.0,
            content_height: 0.0,
            limits: ZoomLimits::default(),
            policy: AxisPolicy::FreePan,
            suspended: false,
        }
    }

    /// Set the axis layout policy.
    pub fn with_policy(mut self, policy: AxisPolicy) -> Self {
        self.policy = policy;
        self.reclamp();
        self
    }

    /// Set custom zoom limits.
    pub fn with_limits(mut self, limits: ZoomLimits) -> Self {
        self.limits = limits;
        self.scale = limits.clamp(self.scale);
        self.reclamp();
        self
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn scroll(&self) -> (f32, f32) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    pub fn policy(&self) -> AxisPolicy {
        self.policy
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Suspend gesture-driven zooming. While suspended, `set_scale` is a
    /// no-op; used by the interaction controller for the duration of a
    /// drag or resize that shares pointers with a potential pinch.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resume gesture-driven zooming.
    pub fn resume(&mut self) {
        self.suspended = false;
    }

    /// Update the unscaled content extent (e.g. after a document render),
    /// re-clamping scroll offsets to the new bounds.
    pub fn set_content_size(&mut self, width: f32, height: f32) {
        self.content_width = width;
        self.content_height = height;
        self.reclamp();
    }

    /// Update the clip extent (e.g. after a window resize), re-clamping
    /// scroll offsets to the new bounds.
    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        self.viewport_width = width;
        self.viewport_height = height;
        self.reclamp();
    }

    fn scaled_width(&self) -> f32 {
        self.content_width * self.scale
    }

    fn scaled_height(&self) -> f32 {
        self.content_height * self.scale
    }

    fn max_scroll_x(&self) -> f32 {
        (self.scaled_width() - self.viewport_width).max(0.0)
    }

    fn max_scroll_y(&self) -> f32 {
        (self.scaled_height() - self.viewport_height).max(0.0)
    }

    /// Centering gutter on the horizontal axis, non-zero only when the
    /// scaled content is narrower than the viewport.
    pub fn gutter_x(&self) -> f32 {
        ((self.viewport_width - self.scaled_width()) / 2.0).max(0.0)
    }

    /// Centering gutter on the vertical axis.
    pub fn gutter_y(&self) -> f32 {
        ((self.viewport_height - self.scaled_height()) / 2.0).max(0.0)
    }

    /// Scroll offset that centers the horizontal overflow, 0 when the
    /// content does not overflow.
    fn centered_scroll_x(&self) -> f32 {
        self.max_scroll_x() / 2.0
    }

    /// Convert a screen point (relative to the scroll area origin) into
    /// unscaled content space under the current scale and offsets.
    pub fn screen_to_content(&self, screen: ScreenPoint) -> ContentPoint {
        (
            (self.scroll_x + screen.0 - self.gutter_x()) / self.scale,
            (self.scroll_y + screen.1 - self.gutter_y()) / self.scale,
        )
    }

    /// Convert an unscaled content point back to screen space.
    pub fn content_to_screen(&self, content: ContentPoint) -> ScreenPoint {
        (
            content.0 * self.scale - self.scroll_x + self.gutter_x(),
            content.1 * self.scale - self.scroll_y + self.gutter_y(),
        )
    }

    /// Apply a new scale while keeping the content point under
    /// `(focal_x, focal_y)` stationary on screen.
    ///
    /// The requested scale is clamped into the zoom limits. Returns
    /// `true` when the scale changed; an already-applied scale or a
    /// suspended viewport leaves the state untouched.
    pub fn set_scale(&mut self, requested: f32, focal_x: f32, focal_y: f32) -> bool {
        if self.suspended {
            return false;
        }

        let next = self.limits.clamp(requested);
        if next == self.scale {
            return false;
        }

        let (content_x, content_y) = self.screen_to_content((focal_x, focal_y));

        self.scale = next;

        self.scroll_x = content_x * self.scale - focal_x + self.gutter_x();
        self.scroll_y = content_y * self.scale - focal_y + self.gutter_y();
        self.reclamp();

        true
    }

    /// Scroll to an absolute offset, clamped to the content bounds.
    pub fn scroll_to(&mut self, x: f32, y: f32) {
        self.scroll_x = x;
        self.scroll_y = y;
        self.reclamp();
    }

    /// Center the horizontal overflow and reset vertical scroll when the
    /// content fits; used after a render or window resize.
    pub fn center_horizontally(&mut self) {
        self.scroll_x = self.centered_scroll_x();
        if self.scaled_height() <= self.viewport_height {
            self.scroll_y = 0.0;
        }
    }

    fn reclamp(&mut self) {
        self.scroll_x = self.scroll_x.clamp(0.0, self.max_scroll_x());
        self.scroll_y = self.scroll_y.clamp(0.0, self.max_scroll_y());

        // A non-overflowing axis is pinned at 0; the gutter handles
        // centering from there.
        if self.scaled_width() <= self.viewport_width {
            self.scroll_x = 0.0;
        }
        if self.scaled_height() <= self.viewport_height {
            self.scroll_y = 0.0;
        }

        if self.policy == AxisPolicy::LockHorizontal {
            self.scroll_x = self.centered_scroll_x();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport_with_content() -> Viewport {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.set_content_size(1000.0, 2000.0);
        viewport
    }

    #[test]
    fn focal_point_is_stationary_across_zoom() {
        let mut viewport = viewport_with_content();
        viewport.scroll_to(100.0, 400.0);

        let focal = (400.0, 300.0);
        let before = viewport.screen_to_content(focal);

        assert!(viewport.set_scale(2.0, focal.0, focal.1));

        let after = viewport.screen_to_content(focal);
        assert!((before.0 - after.0).abs() < 1e-3);
        assert!((before.1 - after.1).abs() < 1e-3);
    }

    #[test]
    fn focal_point_survives_a_zoom_sequence() {
        let mut viewport = viewport_with_content();
        let focal = (650.0, 120.0);
        let anchor = viewport.screen_to_content(focal);

        for requested in [1.4, 2.2, 1.1, 2.9] {
            viewport.set_scale(requested, focal.0, focal.1);
            let now = viewport.screen_to_content(focal);
            assert!((anchor.0 - now.0).abs() < 1e-2);
            assert!((anchor.1 - now.1).abs() < 1e-2);
        }
    }

    #[test]
    fn repeated_scale_is_a_no_op() {
        let mut viewport = viewport_with_content();
        assert!(viewport.set_scale(1.5, 400.0, 300.0));

        let snapshot = viewport.clone();
        assert!(!viewport.set_scale(1.5, 12.0, 740.0));
        assert_eq!(viewport, snapshot);
    }

    #[test]
    fn requested_scale_is_clamped_to_limits() {
        let mut viewport = viewport_with_content();

        viewport.set_scale(10.0, 0.0, 0.0);
        assert_eq!(viewport.scale(), 3.0);

        viewport.set_scale(0.01, 0.0, 0.0);
        assert_eq!(viewport.scale(), 0.6);
    }

    #[test]
    fn suspended_viewport_ignores_zoom() {
        let mut viewport = viewport_with_content();
        viewport.suspend();

        assert!(!viewport.set_scale(2.0, 400.0, 300.0));
        assert_eq!(viewport.scale(), 1.0);

        viewport.resume();
        assert!(viewport.set_scale(2.0, 400.0, 300.0));
    }

    #[test]
    fn gutter_centers_undersized_content() {
        let mut viewport = Viewport::new(800.0, 600.0);
        viewport.set_content_size(400.0, 300.0);

        assert_eq!(viewport.gutter_x(), 200.0);
        assert_eq!(viewport.gutter_y(), 150.0);

        let origin = viewport.screen_to_content((200.0, 150.0));
        assert!((origin.0).abs() < 1e-6);
        assert!((origin.1).abs() < 1e-6);
    }

    #[test]
    fn zooming_out_resets_non_overflowing_axes() {
        let mut viewport = viewport_with_content();
        viewport.set_scale(2.0, 400.0, 300.0);
        viewport.scroll_to(600.0, 1500.0);

        // 1000 * 0.7 = 700 < 800, so the horizontal axis stops
        // overflowing and must snap back to 0.
        viewport.set_scale(0.7, 400.0, 300.0);
        assert_eq!(viewport.scroll().0, 0.0);
    }

    #[test]
    fn scroll_is_clamped_to_content_bounds() {
        let mut viewport = viewport_with_content();
        viewport.set_scale(2.0, 0.0, 0.0);

        viewport.scroll_to(1e6, 1e6);
        let (x, y) = viewport.scroll();
        assert_eq!(x, 1000.0 * 2.0 - 800.0);
        assert_eq!(y, 2000.0 * 2.0 - 600.0);

        viewport.scroll_to(-50.0, -50.0);
        assert_eq!(viewport.scroll(), (0.0, 0.0));
    }

    #[test]
    fn locked_axis_stays_centered_through_zoom() {
        let mut viewport = Viewport::new(800.0, 600.0).with_policy(AxisPolicy::LockHorizontal);
        viewport.set_content_size(1000.0, 2000.0);

        viewport.set_scale(2.0, 10.0, 10.0);
        let expected = (1000.0 * 2.0 - 800.0) / 2.0;
        assert_eq!(viewport.scroll().0, expected);

        // Focal point far to the right must not drag the axis sideways.
        viewport.set_scale(2.5, 790.0, 10.0);
        let expected = (1000.0 * 2.5 - 800.0) / 2.0;
        assert_eq!(viewport.scroll().0, expected);
    }

    #[test]
    fn locked_axis_still_reconciles_vertically() {
        let mut viewport = Viewport::new(800.0, 600.0).with_policy(AxisPolicy::LockHorizontal);
        viewport.set_content_size(1000.0, 2000.0);
        viewport.scroll_to(0.0, 500.0);

        let focal = (400.0, 300.0);
        let before_y = viewport.screen_to_content(focal).1;
        viewport.set_scale(1.8, focal.0, focal.1);
        let after_y = viewport.screen_to_content(focal).1;

        assert!((before_y - after_y).abs() < 1e-3);
    }

    #[test]
    fn center_horizontally_balances_overflow() {
        let mut viewport = viewport_with_content();
        viewport.set_scale(2.0, 0.0, 0.0);
        viewport.center_horizontally();

        assert_eq!(viewport.scroll().0, (2000.0 - 800.0) / 2.0);
    }

    #[test]
    fn round_trip_through_screen_space() {
        let mut viewport = viewport_with_content();
        viewport.set_scale(1.7, 200.0, 200.0);
        viewport.scroll_to(40.0, 900.0);

        let content = (123.0, 456.0);
        let screen = viewport.content_to_screen(content);
        let back = viewport.screen_to_content(screen);

        assert!((back.0 - content.0).abs() < 1e-3);
        assert!((back.1 - content.1).abs() < 1e-3);
    }
}
