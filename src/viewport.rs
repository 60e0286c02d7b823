//! Presentation-only zoom and pan.
//!
//! Nothing here touches logical coordinates, layer pixels or history; the
//! host applies [`ViewportController::presented_rect`] to the container that
//! shows the composite and feeds the resulting on-screen rect back into
//! [`crate::coords::client_to_logical`].

use egui::{Rect, Vec2};

use crate::settings::EditorSettings;

#[derive(Clone, Debug, PartialEq)]
pub struct ViewportController {
    zoom: f32,
    pan_offset: Vec2,
    zoom_min: f32,
    zoom_max: f32,
    zoom_step: f32,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(0.5, 3.0, 0.25)
    }
}

impl ViewportController {
    pub fn new(zoom_min: f32, zoom_max: f32, zoom_step: f32) -> Self {
        let zoom_min = zoom_min.max(0.01);
        let zoom_max = zoom_max.max(zoom_min);
        Self {
            zoom: 1.0_f32.clamp(zoom_min, zoom_max),
            pan_offset: Vec2::ZERO,
            zoom_min,
            zoom_max,
            zoom_step: zoom_step.abs().max(0.01),
        }
    }

    pub fn from_settings(settings: &EditorSettings) -> Self {
        Self::new(settings.zoom_min, settings.zoom_max, settings.zoom_step)
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan_offset(&self) -> Vec2 {
        self.pan_offset
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom + self.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom - self.zoom_step);
    }

    /// Set an absolute zoom, clamped to the configured range.
    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(self.zoom_min, self.zoom_max);
        }
    }

    pub fn reset(&mut self) {
        self.zoom = 1.0_f32.clamp(self.zoom_min, self.zoom_max);
        self.pan_offset = Vec2::ZERO;
    }

    /// Translate by a screen-space delta. Unbounded.
    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.pan_offset += delta;
        }
    }

    /// On-screen rect of the canvas: `base` (its zoom 1, unpanned rect)
    /// scaled by zoom about its centre, then translated by the pan offset.
    pub fn presented_rect(&self, base: Rect) -> Rect {
        Rect::from_center_size(base.center() + self.pan_offset, base.size() * self.zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::client_to_logical;
    use egui::{pos2, vec2};

    #[test]
    fn zoom_steps_and_clamps() {
        let mut vp = ViewportController::new(0.5, 3.0, 0.25);
        assert_eq!(vp.zoom(), 1.0);
        vp.zoom_in();
        assert!((vp.zoom() - 1.25).abs() < 1e-6);
        for _ in 0..50 {
            vp.zoom_in();
        }
        assert_eq!(vp.zoom(), 3.0);
        for _ in 0..50 {
            vp.zoom_out();
        }
        assert_eq!(vp.zoom(), 0.5);
    }

    #[test]
    fn set_zoom_ignores_nan() {
        let mut vp = ViewportController::default();
        vp.set_zoom(f32::NAN);
        assert_eq!(vp.zoom(), 1.0);
        vp.set_zoom(100.0);
        assert_eq!(vp.zoom(), 3.0);
    }

    #[test]
    fn pan_accumulates_and_reset_clears() {
        let mut vp = ViewportController::default();
        vp.pan_by(vec2(10.0, -5.0));
        vp.pan_by(vec2(40.0, 55.0));
        assert_eq!(vp.pan_offset(), vec2(50.0, 50.0));
        vp.set_zoom(2.0);
        vp.reset();
        assert_eq!(vp.pan_offset(), Vec2::ZERO);
        assert_eq!(vp.zoom(), 1.0);
    }

    #[test]
    fn presented_rect_scales_about_centre_then_pans() {
        let mut vp = ViewportController::default();
        vp.set_zoom(2.0);
        vp.pan_by(vec2(50.0, 50.0));
        let base = Rect::from_min_size(pos2(0.0, 0.0), vec2(600.0, 800.0));
        let r = vp.presented_rect(base);
        assert_eq!(r.size(), vec2(1200.0, 1600.0));
        assert_eq!(r.center(), pos2(350.0, 450.0));
    }

    #[test]
    fn viewport_changes_never_move_logical_points() {
        let logical = vec2(600.0, 800.0);
        let base = Rect::from_min_size(pos2(20.0, 20.0), logical);
        let mut vp = ViewportController::default();
        // Pointer over logical (300, 400) i.e. the canvas centre.
        let at_rest = client_to_logical(vp.presented_rect(base).center(), vp.presented_rect(base), logical);
        vp.set_zoom(2.5);
        vp.pan_by(vec2(-73.0, 12.0));
        let moved = vp.presented_rect(base);
        let zoomed = client_to_logical(moved.center(), moved, logical);
        assert!((at_rest - zoomed).length() < 1e-3);
    }
}
