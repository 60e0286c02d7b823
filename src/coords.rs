//! Pointer → logical canvas coordinate mapping.
//!
//! The host reports pointer positions in client (screen) space together with
//! the canvas element's current on-screen bounding rect. That rect already
//! includes any presentation zoom/pan, so dividing by its per-axis scale gives
//! logical coordinates that do not depend on the viewport.

use egui::{Pos2, Rect, Vec2};

/// Map a client-space point to logical canvas space.
///
/// `logical = (client − rect.min) / (rect.size / logical_size)`.
/// A degenerate rect (zero or negative area, e.g. a detached element) or an
/// empty logical size maps everything to `(0, 0)`.
pub fn client_to_logical(client: Pos2, bounds: Rect, logical_size: Vec2) -> Pos2 {
    let Some(scale) = axis_scale(bounds, logical_size) else {
        return Pos2::ZERO;
    };
    Pos2::new(
        (client.x - bounds.min.x) / scale.x,
        (client.y - bounds.min.y) / scale.y,
    )
}

/// Inverse of [`client_to_logical`], for hosts placing overlays.
pub fn logical_to_client(logical: Pos2, bounds: Rect, logical_size: Vec2) -> Pos2 {
    let Some(scale) = axis_scale(bounds, logical_size) else {
        return bounds.min;
    };
    Pos2::new(
        bounds.min.x + logical.x * scale.x,
        bounds.min.y + logical.y * scale.y,
    )
}

/// The point that drives drawing for a touch event: the first contact.
pub fn primary_touch(touches: &[Pos2]) -> Option<Pos2> {
    touches.first().copied()
}

fn axis_scale(bounds: Rect, logical_size: Vec2) -> Option<Vec2> {
    let (w, h) = (bounds.width(), bounds.height());
    if !(w > 0.0 && h > 0.0 && logical_size.x > 0.0 && logical_size.y > 0.0) {
        return None;
    }
    Some(Vec2::new(w / logical_size.x, h / logical_size.y))
}
