use egui::{Pos2, Vec2};
use std::f32::consts::{FRAC_PI_6, TAU};

use super::raster::Primitive;

/// Arrowhead length in multiples of the brush size.
pub const ARROW_HEAD_SCALE: f32 = 4.0;
/// Half-angle between the arrow shaft and each barb.
pub const ARROW_HEAD_HALF_ANGLE: f32 = FRAC_PI_6;

const BEZIER_STEPS: usize = 64;

/// Shapes drawn by dragging from an anchor to the cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Rectangle,
    Square,
    Circle,
    Oval,
    Diamond,
    Arrow,
    CurvedArrow,
}

impl ShapeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ShapeKind::Rectangle => "Rectangle",
            ShapeKind::Square => "Square",
            ShapeKind::Circle => "Circle",
            ShapeKind::Oval => "Oval",
            ShapeKind::Diamond => "Diamond",
            ShapeKind::Arrow => "Arrow",
            ShapeKind::CurvedArrow => "Curved Arrow",
        }
    }

    pub fn all() -> &'static [ShapeKind] {
        &[
            ShapeKind::Rectangle,
            ShapeKind::Square,
            ShapeKind::Circle,
            ShapeKind::Oval,
            ShapeKind::Diamond,
            ShapeKind::Arrow,
            ShapeKind::CurvedArrow,
        ]
    }
}

/// Geometry of `kind` dragged from `anchor` to `cursor`, in logical space,
/// stroked at `brush` width.
pub fn shape_primitives(kind: ShapeKind, anchor: Pos2, cursor: Pos2, brush: f32) -> Vec<Primitive> {
    let (x0, y0) = (anchor.x, anchor.y);
    let dx = cursor.x - x0;
    let dy = cursor.y - y0;

    match kind {
        ShapeKind::Rectangle => vec![Primitive::closed_stroke(box_corners(anchor, dx, dy), brush)],
        ShapeKind::Square => {
            let side = square_side(dx, dy);
            vec![Primitive::closed_stroke(box_corners(anchor, side, side), brush)]
        }
        ShapeKind::Circle => {
            let r = anchor.distance(cursor);
            vec![Primitive::closed_stroke(ellipse_points(anchor, r, r), brush)]
        }
        ShapeKind::Oval => {
            let center = Pos2::new(x0 + dx / 2.0, y0 + dy / 2.0);
            vec![Primitive::closed_stroke(
                ellipse_points(center, dx.abs() / 2.0, dy.abs() / 2.0),
                brush,
            )]
        }
        ShapeKind::Diamond => {
            let verts = vec![
                Pos2::new(x0 + dx / 2.0, y0),
                Pos2::new(x0 + dx, y0 + dy / 2.0),
                Pos2::new(x0 + dx / 2.0, y0 + dy),
                Pos2::new(x0, y0 + dy / 2.0),
            ];
            vec![Primitive::closed_stroke(verts, brush)]
        }
        ShapeKind::Arrow => {
            let angle = dy.atan2(dx);
            vec![
                Primitive::stroke(vec![anchor, cursor], brush),
                Primitive::fill(arrow_head(cursor, angle, brush)),
            ]
        }
        ShapeKind::CurvedArrow => {
            let c1 = Pos2::new(x0 + dx / 4.0, y0 + dy);
            let c2 = Pos2::new(x0 + 3.0 * dx / 4.0, y0 - dy / 2.0);
            let path: Vec<Pos2> = (0..=BEZIER_STEPS)
                .map(|i| bezier_point(anchor, c1, c2, cursor, i as f32 / BEZIER_STEPS as f32))
                .collect();
            let tangent = cursor - c2;
            let angle = tangent.y.atan2(tangent.x);
            vec![
                Primitive::stroke(path, brush),
                Primitive::fill(arrow_head(cursor, angle, brush)),
            ]
        }
    }
}

/// Side length for the square tool: whichever of `dx`/`dy` has the larger
/// magnitude, sign included, used for both axes.
pub fn square_side(dx: f32, dy: f32) -> f32 {
    if dx.abs() > dy.abs() { dx } else { dy }
}

/// Triangle tip at `tip`, barbs swept back from `angle` by the half-angle.
pub fn arrow_head(tip: Pos2, angle: f32, brush: f32) -> Vec<Pos2> {
    let len = brush * ARROW_HEAD_SCALE;
    let barb = |a: f32| tip - Vec2::angled(a) * len;
    vec![
        tip,
        barb(angle - ARROW_HEAD_HALF_ANGLE),
        barb(angle + ARROW_HEAD_HALF_ANGLE),
    ]
}

/// Evaluate a cubic Bézier curve at parameter t.
pub fn bezier_point(p0: Pos2, p1: Pos2, p2: Pos2, p3: Pos2, t: f32) -> Pos2 {
    let u = 1.0 - t;
    let tt = t * t;
    let uu = u * u;
    let uuu = uu * u;
    let ttt = tt * t;
    Pos2::new(
        uuu * p0.x + 3.0 * uu * t * p1.x + 3.0 * u * tt * p2.x + ttt * p3.x,
        uuu * p0.y + 3.0 * uu * t * p1.y + 3.0 * u * tt * p2.y + ttt * p3.y,
    )
}

fn box_corners(anchor: Pos2, w: f32, h: f32) -> Vec<Pos2> {
    vec![
        anchor,
        Pos2::new(anchor.x + w, anchor.y),
        Pos2::new(anchor.x + w, anchor.y + h),
        Pos2::new(anchor.x, anchor.y + h),
    ]
}

fn ellipse_points(center: Pos2, rx: f32, ry: f32) -> Vec<Pos2> {
    let r = rx.max(ry);
    if r <= 0.0 {
        return vec![center];
    }
    let n = ((r * TAU / 3.0).ceil() as usize).clamp(24, 360);
    (0..n)
        .map(|i| {
            let a = i as f32 / n as f32 * TAU;
            Pos2::new(center.x + rx * a.cos(), center.y + ry * a.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    const EPS: f32 = 1e-3;

    fn stroke_points(p: &Primitive) -> &[Pos2] {
        match p {
            Primitive::Stroke { points, .. } => points.as_slice(),
            Primitive::Fill { points } => points.as_slice(),
        }
    }

    #[test]
    fn rectangle_corners_follow_anchor_and_cursor() {
        let prims = shape_primitives(ShapeKind::Rectangle, pos2(10.0, 20.0), pos2(40.0, 5.0), 2.0);
        assert_eq!(
            stroke_points(&prims[0]),
            &[pos2(10.0, 20.0), pos2(40.0, 20.0), pos2(40.0, 5.0), pos2(10.0, 5.0)]
        );
    }

    #[test]
    fn square_uses_dominant_operand_with_its_sign() {
        assert_eq!(square_side(30.0, 10.0), 30.0);
        assert_eq!(square_side(5.0, -20.0), -20.0);
        // Dragging up-right: both axes take dy, so the box extends left.
        let prims = shape_primitives(ShapeKind::Square, pos2(50.0, 50.0), pos2(60.0, 10.0), 1.0);
        let pts = stroke_points(&prims[0]);
        assert_eq!(pts[2], pos2(10.0, 10.0));
    }

    #[test]
    fn circle_radius_is_anchor_distance() {
        let prims = shape_primitives(ShapeKind::Circle, pos2(300.0, 300.0), pos2(350.0, 300.0), 2.0);
        for p in stroke_points(&prims[0]) {
            assert!((p.distance(pos2(300.0, 300.0)) - 50.0).abs() < EPS);
        }
    }

    #[test]
    fn oval_is_centred_in_bounding_box() {
        let prims = shape_primitives(ShapeKind::Oval, pos2(0.0, 0.0), pos2(40.0, -20.0), 1.0);
        let pts = stroke_points(&prims[0]);
        let (min_x, max_x) = pts.iter().fold((f32::MAX, f32::MIN), |(a, b), p| (a.min(p.x), b.max(p.x)));
        let (min_y, max_y) = pts.iter().fold((f32::MAX, f32::MIN), |(a, b), p| (a.min(p.y), b.max(p.y)));
        assert!((min_x - 0.0).abs() < EPS && (max_x - 40.0).abs() < EPS);
        assert!((min_y + 20.0).abs() < 0.1 && (max_y - 0.0).abs() < 0.1);
    }

    #[test]
    fn diamond_passes_through_edge_midpoints() {
        let prims = shape_primitives(ShapeKind::Diamond, pos2(0.0, 0.0), pos2(20.0, 10.0), 1.0);
        assert_eq!(
            stroke_points(&prims[0]),
            &[pos2(10.0, 0.0), pos2(20.0, 5.0), pos2(10.0, 10.0), pos2(0.0, 5.0)]
        );
    }

    #[test]
    fn arrow_head_points_back_along_shaft() {
        let prims = shape_primitives(ShapeKind::Arrow, pos2(0.0, 0.0), pos2(100.0, 0.0), 2.0);
        assert_eq!(prims.len(), 2);
        let head = stroke_points(&prims[1]);
        assert_eq!(head[0], pos2(100.0, 0.0));
        let len = 2.0 * ARROW_HEAD_SCALE;
        for barb in &head[1..] {
            assert!((barb.distance(head[0]) - len).abs() < EPS);
            assert!(barb.x < 100.0);
        }
        assert!((head[1].y + head[2].y).abs() < EPS);
    }

    #[test]
    fn curved_arrow_uses_documented_control_points() {
        let a = pos2(0.0, 0.0);
        let b = pos2(80.0, 40.0);
        let prims = shape_primitives(ShapeKind::CurvedArrow, a, b, 1.0);
        let path = stroke_points(&prims[0]);
        assert_eq!(path.first(), Some(&a));
        assert!(path.last().is_some_and(|p| p.distance(b) < EPS));
        let mid = bezier_point(a, pos2(20.0, 40.0), pos2(60.0, -20.0), b, 0.5);
        assert!(path[BEZIER_STEPS / 2].distance(mid) < EPS);
        // Head tangent from control2 (60,-20) to the end point.
        let head = stroke_points(&prims[1]);
        let dir = (b - pos2(60.0, -20.0)).normalized();
        let barb_mid = pos2((head[1].x + head[2].x) / 2.0, (head[1].y + head[2].y) / 2.0);
        let axis = (barb_mid - b).normalized();
        assert!((axis + dir).length() < 1e-2);
    }

    #[test]
    fn zero_drag_does_not_panic() {
        for &kind in ShapeKind::all() {
            let prims = shape_primitives(kind, pos2(5.0, 5.0), pos2(5.0, 5.0), 3.0);
            assert!(!prims.is_empty(), "{:?}", kind);
        }
    }
}
