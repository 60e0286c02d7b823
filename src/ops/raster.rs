//! Anti-aliased coverage rasterization for strokes and filled polygons.
//!
//! Geometry arrives in logical coordinates and is scaled to the physical
//! backing store before rasterization. Coverage from all primitives of one
//! draw call is merged with `max` so overlapping parts of a single shape
//! never double-blend.

use egui::Pos2;
use image::{Rgba, RgbaImage};
use rayon::prelude::*;

/// One drawable piece of geometry.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    /// Polyline with round caps and joins. A single point is a round dot.
    Stroke {
        points: Vec<Pos2>,
        width: f32,
        closed: bool,
    },
    /// Filled polygon (non-zero crossing rule).
    Fill { points: Vec<Pos2> },
}

impl Primitive {
    pub fn stroke(points: Vec<Pos2>, width: f32) -> Self {
        Primitive::Stroke {
            points,
            width,
            closed: false,
        }
    }

    pub fn closed_stroke(points: Vec<Pos2>, width: f32) -> Self {
        Primitive::Stroke {
            points,
            width,
            closed: true,
        }
    }

    pub fn fill(points: Vec<Pos2>) -> Self {
        Primitive::Fill { points }
    }

    fn scaled(&self, s: f32) -> Self {
        let scale = |pts: &[Pos2]| pts.iter().map(|p| Pos2::new(p.x * s, p.y * s)).collect();
        match self {
            Primitive::Stroke {
                points,
                width,
                closed,
            } => Primitive::Stroke {
                points: scale(points),
                width: width * s,
                closed: *closed,
            },
            Primitive::Fill { points } => Primitive::Fill {
                points: scale(points),
            },
        }
    }

    /// `(min_x, min_y, max_x, max_y)` including half the stroke width.
    fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let (points, pad) = match self {
            Primitive::Stroke { points, width, .. } => (points, width * 0.5),
            Primitive::Fill { points } => (points, 0.0),
        };
        let first = points.first()?;
        let mut b = (first.x, first.y, first.x, first.y);
        for p in points.iter().skip(1) {
            b.0 = b.0.min(p.x);
            b.1 = b.1.min(p.y);
            b.2 = b.2.max(p.x);
            b.3 = b.3.max(p.y);
        }
        Some((b.0 - pad, b.1 - pad, b.2 + pad, b.3 + pad))
    }
}

/// Pixel rectangle in physical layer space, `x0..x1` × `y0..y1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Per-pixel coverage in `[0, 1]` over a clipped rectangle of the layer.
#[derive(Clone, Debug)]
pub struct CoverageMask {
    pub rect: PixelRect,
    data: Vec<f32>,
}

impl CoverageMask {
    pub fn coverage_at(&self, x: u32, y: u32) -> f32 {
        let r = &self.rect;
        if x < r.x0 || x >= r.x1 || y < r.y0 || y >= r.y1 {
            return 0.0;
        }
        self.data[((y - r.y0) * r.width() + (x - r.x0)) as usize]
    }
}

// Segment capsule in physical space, pre-split for per-row culling.
struct Capsule {
    a: Pos2,
    b: Pos2,
    half: f32,
}

/// Rasterize logical-space primitives onto a `layer_w`×`layer_h` physical
/// grid at `scale` physical pixels per logical pixel. `None` when nothing
/// lands on the layer.
pub fn rasterize(
    primitives: &[Primitive],
    scale: f32,
    layer_w: u32,
    layer_h: u32,
) -> Option<CoverageMask> {
    let physical: Vec<Primitive> = primitives.iter().map(|p| p.scaled(scale)).collect();

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for b in physical.iter().filter_map(Primitive::bounds) {
        min_x = min_x.min(b.0);
        min_y = min_y.min(b.1);
        max_x = max_x.max(b.2);
        max_y = max_y.max(b.3);
    }
    if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
        return None;
    }

    // AA padding
    let x0 = ((min_x - 1.0).floor() as i64).clamp(0, layer_w as i64) as u32;
    let y0 = ((min_y - 1.0).floor() as i64).clamp(0, layer_h as i64) as u32;
    let x1 = ((max_x + 1.0).ceil() as i64).clamp(0, layer_w as i64) as u32;
    let y1 = ((max_y + 1.0).ceil() as i64).clamp(0, layer_h as i64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut capsules = Vec::new();
    let mut polygons: Vec<&[Pos2]> = Vec::new();
    for prim in &physical {
        match prim {
            Primitive::Stroke {
                points,
                width,
                closed,
            } => {
                let half = width * 0.5;
                if points.len() == 1 {
                    capsules.push(Capsule {
                        a: points[0],
                        b: points[0],
                        half,
                    });
                }
                for w in points.windows(2) {
                    capsules.push(Capsule {
                        a: w[0],
                        b: w[1],
                        half,
                    });
                }
                if *closed
                    && points.len() > 2
                    && let (Some(&first), Some(&last)) = (points.first(), points.last())
                {
                    capsules.push(Capsule {
                        a: last,
                        b: first,
                        half,
                    });
                }
            }
            Primitive::Fill { points } => {
                if points.len() >= 3 {
                    polygons.push(points);
                }
            }
        }
    }

    let rect = PixelRect { x0, y0, x1, y1 };
    let row_len = rect.width() as usize;
    let mut data = vec![0.0f32; row_len * rect.height() as usize];

    data.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(row, row_buf)| {
            let py = (y0 + row as u32) as f32 + 0.5;
            let row_capsules: Vec<&Capsule> = capsules
                .iter()
                .filter(|c| {
                    let reach = c.half + 1.0;
                    py >= c.a.y.min(c.b.y) - reach && py <= c.a.y.max(c.b.y) + reach
                })
                .collect();
            if row_capsules.is_empty() && polygons.is_empty() {
                return;
            }
            for (col, out) in row_buf.iter_mut().enumerate() {
                let px = (x0 + col as u32) as f32 + 0.5;
                let mut cov = 0.0f32;
                for c in &row_capsules {
                    let d = sdf_line_segment(px, py, c.a, c.b) - c.half;
                    cov = cov.max(smoothstep(0.5, -0.5, d));
                    if cov >= 1.0 {
                        break;
                    }
                }
                if cov < 1.0 {
                    for poly in &polygons {
                        let d = sdf_polygon(poly, px, py);
                        cov = cov.max(smoothstep(0.5, -0.5, d));
                    }
                }
                *out = cov;
            }
        });

    Some(CoverageMask { rect, data })
}

/// Source-over `color` through `mask`.
pub fn paint(layer: &mut RgbaImage, mask: &CoverageMask, color: Rgba<u8>) {
    let r = mask.rect;
    let w = layer.width() as usize;
    let span = r.width() as usize;
    let buf: &mut [u8] = layer;
    let sa_full = color[3] as f32 / 255.0;

    buf.par_chunks_mut(w * 4)
        .enumerate()
        .skip(r.y0 as usize)
        .take(r.height() as usize)
        .for_each(|(y, row)| {
            let mrow = &mask.data[(y - r.y0 as usize) * span..][..span];
            for (i, &cov) in mrow.iter().enumerate() {
                if cov <= 0.0 {
                    continue;
                }
                let idx = (r.x0 as usize + i) * 4;
                let px = &mut row[idx..idx + 4];
                let sa = sa_full * cov;
                let da = px[3] as f32 / 255.0;
                let oa = sa + da * (1.0 - sa);
                if oa <= 0.0 {
                    continue;
                }
                for c in 0..3 {
                    let s = color[c] as f32;
                    let d = px[c] as f32;
                    px[c] = ((s * sa + d * da * (1.0 - sa)) / oa).round().clamp(0.0, 255.0) as u8;
                }
                px[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        });
}

/// Destination-out through `mask`: alpha is reduced by the coverage.
pub fn erase(layer: &mut RgbaImage, mask: &CoverageMask) {
    let r = mask.rect;
    let w = layer.width() as usize;
    let span = r.width() as usize;
    let buf: &mut [u8] = layer;

    buf.par_chunks_mut(w * 4)
        .enumerate()
        .skip(r.y0 as usize)
        .take(r.height() as usize)
        .for_each(|(y, row)| {
            let mrow = &mask.data[(y - r.y0 as usize) * span..][..span];
            for (i, &cov) in mrow.iter().enumerate() {
                if cov <= 0.0 {
                    continue;
                }
                let idx = (r.x0 as usize + i) * 4;
                let a = row[idx + 3] as f32 * (1.0 - cov);
                let a = a.round().clamp(0.0, 255.0) as u8;
                row[idx + 3] = a;
                if a == 0 {
                    row[idx..idx + 3].fill(0);
                }
            }
        });
}

/// Copy `rect` from `src` into `dst`. Both images must share dimensions.
pub fn restore_region(dst: &mut RgbaImage, src: &RgbaImage, rect: PixelRect) {
    if dst.dimensions() != src.dimensions() {
        return;
    }
    let stride = dst.width() as usize * 4;
    let (a, b) = (rect.x0 as usize * 4, rect.x1 as usize * 4);
    let src_raw = src.as_raw();
    let dst_raw: &mut [u8] = dst;
    for y in rect.y0 as usize..rect.y1 as usize {
        let off = y * stride;
        dst_raw[off + a..off + b].copy_from_slice(&src_raw[off + a..off + b]);
    }
}

/// Distance to a line segment; a degenerate segment is a point.
#[inline]
fn sdf_line_segment(px: f32, py: f32, a: Pos2, b: Pos2) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 1e-12 {
        (((px - a.x) * dx + (py - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = a.x + t * dx;
    let cy = a.y + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Signed distance to a polygon, negative inside.
fn sdf_polygon(verts: &[Pos2], px: f32, py: f32) -> f32 {
    let n = verts.len();
    let mut d = (px - verts[0].x).powi(2) + (py - verts[0].y).powi(2);
    let mut s: f32 = 1.0;
    let mut j = n - 1;
    for i in 0..n {
        let ex = verts[j].x - verts[i].x;
        let ey = verts[j].y - verts[i].y;
        let wx = px - verts[i].x;
        let wy = py - verts[i].y;
        let len2 = ex * ex + ey * ey;
        let t = if len2 > 1e-12 {
            ((wx * ex + wy * ey) / len2).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let bx = wx - ex * t;
        let by = wy - ey * t;
        d = d.min(bx * bx + by * by);
        // crossing test
        let c1 = py >= verts[i].y;
        let c2 = py < verts[j].y;
        let c3 = ex * wy > ey * wx;
        if (c1 && c2 && c3) || (!c1 && !c2 && !c3) {
            s = -s;
        }
        j = i;
    }
    s * d.sqrt()
}

#[inline]
fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
