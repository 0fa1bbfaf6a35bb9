//! Mask geometry for the dimming layer
//!
//! This module contains the math shared between the overlay (which hands the
//! polygon to a renderer) and image rendering (tiny-skia).

use crate::domain::{Point, Rect, SelectionRegion, Shape, Viewport};

/// Ellipse sampling constants
pub mod ellipse {
    /// Default number of polygon segments for an oval hole
    pub const DEFAULT_SEGMENTS: usize = 64;
    /// Fewest segments that still read as an ellipse
    pub const MIN_SEGMENTS: usize = 8;
    /// Upper bound to keep the polygon small
    pub const MAX_SEGMENTS: usize = 256;
}

/// Calculate ellipse center and radii from a bounding box
#[inline]
pub fn ellipse_from_bounds(r: &Rect) -> (f64, f64, f64, f64) {
    let c = r.center();
    (c.x, c.y, r.width * 0.5, r.height * 0.5)
}

/// Sample an ellipse inscribed in `r` as a closed polygon.
///
/// Points run counter-clockwise (in screen coordinates, y pointing down) and
/// the first point is repeated at the end.
pub fn sample_ellipse(r: &Rect, segments: usize) -> Vec<Point> {
    let segments = segments.clamp(ellipse::MIN_SEGMENTS, ellipse::MAX_SEGMENTS);
    let (cx, cy, rx, ry) = ellipse_from_bounds(r);
    let step = std::f64::consts::TAU / segments as f64;
    let mut points: Vec<Point> = (0..segments)
        .map(|i| {
            let angle = -(i as f64) * step;
            Point::new(cx + rx * angle.cos(), cy + ry * angle.sin())
        })
        .collect();
    points.push(points[0]);
    points
}

/// Inverse mask covering everything outside the selection.
///
/// Stored as one polygon: the outer boundary clockwise, a bridge into the
/// hole, the hole counter-clockwise, and the bridge back. Filled with the
/// even-odd rule (or non-zero, since the windings oppose) the hole stays clear.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskPath {
    pub points: Vec<Point>,
    /// Number of leading points that belong to the outer boundary
    pub outer_len: usize,
}

impl MaskPath {
    /// Points of the hole (excluding the bridge back to the outer boundary)
    pub fn hole(&self) -> &[Point] {
        &self.points[self.outer_len..self.points.len() - 1]
    }

    /// Render as a CSS `clip-path` polygon
    pub fn to_css_polygon(&self) -> String {
        let coords: Vec<String> = self
            .points
            .iter()
            .map(|p| format!("{}px {}px", fmt_coord(p.x), fmt_coord(p.y)))
            .collect();
        format!("polygon(evenodd, {})", coords.join(", "))
    }

    /// Even-odd point-in-polygon test; true where the dimming layer paints
    pub fn covers(&self, p: Point) -> bool {
        let pts = &self.points;
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (a, b) = (pts[i], pts[j]);
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

fn fmt_coord(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded}")
    }
}

/// Build the dimming mask for `region` over the visible viewport.
///
/// The region is given in document coordinates; the mask is in viewport
/// coordinates because the dimming layer is fixed to the viewport.
pub fn mask_path(region: &SelectionRegion, viewport: &Viewport, segments: usize) -> MaskPath {
    let hole_rect = viewport.rect_to_viewport(region.rect);
    let (w, h) = (viewport.width, viewport.height);

    let mut points = vec![
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(w, h),
        Point::new(0.0, h),
        Point::new(0.0, 0.0),
    ];
    let outer_len = points.len();

    match region.shape {
        Shape::Rectangle => {
            let (l, t, r, b) = (
                hole_rect.left,
                hole_rect.top,
                hole_rect.right(),
                hole_rect.bottom(),
            );
            points.extend([
                Point::new(l, t),
                Point::new(l, b),
                Point::new(r, b),
                Point::new(r, t),
                Point::new(l, t),
            ]);
        }
        Shape::Oval => points.extend(sample_ellipse(&hole_rect, segments)),
    }

    // Bridge back to the outer start so the polygon closes on itself
    points.push(Point::new(0.0, 0.0));
    MaskPath { points, outer_len }
}
