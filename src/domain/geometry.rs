//! Geometric types for selection regions and coordinates
//!
//! All selection coordinates live in document space, which does not move when
//! the page scrolls. [`Viewport`] converts between document and viewport space.

/// A point in document (or viewport) coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Position and size of an axis-aligned box
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle from position and size
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.left + self.width * 0.5, self.top + self.height * 0.5)
    }

    /// Calculate the intersection of two rectangles
    pub fn intersect(&self, other: Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if left < right && top < bottom {
            Some(Rect::new(left, top, right - left, bottom - top))
        } else {
            None
        }
    }

    /// Translate the rectangle by the given offset
    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect {
            left: self.left + dx,
            top: self.top + dy,
            ..*self
        }
    }

    /// Move the rectangle so it lies inside `bounds`, keeping its size.
    ///
    /// A rectangle larger than `bounds` is pinned to the bounds' origin.
    pub fn clamp_within(&self, bounds: Rect) -> Rect {
        let max_left = (bounds.right() - self.width).max(bounds.left);
        let max_top = (bounds.bottom() - self.height).max(bounds.top);
        Rect {
            left: self.left.clamp(bounds.left, max_left),
            top: self.top.clamp(bounds.top, max_top),
            ..*self
        }
    }

    /// Check if this rectangle contains a point
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right() && p.y >= self.top && p.y < self.bottom()
    }

    /// Whether both sides reach `min`
    pub fn meets_minimum(&self, min: f64) -> bool {
        self.width >= min && self.height >= min
    }
}

/// Current scroll offset and visible size of the page
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(scroll_x: f64, scroll_y: f64, width: f64, height: f64) -> Self {
        Self {
            scroll_x,
            scroll_y,
            width,
            height,
        }
    }

    /// Visible area in document coordinates
    pub fn document_rect(&self) -> Rect {
        Rect::new(self.scroll_x, self.scroll_y, self.width, self.height)
    }

    /// Convert a viewport-relative point (e.g. a pointer position) to document space
    pub fn to_document(&self, p: Point) -> Point {
        Point::new(p.x + self.scroll_x, p.y + self.scroll_y)
    }

    /// Convert a document rectangle into viewport coordinates
    pub fn rect_to_viewport(&self, r: Rect) -> Rect {
        r.translate(-self.scroll_x, -self.scroll_y)
    }
}

/// Turn a drag from `anchor` to `current` into a box.
///
/// Free-form mode spans the two points. Square mode uses the larger delta for
/// both sides and grows away from the anchor in the drag direction, so the box
/// always touches the anchor point.
pub fn compute_box(anchor: Point, current: Point, constrain_square: bool) -> Rect {
    let dx = current.x - anchor.x;
    let dy = current.y - anchor.y;

    if !constrain_square {
        return Rect::new(
            anchor.x.min(current.x),
            anchor.y.min(current.y),
            dx.abs(),
            dy.abs(),
        );
    }

    let size = dx.abs().max(dy.abs());
    let left = if dx < 0.0 { anchor.x - size } else { anchor.x };
    let top = if dy < 0.0 { anchor.y - size } else { anchor.y };
    Rect::new(left, top, size, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELTAS: [f64; 7] = [-120.0, -33.5, -1.0, 0.0, 2.0, 47.25, 300.0];

    #[test]
    fn test_free_form_box_spans_both_points() {
        let anchor = Point::new(200.0, 150.0);
        for dx in DELTAS {
            for dy in DELTAS {
                let b = compute_box(anchor, Point::new(anchor.x + dx, anchor.y + dy), false);
                assert_eq!(b.width, dx.abs());
                assert_eq!(b.height, dy.abs());
                assert_eq!(b.left, anchor.x.min(anchor.x + dx));
                assert_eq!(b.top, anchor.y.min(anchor.y + dy));
            }
        }
    }

    #[test]
    fn test_square_box_touches_anchor() {
        let anchor = Point::new(200.0, 150.0);
        for dx in DELTAS {
            for dy in DELTAS {
                let b = compute_box(anchor, Point::new(anchor.x + dx, anchor.y + dy), true);
                let size = dx.abs().max(dy.abs());
                assert_eq!(b.width, size);
                assert_eq!(b.height, size);
                if dx < 0.0 {
                    assert_eq!(b.right(), anchor.x);
                } else {
                    assert_eq!(b.left, anchor.x);
                }
                if dy < 0.0 {
                    assert_eq!(b.bottom(), anchor.y);
                } else {
                    assert_eq!(b.top, anchor.y);
                }
            }
        }
    }

    #[test]
    fn test_square_box_up_left() {
        let b = compute_box(Point::new(100.0, 100.0), Point::new(90.0, 40.0), true);
        assert_eq!(b, Rect::new(40.0, 40.0, 60.0, 60.0));
    }

    #[test]
    fn test_intersect_and_clamp() {
        let a = Rect::new(0.0, 0.0, 100.0, 100.0);
        let b = Rect::new(50.0, 50.0, 100.0, 100.0);
        assert_eq!(a.intersect(b), Some(Rect::new(50.0, 50.0, 50.0, 50.0)));
        assert_eq!(a.intersect(Rect::new(200.0, 0.0, 5.0, 5.0)), None);

        let bounds = Rect::new(0.0, 0.0, 500.0, 400.0);
        let moved = Rect::new(480.0, -20.0, 50.0, 50.0).clamp_within(bounds);
        assert_eq!(moved, Rect::new(450.0, 0.0, 50.0, 50.0));
    }

    #[test]
    fn test_viewport_conversion() {
        let vp = Viewport::new(0.0, 300.0, 800.0, 600.0);
        assert_eq!(vp.to_document(Point::new(10.0, 20.0)), Point::new(10.0, 320.0));
        let r = vp.rect_to_viewport(Rect::new(10.0, 320.0, 5.0, 5.0));
        assert_eq!(r, Rect::new(10.0, 20.0, 5.0, 5.0));
    }
}
