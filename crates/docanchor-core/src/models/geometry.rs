//! Geometric primitives shared by templates, pages and the resolver.
//!
//! Template rectangles live in PDF coordinate space (points, origin at the
//! top-left corner of the page, y growing downwards). Bitmap work happens in
//! pixel space; [`RectangleF::scale`] converts between the two.

use serde::{Deserialize, Serialize};

/// A point with floating-point coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PointF {
    pub x: f32,
    pub y: f32,
}

impl PointF {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Vector from `origin` to `self`.
    pub fn offset_from(&self, origin: PointF) -> SizeF {
        SizeF::new(self.x - origin.x, self.y - origin.y)
    }
}

/// A size, also used as a 2-D displacement vector ("shift").
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeF {
    pub width: f32,
    pub height: f32,
}

impl SizeF {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0.0 && self.height == 0.0
    }
}

/// Axis-aligned rectangle with floating-point coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RectangleF {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RectangleF {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner.
    pub fn location(&self) -> PointF {
        PointF::new(self.x, self.y)
    }

    pub fn size(&self) -> SizeF {
        SizeF::new(self.width, self.height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Check if a point is inside this rectangle (right/bottom edges inclusive).
    pub fn contains_point(&self, point: PointF) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// Translate by a shift vector.
    pub fn offset(&self, shift: SizeF) -> Self {
        Self::new(self.x + shift.width, self.y + shift.height, self.width, self.height)
    }

    /// Grow by `margin` on every side.
    pub fn inflate(&self, margin: f32) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &RectangleF) -> Self {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }

    /// Union of all rectangles, `None` for an empty input.
    pub fn union_all<'a>(rects: impl IntoIterator<Item = &'a RectangleF>) -> Option<Self> {
        rects.into_iter().fold(None, |acc, r| match acc {
            None => Some(*r),
            Some(u) => Some(u.union(r)),
        })
    }

    /// Multiply every component by `factor`.
    pub fn scale(&self, factor: f32) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Round to an integer rectangle, ties to even.
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            round(self.x),
            round(self.y),
            round(self.width),
            round(self.height),
        )
    }
}

fn round(value: f32) -> i32 {
    value.round_ties_even() as i32
}

/// Integer rectangle, used for pixel regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn to_rectangle_f(&self) -> RectangleF {
        RectangleF::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Intersect with the `width` x `height` area starting at the origin.
    ///
    /// Returns `None` when nothing of the rectangle is inside.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x1 = self.x.max(0);
        let y1 = self.y.max(0);
        let x2 = self.right().min(width as i32);
        let y2 = self.bottom().min(height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
    }
}

impl From<Rect> for RectangleF {
    fn from(r: Rect) -> Self {
        r.to_rectangle_f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_keeps_size() {
        let samples = [
            RectangleF::new(0.5, 1.5, 10.5, 20.49),
            RectangleF::new(-3.2, 7.7, 0.4, 99.5),
            RectangleF::new(12.25, 8.75, 33.3, 2.5),
        ];
        for r in samples {
            let back = r.to_rect().to_rectangle_f();
            assert!((back.width - r.width).abs() <= 1.0, "{:?} -> {:?}", r, back);
            assert!((back.height - r.height).abs() <= 1.0, "{:?} -> {:?}", r, back);
        }
    }

    #[test]
    fn test_rounding_is_ties_to_even() {
        let r = RectangleF::new(0.5, 1.5, 2.5, 3.5).to_rect();
        assert_eq!(r, Rect::new(0, 2, 2, 4));
        let r = RectangleF::new(-0.5, -1.5, 2.4, 2.6).to_rect();
        assert_eq!(r, Rect::new(0, -2, 2, 3));
    }

    #[test]
    fn test_union_and_inflate() {
        let a = RectangleF::new(10.0, 10.0, 5.0, 5.0);
        let b = RectangleF::new(20.0, 5.0, 5.0, 5.0);
        assert_eq!(a.union(&b), RectangleF::new(10.0, 5.0, 15.0, 10.0));
        assert_eq!(
            RectangleF::union_all([a, b].iter()),
            Some(RectangleF::new(10.0, 5.0, 15.0, 10.0))
        );
        assert_eq!(RectangleF::union_all([].iter()), None);
        assert_eq!(a.inflate(2.0), RectangleF::new(8.0, 8.0, 9.0, 9.0));
    }

    #[test]
    fn test_contains_point() {
        let r = RectangleF::new(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains_point(PointF::new(10.0, 10.0)));
        assert!(!r.contains_point(PointF::new(10.1, 5.0)));
    }

    #[test]
    fn test_clamp_to() {
        let r = Rect::new(-5, 5, 20, 20);
        assert_eq!(r.clamp_to(10, 15), Some(Rect::new(0, 5, 10, 10)));
        assert_eq!(Rect::new(50, 50, 5, 5).clamp_to(10, 10), None);
    }

    #[test]
    fn test_clamp_huge_rectangle() {
        let r = RectangleF::new(5.0, 5.0, 1e12, f32::INFINITY).to_rect();
        assert_eq!(r.right(), i32::MAX);
        assert_eq!(r.bottom(), i32::MAX);
        assert_eq!(r.clamp_to(10, 10), Some(Rect::new(5, 5, 5, 5)));
    }

    #[test]
    fn test_shift_vector() {
        let shift = PointF::new(8.0, 5.0).offset_from(PointF::new(5.0, 5.0));
        assert_eq!(shift, SizeF::new(3.0, 0.0));
        assert!(!shift.is_zero());
    }
}
