// src/engine/geometry.rs
//
// Integer points, sizes and rectangles in pixel space.
// Rectangles are half-open: [left, right) x [top, bottom).

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IPoint {
    pub x: i32,
    pub y: i32,
}

impl IPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

impl std::ops::Add for IPoint {
    type Output = IPoint;

    fn add(self, rhs: IPoint) -> IPoint {
        IPoint::new(self.x.saturating_add(rhs.x), self.y.saturating_add(rhs.y))
    }
}

impl std::ops::Sub for IPoint {
    type Output = IPoint;

    fn sub(self, rhs: IPoint) -> IPoint {
        IPoint::new(self.x.saturating_sub(rhs.x), self.y.saturating_sub(rhs.y))
    }
}

impl std::ops::AddAssign for IPoint {
    fn add_assign(&mut self, rhs: IPoint) {
        *self = *self + rhs;
    }
}

impl std::ops::Neg for IPoint {
    type Output = IPoint;

    fn neg(self) -> IPoint {
        IPoint::new(self.x.saturating_neg(), self.y.saturating_neg())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ISize {
    pub width: i32,
    pub height: i32,
}

impl ISize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IRect {
    pub const fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::from_ltrb(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn from_wh(width: i32, height: i32) -> Self {
        Self::from_ltrb(0, 0, width, height)
    }

    pub fn from_size(size: ISize) -> Self {
        Self::from_wh(size.width, size.height)
    }

    pub fn from_pt_size(origin: IPoint, size: ISize) -> Self {
        Self::from_xywh(origin.x, origin.y, size.width, size.height)
    }

    pub fn x(&self) -> i32 {
        self.left
    }

    pub fn y(&self) -> i32 {
        self.top
    }

    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn origin(&self) -> IPoint {
        IPoint::new(self.left, self.top)
    }

    pub fn size(&self) -> ISize {
        ISize::new(self.width(), self.height())
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// True when `other` is non-empty and lies entirely inside `self`.
    pub fn contains(&self, other: &IRect) -> bool {
        !other.is_empty()
            && !self.is_empty()
            && self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    pub fn intersect(&self, other: &IRect) -> Option<IRect> {
        let r = IRect::from_ltrb(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!r.is_empty()).then_some(r)
    }

    /// Edges saturate at the `i32` range, so an unbounded rect stays unbounded.
    pub fn offset(&self, dx: i32, dy: i32) -> IRect {
        IRect::from_ltrb(
            self.left.saturating_add(dx),
            self.top.saturating_add(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }

    /// Grow each edge outward. Saturates like `offset`.
    pub fn outset(&self, dx: i32, dy: i32) -> IRect {
        IRect::from_ltrb(
            self.left.saturating_sub(dx),
            self.top.saturating_sub(dy),
            self.right.saturating_add(dx),
            self.bottom.saturating_add(dy),
        )
    }

    pub fn offset_by(&self, delta: IPoint) -> IRect {
        self.offset(delta.x, delta.y)
    }

    pub fn make_offset_to(&self, x: i32, y: i32) -> IRect {
        IRect::from_xywh(x, y, self.width(), self.height())
    }

    pub fn join(&self, other: &IRect) -> IRect {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        IRect::from_ltrb(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    pub fn ltrb(&self) -> (i32, i32, i32, i32) {
        (self.left, self.top, self.right, self.bottom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_rejects_empty_and_overhanging_rects() {
        let bounds = IRect::from_wh(100, 100);
        assert!(bounds.contains(&IRect::from_ltrb(10, 10, 60, 60)));
        assert!(bounds.contains(&bounds));
        assert!(!bounds.contains(&IRect::from_ltrb(10, 10, 10, 60)));
        assert!(!bounds.contains(&IRect::from_ltrb(-1, 0, 50, 50)));
        assert!(!bounds.contains(&IRect::from_ltrb(50, 50, 101, 60)));
    }

    #[test]
    fn intersect_returns_none_when_disjoint() {
        let a = IRect::from_ltrb(0, 0, 10, 10);
        let b = IRect::from_ltrb(5, 5, 20, 20);
        assert_eq!(a.intersect(&b), Some(IRect::from_ltrb(5, 5, 10, 10)));
        assert_eq!(a.intersect(&IRect::from_ltrb(10, 0, 20, 10)), None);
    }

    #[test]
    fn offset_and_join() {
        let r = IRect::from_xywh(2, 3, 4, 5).offset(-2, -3);
        assert_eq!(r, IRect::from_wh(4, 5));
        assert_eq!(
            r.join(&IRect::from_ltrb(10, 10, 12, 12)),
            IRect::from_ltrb(0, 0, 12, 12)
        );
        assert_eq!(r.join(&IRect::default()), r);
        assert_eq!(IPoint::new(1, 2) - IPoint::new(3, 5), IPoint::new(-2, -3));
    }

    #[test]
    fn offset_saturates_unbounded_rects() {
        let unbounded = IRect::from_ltrb(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(unbounded.offset(-5, -5), IRect::from_ltrb(i32::MIN, i32::MIN, i32::MAX - 5, i32::MAX - 5));
        assert_eq!(unbounded.offset(5, 5), IRect::from_ltrb(i32::MIN + 5, i32::MIN + 5, i32::MAX, i32::MAX));
        assert_eq!(unbounded.width(), i32::MAX);
        assert_eq!(-IPoint::new(i32::MIN, 0), IPoint::new(i32::MAX, 0));
        assert_eq!(IRect::from_ltrb(0, 0, 4, 4).outset(2, 1), IRect::from_ltrb(-2, -1, 6, 5));
        assert_eq!(unbounded.outset(3, 3), unbounded);
    }
}
