//! Integer rectangle algebra shared by every geometry query in the graph.
//!
//! All rectangles live in level 0 pixel coordinates. The [`Rect::infinite_plane`]
//! is an ordinary value: it can be intersected, unioned and tested for
//! containment like any other rectangle. Corner arithmetic is done in `i64` and
//! clamped to the extent of the infinite plane so that none of these operations
//! can overflow.

use std::fmt;

const PLANE_MIN: i64 = (i32::MIN / 2) as i64;
const PLANE_MAX: i64 = PLANE_MIN + i32::MAX as i64;

/// An axis aligned rectangle of whole pixels. A rectangle with a non positive
/// width or height is empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-derive", derive(serde::Serialize, serde::Deserialize))]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

impl Rect {
    /// The unbounded rectangle used for sources with no natural extent.
    pub const INFINITE_PLANE: Rect = Rect {
        x: i32::MIN / 2,
        y: i32::MIN / 2,
        width: i32::MAX,
        height: i32::MAX,
    };

    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
    /// The canonical empty rectangle.
    pub const fn empty() -> Self {
        Self::new(0, 0, 0, 0)
    }
    pub const fn infinite_plane() -> Self {
        Self::INFINITE_PLANE
    }
    pub fn is_infinite_plane(&self) -> bool {
        *self == Self::INFINITE_PLANE
    }
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
    /// Exclusive right edge.
    pub fn x2(&self) -> i64 {
        self.x as i64 + self.width as i64
    }
    /// Exclusive bottom edge.
    pub fn y2(&self) -> i64 {
        self.y as i64 + self.height as i64
    }
    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    /// Build a rectangle from corners, clamping to the infinite plane. Corners
    /// that cross produce the empty rectangle.
    pub fn from_corners(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        let x1 = x1.clamp(PLANE_MIN, PLANE_MAX);
        let y1 = y1.clamp(PLANE_MIN, PLANE_MAX);
        let x2 = x2.clamp(PLANE_MIN, PLANE_MAX);
        let y2 = y2.clamp(PLANE_MIN, PLANE_MAX);
        if x2 <= x1 || y2 <= y1 {
            return Self::empty();
        }
        Self::new(x1 as i32, y1 as i32, (x2 - x1) as i32, (y2 - y1) as i32)
    }

    /// The smallest whole pixel rectangle covering the fractional bounds:
    /// minimum corners are floored and maximum corners are ceiled.
    pub fn from_bounds_outward(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let clamp = |v: f64| v.clamp(PLANE_MIN as f64, PLANE_MAX as f64) as i64;
        Self::from_corners(
            clamp(x1.floor()),
            clamp(y1.floor()),
            clamp(x2.ceil()),
            clamp(y2.ceil()),
        )
    }

    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::empty();
        }
        Rect::from_corners(
            (self.x as i64).max(other.x as i64),
            (self.y as i64).max(other.y as i64),
            self.x2().min(other.x2()),
            self.y2().min(other.y2()),
        )
    }

    /// The smallest rectangle containing both. An empty operand is ignored.
    #[must_use]
    pub fn bounding_box(&self, other: &Rect) -> Rect {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => Rect::empty(),
            (true, false) => *other,
            (false, true) => *self,
            (false, false) => Rect::from_corners(
                (self.x as i64).min(other.x as i64),
                (self.y as i64).min(other.y as i64),
                self.x2().max(other.x2()),
                self.y2().max(other.y2()),
            ),
        }
    }

    /// True if `other` lies fully inside `self`. Every rectangle contains the
    /// empty rectangle.
    pub fn contains(&self, other: &Rect) -> bool {
        if other.is_empty() || self.is_infinite_plane() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        other.x >= self.x && other.y >= self.y && other.x2() <= self.x2() && other.y2() <= self.y2()
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        !self.is_empty()
            && x >= self.x
            && y >= self.y
            && (x as i64) < self.x2()
            && (y as i64) < self.y2()
    }

    /// Grow each side by its own margin. Negative margins shrink.
    #[must_use]
    pub fn expand(&self, left: i32, right: i32, top: i32, bottom: i32) -> Rect {
        if self.is_empty() {
            return *self;
        }
        if self.is_infinite_plane() {
            return *self;
        }
        Rect::from_corners(
            self.x as i64 - left as i64,
            self.y as i64 - top as i64,
            self.x2() + right as i64,
            self.y2() + bottom as i64,
        )
    }

    /// Grow all four sides by `margin`.
    pub fn expand_uniform(&self, margin: i32) -> Rect {
        self.expand(margin, margin, margin, margin)
    }

    #[must_use]
    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        if self.is_empty() || self.is_infinite_plane() {
            return *self;
        }
        Rect::from_corners(
            self.x as i64 + dx as i64,
            self.y as i64 + dy as i64,
            self.x2() + dx as i64,
            self.y2() + dy as i64,
        )
    }

    /// Divide the corners by `scale`, rounding outward. Used to map a rectangle
    /// in scaled output coordinates back to level 0 coordinates.
    pub fn unscaled_outward(&self, scale: f64) -> Rect {
        if self.is_empty() || self.is_infinite_plane() || scale == 1.0 {
            return *self;
        }
        Rect::from_bounds_outward(
            self.x as f64 / scale,
            self.y as f64 / scale,
            self.x2() as f64 / scale,
            self.y2() as f64 / scale,
        )
    }

    /// The parts of `self` not covered by `other`, as at most four disjoint
    /// rectangles.
    #[must_use]
    pub fn subtract(&self, other: &Rect) -> Vec<Rect> {
        let overlap = self.intersect(other);
        if overlap.is_empty() {
            return if self.is_empty() { vec![] } else { vec![*self] };
        }
        let mut pieces = Vec::with_capacity(4);
        // Full width bands above and below the overlap, then the left and right
        // remainders beside it.
        let above = Rect::from_corners(self.x as i64, self.y as i64, self.x2(), overlap.y as i64);
        let below = Rect::from_corners(self.x as i64, overlap.y2(), self.x2(), self.y2());
        let left = Rect::from_corners(
            self.x as i64,
            overlap.y as i64,
            overlap.x as i64,
            overlap.y2(),
        );
        let right = Rect::from_corners(overlap.x2(), overlap.y as i64, self.x2(), overlap.y2());
        for piece in [above, below, left, right] {
            if !piece.is_empty() {
                pieces.push(piece);
            }
        }
        pieces
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite_plane() {
            write!(f, "infinite plane")
        } else {
            write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
        }
    }
}

/// A set of pixels expressed as disjoint rectangles. Node caches use this to
/// remember which parts of their storage hold valid results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn add(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        let mut pieces = vec![*rect];
        for existing in &self.rects {
            pieces = pieces.iter().flat_map(|p| p.subtract(existing)).collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);
    }
    pub fn subtract(&mut self, rect: &Rect) {
        if rect.is_empty() {
            return;
        }
        self.rects = self.rects.iter().flat_map(|r| r.subtract(rect)).collect();
    }
    /// True if every pixel of `rect` is part of the region.
    pub fn contains_rect(&self, rect: &Rect) -> bool {
        let mut remaining = vec![*rect];
        for r in &self.rects {
            remaining = remaining.iter().flat_map(|p| p.subtract(r)).collect();
            if remaining.is_empty() {
                return true;
            }
        }
        remaining.iter().all(Rect::is_empty)
    }
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }
    pub fn clear(&mut self) {
        self.rects.clear();
    }
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }
    /// The bounding box of everything in the region.
    pub fn extent(&self) -> Rect {
        self.rects
            .iter()
            .fold(Rect::empty(), |acc, r| acc.bounding_box(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_rect(rng: &mut StdRng) -> Rect {
        Rect::new(
            rng.gen_range(-100..100),
            rng.gen_range(-100..100),
            rng.gen_range(0..80),
            rng.gen_range(0..80),
        )
    }

    #[test]
    fn bounding_box_of_self_is_self() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let a = random_rect(&mut rng);
            if a.is_empty() {
                assert!(a.bounding_box(&a).is_empty());
            } else {
                assert_eq!(a.bounding_box(&a), a);
            }
        }
        let plane = Rect::infinite_plane();
        assert_eq!(plane.bounding_box(&plane), plane);
    }

    #[test]
    fn intersect_is_symmetric() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let a = random_rect(&mut rng);
            let b = random_rect(&mut rng);
            assert_eq!(a.intersect(&b), b.intersect(&a));
        }
    }

    #[test]
    fn infinite_plane_is_neutral_for_intersect() {
        let mut rng = StdRng::seed_from_u64(3);
        let plane = Rect::infinite_plane();
        for _ in 0..200 {
            let a = random_rect(&mut rng);
            if a.is_empty() {
                continue;
            }
            assert_eq!(plane.intersect(&a), a);
            assert_eq!(a.intersect(&plane), a);
            assert!(plane.contains(&a));
        }
        assert!(plane.contains(&plane));
        assert!(plane.contains(&Rect::empty()));
        assert_eq!(plane.intersect(&plane), plane);
    }

    #[test]
    fn infinite_plane_does_not_overflow() {
        let plane = Rect::infinite_plane();
        assert_eq!(plane.expand_uniform(i32::MAX), plane);
        assert_eq!(plane.translate(i32::MAX, i32::MIN), plane);
        let far = Rect::new(i32::MAX - 10, i32::MAX - 10, 100, 100);
        assert!(!far.bounding_box(&plane).is_empty());
        assert!(far.expand_uniform(1000).width >= 0);
        assert_eq!(plane.unscaled_outward(0.25), plane);
    }

    #[test]
    fn uniform_margin_expansion() {
        let roi = Rect::new(10, 10, 5, 5);
        assert_eq!(roi.expand_uniform(2), Rect::new(8, 8, 9, 9));
        assert_eq!(Rect::empty().expand_uniform(2), Rect::empty());
    }

    #[test]
    fn outward_rounding_never_shrinks() {
        let r = Rect::from_bounds_outward(0.5, -0.5, 9.2, 3.0);
        assert_eq!(r, Rect::new(0, -1, 10, 4));
        let exact = Rect::from_bounds_outward(2.0, 2.0, 4.0, 4.0);
        assert_eq!(exact, Rect::new(2, 2, 2, 2));
        assert_eq!(
            Rect::new(0, 0, 10, 10).unscaled_outward(0.3),
            Rect::new(0, 0, 34, 34)
        );
    }

    #[test]
    fn bounding_box_ignores_empty() {
        let a = Rect::new(3, 4, 5, 6);
        assert_eq!(a.bounding_box(&Rect::empty()), a);
        assert_eq!(Rect::new(100, 100, 0, 5).bounding_box(&a), a);
        assert_eq!(
            a.bounding_box(&Rect::new(10, 0, 2, 2)),
            Rect::new(3, 0, 9, 10)
        );
    }

    #[test]
    fn subtract_covers_remainder_exactly() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..200 {
            let a = random_rect(&mut rng);
            let b = random_rect(&mut rng);
            let pieces = a.subtract(&b);
            let area: u64 = pieces.iter().map(Rect::area).sum();
            assert_eq!(area, a.area() - a.intersect(&b).area());
            for p in &pieces {
                assert!(a.contains(p));
                assert!(p.intersect(&b).is_empty());
            }
        }
    }

    #[test]
    fn region_tracks_coverage() {
        let mut region = Region::new();
        region.add(&Rect::new(0, 0, 10, 10));
        region.add(&Rect::new(10, 0, 10, 10));
        assert!(region.contains_rect(&Rect::new(5, 2, 10, 5)));
        assert!(!region.contains_rect(&Rect::new(15, 5, 10, 5)));
        region.subtract(&Rect::new(8, 0, 4, 4));
        assert!(!region.contains_rect(&Rect::new(5, 2, 10, 5)));
        assert!(region.contains_rect(&Rect::new(0, 4, 20, 6)));
        assert_eq!(region.extent(), Rect::new(0, 0, 20, 10));
        assert!(region.contains_rect(&Rect::empty()));
    }
}
