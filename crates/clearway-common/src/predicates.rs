//! Geometric predicates
//!
//! [`orient2d`] is exact: it evaluates the determinant with a floating-point
//! filter and falls back to expansion arithmetic when the filter cannot
//! decide the sign. [`in_circle`] is filtered only and reports `0.0` for
//! ambiguous configurations, which the triangulation treats as "already
//! Delaunay".

use crate::Vec2;

const EPSILON: f64 = f64::EPSILON * 0.5;
const CCW_ERR_BOUND_A: f64 = (3.0 + 16.0 * EPSILON) * EPSILON;
const ICC_ERR_BOUND_A: f64 = (10.0 + 96.0 * EPSILON) * EPSILON;

/// Orientation of an ordered point triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    CounterClockwise,
    Clockwise,
    Collinear,
}

impl Orientation {
    /// Sign as an integer (`1`, `-1` or `0`)
    pub fn sign(self) -> i32 {
        match self {
            Orientation::CounterClockwise => 1,
            Orientation::Clockwise => -1,
            Orientation::Collinear => 0,
        }
    }
}

#[inline]
fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let x = a + b;
    let bv = x - a;
    let av = x - bv;
    let br = b - bv;
    let ar = a - av;
    (x, ar + br)
}

#[inline]
fn two_product(a: f64, b: f64) -> (f64, f64) {
    let x = a * b;
    (x, a.mul_add(b, -x))
}

/// Non-overlapping expansion with components sorted by increasing magnitude.
struct Expansion {
    terms: [f64; 16],
    len: usize,
}

impl Expansion {
    fn new() -> Self {
        Self {
            terms: [0.0; 16],
            len: 0,
        }
    }

    /// Adds a single value, eliminating zero components.
    fn grow(&mut self, b: f64) {
        let mut q = b;
        let mut out = 0;
        for i in 0..self.len {
            let (sum, err) = two_sum(q, self.terms[i]);
            q = sum;
            if err != 0.0 {
                self.terms[out] = err;
                out += 1;
            }
        }
        if q != 0.0 {
            self.terms[out] = q;
            out += 1;
        }
        self.len = out;
    }

    fn add_product(&mut self, a: f64, b: f64) {
        let (hi, lo) = two_product(a, b);
        self.grow(lo);
        self.grow(hi);
    }

    fn sign(&self) -> f64 {
        if self.len == 0 {
            0.0
        } else {
            self.terms[self.len - 1].signum()
        }
    }
}

fn orient2d_exact(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    // (ax - cx)(by - cy) - (ay - cy)(bx - cx) expanded into raw coordinate products
    let mut e = Expansion::new();
    e.add_product(a.x, b.y);
    e.add_product(-a.x, c.y);
    e.add_product(-c.x, b.y);
    e.add_product(-a.y, b.x);
    e.add_product(a.y, c.x);
    e.add_product(c.y, b.x);
    e.sign()
}

/// Orientation determinant of `a`, `b`, `c`.
///
/// Positive when the points are in counter-clockwise order, negative when
/// clockwise and zero when collinear. The sign is always correct; the
/// magnitude is only meaningful on the fast path.
pub fn orient2d(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    let detleft = (a.x - c.x) * (b.y - c.y);
    let detright = (a.y - c.y) * (b.x - c.x);
    let det = detleft - detright;

    let detsum = if detleft > 0.0 {
        if detright <= 0.0 {
            return det;
        }
        detleft + detright
    } else if detleft < 0.0 {
        if detright >= 0.0 {
            return det;
        }
        -detleft - detright
    } else {
        return det;
    };

    let errbound = CCW_ERR_BOUND_A * detsum;
    if det >= errbound || -det >= errbound {
        return det;
    }

    orient2d_exact(a, b, c)
}

/// Classifies the orientation of `a`, `b`, `c`
pub fn orientation(a: Vec2, b: Vec2, c: Vec2) -> Orientation {
    let det = orient2d(a, b, c);
    if det > 0.0 {
        Orientation::CounterClockwise
    } else if det < 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::Collinear
    }
}

/// In-circle test for `d` against the circumcircle of counter-clockwise `a b c`.
///
/// Positive when `d` lies strictly inside, negative when outside. Returns
/// `0.0` when the filtered determinant cannot be trusted.
pub fn in_circle(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> f64 {
    let adx = a.x - d.x;
    let bdx = b.x - d.x;
    let cdx = c.x - d.x;
    let ady = a.y - d.y;
    let bdy = b.y - d.y;
    let cdy = c.y - d.y;

    let bdxcdy = bdx * cdy;
    let cdxbdy = cdx * bdy;
    let alift = adx * adx + ady * ady;

    let cdxady = cdx * ady;
    let adxcdy = adx * cdy;
    let blift = bdx * bdx + bdy * bdy;

    let adxbdy = adx * bdy;
    let bdxady = bdx * ady;
    let clift = cdx * cdx + cdy * cdy;

    let det = alift * (bdxcdy - cdxbdy) + blift * (cdxady - adxcdy) + clift * (adxbdy - bdxady);

    let permanent = (bdxcdy.abs() + cdxbdy.abs()) * alift
        + (cdxady.abs() + adxcdy.abs()) * blift
        + (adxbdy.abs() + bdxady.abs()) * clift;
    let errbound = ICC_ERR_BOUND_A * permanent;

    if det > errbound || -det > errbound {
        det
    } else {
        0.0
    }
}

/// Checks that the open segments `a0 a1` and `b0 b1` cross at a single interior point
pub fn segments_cross(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> bool {
    let o1 = orient2d(a0, a1, b0);
    let o2 = orient2d(a0, a1, b1);
    let o3 = orient2d(b0, b1, a0);
    let o4 = orient2d(b0, b1, a1);
    o1 * o2 < 0.0 && o3 * o4 < 0.0
}

/// Checks that the quadrilateral `a b c d` (in this order) is strictly convex
///
/// Used before flipping diagonal `a c` to `b d`.
pub fn is_convex_quad(a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> bool {
    segments_cross(a, c, b, d)
}
