//! 2D math utilities
//!
//! All functions operate on [`Vec2`] (double precision). Orientation follows
//! the usual mathematical convention: counter-clockwise is positive.

use crate::Vec2;

/// Calculates the 2D cross product (z component of the 3D cross product)
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Twice the signed area of triangle `abc`, positive when counter-clockwise.
///
/// This is the fast, non-robust version. Use [`crate::orient2d`] when the sign
/// decides topology.
#[inline]
pub fn tri_area_2d(a: Vec2, b: Vec2, c: Vec2) -> f64 {
    cross(b - a, c - a)
}

/// Square a value (x²)
#[inline]
pub fn sqr(x: f64) -> f64 {
    x * x
}

/// Parameter of the orthogonal projection of `p` onto the line through `a` and `b`.
///
/// `0` maps to `a` and `1` to `b`. Degenerate segments return `0`.
pub fn project_parameter(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < f64::EPSILON * f64::EPSILON {
        return 0.0;
    }
    (p - a).dot(ab) / len_sq
}

/// Finds the closest point on a line segment to a given point
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let t = project_parameter(p, a, b).clamp(0.0, 1.0);
    a + (b - a) * t
}

/// Calculates the squared distance between a point and a line segment
pub fn distance_point_segment_squared(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    closest_point_on_segment(p, a, b).distance_squared(p)
}

/// Calculates the distance between a point and a line segment
#[inline]
pub fn distance_point_segment(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    distance_point_segment_squared(p, a, b).sqrt()
}

/// Distance from `p` to the infinite line through `a` and `b`
pub fn distance_point_line(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let len = a.distance(b);
    if len < f64::EPSILON {
        return p.distance(a);
    }
    tri_area_2d(a, b, p).abs() / len
}

/// Intersection parameters of two segments.
///
/// Returns `(s, t)` with `a0 + (a1 - a0) * s == b0 + (b1 - b0) * t` when the
/// segments are not parallel and both parameters lie in `[0, 1]`.
pub fn segment_intersection(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> Option<(f64, f64)> {
    let da = a1 - a0;
    let db = b1 - b0;
    let denom = cross(da, db);
    if denom.abs() < f64::EPSILON * da.length() * db.length() {
        return None;
    }
    let d0 = b0 - a0;
    let s = cross(d0, db) / denom;
    let t = cross(d0, da) / denom;
    if (0.0..=1.0).contains(&s) && (0.0..=1.0).contains(&t) {
        Some((s, t))
    } else {
        None
    }
}

/// Intersection point of the infinite lines through `a0 a1` and `b0 b1`
pub fn line_intersection(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> Option<Vec2> {
    let da = a1 - a0;
    let db = b1 - b0;
    let denom = cross(da, db);
    if denom == 0.0 {
        return None;
    }
    let s = cross(b0 - a0, db) / denom;
    Some(a0 + da * s)
}

/// Minimum distance between two segments
pub fn distance_segment_segment(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> f64 {
    if segment_intersection(a0, a1, b0, b1).is_some() {
        return 0.0;
    }
    distance_point_segment(a0, b0, b1)
        .min(distance_point_segment(a1, b0, b1))
        .min(distance_point_segment(b0, a0, a1))
        .min(distance_point_segment(b1, a0, a1))
}

/// Clips the segment `p0 p1` to the closed wedge with apex `apex` spanned by
/// the rays towards `ra` and `rc`.
///
/// The wedge must be convex (the rays are not collinear). Returns the clipped
/// sub-segment or `None` when the segment misses the wedge.
pub fn clip_segment_to_wedge(
    apex: Vec2,
    ra: Vec2,
    rc: Vec2,
    p0: Vec2,
    p1: Vec2,
) -> Option<(Vec2, Vec2)> {
    let u = ra - apex;
    let w = rc - apex;
    let side = cross(u, w);
    if side == 0.0 {
        return None;
    }
    let s = side.signum();

    let h1 = |x: Vec2| s * cross(u, x - apex);
    let h2 = |x: Vec2| s * cross(x - apex, w);

    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (f0, f1) in [(h1(p0), h1(p1)), (h2(p0), h2(p1))] {
        if f0 < 0.0 && f1 < 0.0 {
            return None;
        }
        if f0 < 0.0 {
            t0 = t0.max(f0 / (f0 - f1));
        } else if f1 < 0.0 {
            t1 = t1.min(f0 / (f0 - f1));
        }
    }

    if t0 > t1 {
        return None;
    }
    Some((p0.lerp(p1, t0), p0.lerp(p1, t1)))
}

/// Circumcenter of triangle `abc`, `None` for collinear input
pub fn circumcenter(a: Vec2, b: Vec2, c: Vec2) -> Option<Vec2> {
    let ab = b - a;
    let ac = c - a;
    let d = 2.0 * cross(ab, ac);
    if d == 0.0 {
        return None;
    }
    let ab2 = ab.length_squared();
    let ac2 = ac.length_squared();
    let ux = (ac.y * ab2 - ab.y * ac2) / d;
    let uy = (ab.x * ac2 - ac.x * ab2) / d;
    Some(a + Vec2::new(ux, uy))
}

/// Signed angle from `a` to `b` in radians, in `(-pi, pi]`
#[inline]
pub fn angle(a: Vec2, b: Vec2) -> f64 {
    cross(a, b).atan2(a.dot(b))
}

/// Checks if a point lies inside or on the boundary of triangle `abc` (any winding)
pub fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = tri_area_2d(a, b, p);
    let d2 = tri_area_2d(b, c, p);
    let d3 = tri_area_2d(c, a, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}
