//! Shared planar-geometry helpers.
//!
//! Everything here works on canvas-unit coordinates. Polygon boolean
//! operations come from the `geo` crate; the small scalar helpers are kept
//! hand-rolled so the hot placement loops stay allocation-free.

use geo::{coord, Coord, LineString, MultiPolygon, Polygon};

/// Length of each segment of a polyline.
pub fn segment_lengths(points: &[Coord<f64>]) -> Vec<f64> {
    points
        .windows(2)
        .map(|pair| {
            let dx = pair[1].x - pair[0].x;
            let dy = pair[1].y - pair[0].y;
            (dx * dx + dy * dy).sqrt()
        })
        .collect()
}

/// Bearing (atan2 of the directed segment) of each segment of a polyline.
pub fn segment_bearings(points: &[Coord<f64>]) -> Vec<f64> {
    points
        .windows(2)
        .map(|pair| (pair[1].y - pair[0].y).atan2(pair[1].x - pair[0].x))
        .collect()
}

pub fn polyline_length(points: &[Coord<f64>]) -> f64 {
    segment_lengths(points).iter().sum()
}

/// Bearing from `from` to `to`.
pub fn bearing(from: Coord<f64>, to: Coord<f64>) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}

/// Angular distance travelled when rotating from `from` to `to` in the
/// increasing-angle sense, in `[0, 2π)`.
pub fn angle_forward(from: f64, to: f64) -> f64 {
    (to - from).rem_euclid(std::f64::consts::TAU)
}

pub fn translate_coords(coords: &[Coord<f64>], dx: f64, dy: f64) -> Vec<Coord<f64>> {
    coords
        .iter()
        .map(|c| coord! { x: c.x + dx, y: c.y + dy })
        .collect()
}

/// Rotates coordinates around the origin.
pub fn rotate_coords(coords: &[Coord<f64>], radians: f64) -> Vec<Coord<f64>> {
    let (sin, cos) = radians.sin_cos();
    coords
        .iter()
        .map(|c| coord! { x: c.x * cos - c.y * sin, y: c.x * sin + c.y * cos })
        .collect()
}

/// Point on a polyline at the given arc length, clamped to the endpoints.
pub fn point_at(points: &[Coord<f64>], distance: f64) -> Coord<f64> {
    debug_assert!(!points.is_empty());
    if points.len() == 1 || distance <= 0.0 {
        return points[0];
    }
    let mut remaining = distance;
    for pair in points.windows(2) {
        let dx = pair[1].x - pair[0].x;
        let dy = pair[1].y - pair[0].y;
        let len = (dx * dx + dy * dy).sqrt();
        if len > 0.0 && remaining <= len {
            let t = remaining / len;
            return coord! { x: pair[0].x + dx * t, y: pair[0].y + dy * t };
        }
        remaining -= len;
    }
    points[points.len() - 1]
}

/// Tangent bearing at `distance` along a polyline, smoothed by sampling a
/// bracket of `bracket` before the position and after `distance + advance`.
/// The bracketing keeps single noisy vertices from twisting glyphs.
pub fn bearing_at(points: &[Coord<f64>], distance: f64, advance: f64, bracket: f64) -> f64 {
    let p1 = point_at(points, distance - bracket);
    let p2 = point_at(points, distance + advance + bracket);
    (p2.y - p1.y).atan2(p2.x - p1.x)
}

/// Translates a polyline sideways: each vertex moves by `amount` along the
/// perpendicular of the averaged bearings of its adjacent segments.
pub fn offset_perpendicular(points: &[Coord<f64>], amount: f64) -> Vec<Coord<f64>> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let seg_rads = segment_bearings(points);
    let mut avgs = Vec::with_capacity(points.len());
    avgs.push(seg_rads[0]);
    for pair in seg_rads.windows(2) {
        let rad1 = pair[0];
        let mut rad2 = pair[1];
        if rad1 > 0.0 && rad2 < 0.0 {
            rad2 = -rad2;
        }
        avgs.push((rad1 + rad2) / 2.0);
    }
    avgs.push(seg_rads[seg_rads.len() - 1]);
    avgs.iter()
        .zip(points.iter())
        .map(|(avg, c)| coord! { x: c.x - avg.sin() * amount, y: c.y + avg.cos() * amount })
        .collect()
}

pub fn rect_polygon(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]),
        vec![],
    )
}

/// Regular polygon approximating a circle. `steps = 8` matches the
/// one-segment-per-quadrant cap resolution used for conflict margins.
pub fn circle_polygon(center: Coord<f64>, radius: f64, steps: usize) -> Polygon<f64> {
    let steps = steps.max(4);
    let mut ring = Vec::with_capacity(steps + 1);
    for i in 0..steps {
        let theta = std::f64::consts::TAU * i as f64 / steps as f64;
        ring.push(coord! {
            x: center.x + radius * theta.cos(),
            y: center.y + radius * theta.sin(),
        });
    }
    // Polygon::new closes the ring exactly.
    Polygon::new(LineString::new(ring), vec![])
}

/// Unions a list of polygons into one (possibly multi-part) region.
pub fn union_all(parts: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    use geo::{Area, BooleanOps};
    let mut acc = MultiPolygon::<f64>::new(vec![]);
    for part in parts {
        if part.unsigned_area() <= 0.0 {
            continue;
        }
        let part = MultiPolygon::new(vec![part]);
        if acc.0.is_empty() {
            acc = part;
        } else {
            acc = acc.union(&part);
        }
    }
    acc
}

/// Minkowski buffer of a polyline: a capsule per segment with octagonal
/// joints, all unioned together.
pub fn buffer_polyline(points: &[Coord<f64>], radius: f64) -> MultiPolygon<f64> {
    if points.is_empty() || radius <= 0.0 {
        return MultiPolygon::new(vec![]);
    }
    let mut parts = Vec::new();
    for pair in points.windows(2) {
        let dx = pair[1].x - pair[0].x;
        let dy = pair[1].y - pair[0].y;
        let len = (dx * dx + dy * dy).sqrt();
        if len <= 0.0 {
            continue;
        }
        let nx = -dy / len * radius;
        let ny = dx / len * radius;
        parts.push(Polygon::new(
            LineString::from(vec![
                (pair[0].x + nx, pair[0].y + ny),
                (pair[1].x + nx, pair[1].y + ny),
                (pair[1].x - nx, pair[1].y - ny),
                (pair[0].x - nx, pair[0].y - ny),
                (pair[0].x + nx, pair[0].y + ny),
            ]),
            vec![],
        ));
    }
    for point in points {
        parts.push(circle_polygon(*point, radius, 8));
    }
    union_all(parts)
}

/// Minkowski buffer of a polygon by `margin`: the polygon unioned with a
/// buffered copy of its exterior ring. A non-positive margin returns the
/// polygon unchanged.
pub fn buffer_polygon(polygon: &Polygon<f64>, margin: f64) -> MultiPolygon<f64> {
    use geo::{Area, BooleanOps};
    if margin <= 0.0 {
        return MultiPolygon::new(vec![polygon.clone()]);
    }
    let ring: Vec<Coord<f64>> = polygon.exterior().coords().copied().collect();
    let rim = buffer_polyline(&ring, margin);
    let base = MultiPolygon::new(vec![polygon.clone()]);
    if rim.0.is_empty() {
        return base;
    }
    // A flat polygon contributes nothing beyond its buffered rim.
    if base.unsigned_area() <= 0.0 {
        return rim;
    }
    base.union(&rim)
}

pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let vx = b.x - a.x;
    let vy = b.y - a.y;
    let len2 = vx * vx + vy * vy;
    if len2 <= 1e-12 {
        let dx = p.x - a.x;
        let dy = p.y - a.y;
        return (dx * dx + dy * dy).sqrt();
    }
    let t = ((p.x - a.x) * vx + (p.y - a.y) * vy) / len2;
    let t = t.clamp(0.0, 1.0);
    let dx = p.x - (a.x + vx * t);
    let dy = p.y - (a.y + vy * t);
    (dx * dx + dy * dy).sqrt()
}

fn segments_cross(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>, d: Coord<f64>) -> bool {
    fn orient(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> f64 {
        (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    (o1 * o2 < 0.0) && (o3 * o4 < 0.0)
}

pub fn segment_segment_distance(
    a1: Coord<f64>,
    a2: Coord<f64>,
    b1: Coord<f64>,
    b2: Coord<f64>,
) -> f64 {
    if segments_cross(a1, a2, b1, b2) {
        return 0.0;
    }
    point_segment_distance(a1, b1, b2)
        .min(point_segment_distance(a2, b1, b2))
        .min(point_segment_distance(b1, a1, a2))
        .min(point_segment_distance(b2, a1, a2))
}

/// Minimum distance between two contour sets (open or closed polylines).
/// Either side being empty yields infinity.
pub fn contours_distance(a: &[Vec<Coord<f64>>], b: &[Vec<Coord<f64>>]) -> f64 {
    let mut best = f64::INFINITY;
    for ca in a {
        for cb in b {
            best = best.min(contour_pair_distance(ca, cb));
            if best <= 0.0 {
                return 0.0;
            }
        }
    }
    best
}

fn contour_pair_distance(a: &[Coord<f64>], b: &[Coord<f64>]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::INFINITY;
    }
    if a.len() == 1 {
        return b
            .windows(2)
            .map(|s| point_segment_distance(a[0], s[0], s[1]))
            .fold(point_distance_fallback(a[0], b), f64::min);
    }
    if b.len() == 1 {
        return contour_pair_distance(b, a);
    }
    let mut best = f64::INFINITY;
    for sa in a.windows(2) {
        for sb in b.windows(2) {
            best = best.min(segment_segment_distance(sa[0], sa[1], sb[0], sb[1]));
            if best <= 0.0 {
                return 0.0;
            }
        }
    }
    best
}

fn point_distance_fallback(p: Coord<f64>, b: &[Coord<f64>]) -> f64 {
    let dx = p.x - b[0].x;
    let dy = p.y - b[0].y;
    (dx * dx + dy * dy).sqrt()
}
