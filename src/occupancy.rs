//! The occupancy region: every part of the canvas already claimed by drawn
//! content, grown monotonically over one render pass.
//!
//! All annotation placement decisions are made against this region. It is
//! owned by the canvas of a single render and never shared across renders.

use geo::{coord, Area, BooleanOps, EuclideanDistance, Intersects, MultiPolygon, Point, Polygon};

use crate::geom;

/// Margin kept around conflicting objects (text, icons) so neighbouring
/// annotations do not touch.
pub const CONFLICT_MARGIN: f64 = 3.0;

/// How far the off-canvas frame extends beyond the canvas on every side,
/// as a multiple of the larger canvas dimension.
const FRAME_EXTENT: f64 = 10.0;

const SHIFTS: [(f64, f64); 4] = [(1.0, 0.0), (0.0, 1.0), (-1.0, 0.0), (0.0, -1.0)];

pub struct Occupancy {
    region: MultiPolygon<f64>,
}

impl Occupancy {
    /// Region for a `width` x `height` canvas, pre-seeded with the
    /// out-of-canvas frame so nothing gets placed off the map.
    pub fn new(width: f64, height: f64) -> Self {
        let pad = width.max(height).max(1.0) * FRAME_EXTENT;
        let outer = geom::rect_polygon(-pad, -pad, width + pad, height + pad);
        let hole = geom::rect_polygon(0.0, 0.0, width, height);
        let frame = Polygon::new(
            outer.exterior().clone(),
            vec![hole.exterior().clone()],
        );
        Self {
            region: MultiPolygon::new(vec![frame]),
        }
    }

    /// Region with no seed at all. Placement is then unconstrained by the
    /// canvas extent; used by tests and by callers that clip separately.
    pub fn empty() -> Self {
        Self {
            region: MultiPolygon::new(vec![]),
        }
    }

    pub fn region(&self) -> &MultiPolygon<f64> {
        &self.region
    }

    /// Grows the region by `shape` buffered by `margin`. A degenerate
    /// buffered input is a silent no-op.
    pub fn union(&mut self, shape: &Polygon<f64>, margin: f64) {
        let buffered = geom::buffer_polygon(shape, margin);
        self.absorb(buffered);
    }

    /// Grows the region by a polyline swept with `radius` (the covered band
    /// of a path label).
    pub fn union_polyline(&mut self, points: &[geo::Coord<f64>], radius: f64) {
        let buffered = geom::buffer_polyline(points, radius);
        self.absorb(buffered);
    }

    fn absorb(&mut self, addition: MultiPolygon<f64>) {
        if addition.unsigned_area() <= 0.0 {
            return;
        }
        if self.region.0.is_empty() {
            self.region = addition;
        } else {
            self.region = self.region.union(&addition);
        }
    }

    /// Number of disjoint region components within `radius` of the point.
    /// Used as a crowding pre-filter: 0 is clear, 1 still worth a placement
    /// attempt, more than 1 means the caller should give up early.
    pub fn density(&self, x: f64, y: f64, radius: f64) -> usize {
        let point = Point::from(coord! { x: x, y: y });
        self.region
            .iter()
            .filter(|component| point.euclidean_distance(*component) <= radius)
            .count()
    }

    pub fn intersects(&self, shape: &Polygon<f64>) -> bool {
        self.region.intersects(shape)
    }

    pub fn intersection_area(&self, shape: &Polygon<f64>) -> f64 {
        // Degenerate candidates cannot overlap anything by area.
        if self.region.0.is_empty() || shape.unsigned_area() <= 0.0 {
            return 0.0;
        }
        self.region
            .intersection(&MultiPolygon::new(vec![shape.clone()]))
            .unsigned_area()
    }

    /// Local search for a free spot near the candidate's own position.
    ///
    /// The candidate's min-x/min-y corner is its position. Each move
    /// evaluates the four axis-aligned single-step translations and adopts
    /// the one with the smallest remaining overlap (a later direction wins
    /// ties); a move that cannot strictly reduce the overlap leaves the
    /// position alone but still consumes budget. Success is overlap-free
    /// placement, checked before every move and once after the last.
    pub fn find_position(
        &self,
        candidate: &Polygon<f64>,
        number: usize,
        step: f64,
    ) -> Option<(f64, f64)> {
        let (mut x, mut y) = min_corner(candidate);
        let mut current = candidate.clone();
        for _ in 0..number {
            let cur_area = self.intersection_area(&current);
            if cur_area <= 0.0 {
                return Some((x, y));
            }
            let mut best_area = cur_area;
            let mut best: Option<(f64, f64, Polygon<f64>)> = None;
            for (sx, sy) in SHIFTS {
                let dx = sx * step;
                let dy = sy * step;
                let shifted = translate_polygon(&current, dx, dy);
                let shifted_area = self.intersection_area(&shifted);
                if shifted_area <= best_area {
                    best_area = shifted_area;
                    best = Some((dx, dy, shifted));
                }
            }
            if best_area < cur_area {
                if let Some((dx, dy, shifted)) = best {
                    current = shifted;
                    x += dx;
                    y += dy;
                }
            }
        }
        if self.intersection_area(&current) <= 0.0 {
            Some((x, y))
        } else {
            None
        }
    }
}

fn min_corner(polygon: &Polygon<f64>) -> (f64, f64) {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    for c in polygon.exterior().coords() {
        min_x = min_x.min(c.x);
        min_y = min_y.min(c.y);
    }
    (min_x, min_y)
}

fn translate_polygon(polygon: &Polygon<f64>, dx: f64, dy: f64) -> Polygon<f64> {
    let exterior: Vec<geo::Coord<f64>> =
        geom::translate_coords(&polygon.exterior().coords().copied().collect::<Vec<_>>(), dx, dy);
    let interiors: Vec<geo::LineString<f64>> = polygon
        .interiors()
        .iter()
        .map(|ring| {
            geo::LineString::new(geom::translate_coords(
                &ring.coords().copied().collect::<Vec<_>>(),
                dx,
                dy,
            ))
        })
        .collect();
    Polygon::new(geo::LineString::new(exterior), interiors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Polygon<f64> {
        geom::rect_polygon(min_x, min_y, max_x, max_y)
    }

    #[test]
    fn free_candidate_keeps_its_position() {
        let occ = Occupancy::empty();
        let pos = occ.find_position(&rect(5.0, 7.0, 25.0, 17.0), 10, 4.0);
        assert_eq!(pos, Some((5.0, 7.0)));
    }

    #[test]
    fn shifts_out_of_a_reserved_square() {
        let mut occ = Occupancy::empty();
        occ.union(&rect(0.0, 0.0, 20.0, 20.0), 0.0);

        let candidate = rect(10.0, 10.0, 50.0, 30.0);
        assert_eq!(occ.find_position(&candidate, 10, 1.0), Some((10.0, 20.0)));
        assert_eq!(occ.find_position(&candidate, 5, 1.0), None);

        // Degenerate candidate with no budget resolves in place.
        let flat = rect(30.0, 30.0, 50.0, 30.0);
        assert_eq!(occ.find_position(&flat, 0, 4.0), Some((30.0, 30.0)));
    }

    #[test]
    fn found_position_is_overlap_free() {
        let mut occ = Occupancy::empty();
        occ.union(&rect(0.0, 0.0, 20.0, 20.0), 0.0);
        let pos = occ
            .find_position(&rect(10.0, 10.0, 50.0, 30.0), 10, 1.0)
            .unwrap();
        let placed = rect(pos.0, pos.1, pos.0 + 40.0, pos.1 + 20.0);
        assert_eq!(occ.intersection_area(&placed), 0.0);
    }

    #[test]
    fn density_counts_disjoint_components() {
        let mut occ = Occupancy::empty();
        occ.union(&rect(0.0, 0.0, 20.0, 20.0), 0.0);
        occ.union(&rect(100.0, 0.0, 120.0, 20.0), 0.0);
        assert_eq!(occ.density(10.0, 10.0, 10.0), 1);
        assert_eq!(occ.density(60.0, 10.0, 55.0), 2);
        assert_eq!(occ.density(60.0, 200.0, 10.0), 0);
    }

    #[test]
    fn density_is_invariant_to_region_representation() {
        let mut one = Occupancy::empty();
        one.union(&rect(0.0, 0.0, 20.0, 20.0), 0.0);

        // Same area accumulated as two touching halves: the union dissolves
        // the shared edge, so both accumulators see one component.
        let mut halves = Occupancy::empty();
        halves.union(&rect(0.0, 0.0, 10.0, 20.0), 0.0);
        halves.union(&rect(10.0, 0.0, 20.0, 20.0), 0.0);

        for &(x, y, r) in &[(10.0, 10.0, 5.0), (25.0, 10.0, 6.0), (40.0, 40.0, 5.0)] {
            assert_eq!(one.density(x, y, r), halves.density(x, y, r));
        }
    }

    #[test]
    fn canvas_frame_blocks_offscreen_placement() {
        let occ = Occupancy::new(100.0, 80.0);
        // Fully outside the canvas: swallowed by the frame, no escape in a
        // handful of moves.
        assert_eq!(occ.find_position(&rect(-60.0, 10.0, -20.0, 30.0), 10, 4.0), None);
        // Fully inside: untouched.
        assert_eq!(
            occ.find_position(&rect(10.0, 10.0, 40.0, 20.0), 10, 4.0),
            Some((10.0, 10.0))
        );
    }

    #[test]
    fn union_of_degenerate_shape_is_a_noop() {
        let mut occ = Occupancy::empty();
        occ.union(&rect(5.0, 5.0, 5.0, 25.0), 0.0);
        assert_eq!(occ.region().0.len(), 0);
        assert_eq!(occ.density(5.0, 5.0, 10.0), 0);
    }
}
