//! Coastline repair: stitching open shoreline fragments into closed land
//! rings against the canvas rectangle.
//!
//! Fragments arrive clipped to the canvas, so every usable fragment enters
//! and leaves through the boundary. Closure walks the boundary in a fixed
//! rotational sense (increasing bearing from the canvas centre), alternating
//! between splicing in the next fragment and appending boundary corners,
//! until it comes back around to the fragment it started from. Coastline
//! direction follows the usual convention of water lying to the right of
//! travel; the walk does not validate that, it inherits it.

use geo::{Coord, Rect};

use crate::geom;

const EDGE_EPS: f64 = 1e-6;
/// A ring that needs more corner advances than this never closes; drop it.
const MAX_EDGE_ADVANCES: usize = 16;

struct OpenFragment {
    points: Vec<Coord<f64>>,
    entry_angle: f64,
    exit_angle: f64,
}

/// Joins fragments whose endpoints coincide (within `eps`) into longer
/// fragments, reversing orientation where needed.
pub fn merge_fragments(mut fragments: Vec<Vec<Coord<f64>>>, eps: f64) -> Vec<Vec<Coord<f64>>> {
    fragments.retain(|f| f.len() >= 2);
    loop {
        let mut joined_any = false;
        'scan: for i in 0..fragments.len() {
            for j in (i + 1)..fragments.len() {
                if let Some(joined) = try_join(&fragments[i], &fragments[j], eps) {
                    fragments[i] = joined;
                    fragments.remove(j);
                    joined_any = true;
                    break 'scan;
                }
            }
        }
        if !joined_any {
            return fragments;
        }
    }
}

fn try_join(a: &[Coord<f64>], b: &[Coord<f64>], eps: f64) -> Option<Vec<Coord<f64>>> {
    if coords_close(a[0], a[a.len() - 1], eps) || coords_close(b[0], b[b.len() - 1], eps) {
        return None;
    }
    let (a_first, a_last) = (a[0], a[a.len() - 1]);
    let (b_first, b_last) = (b[0], b[b.len() - 1]);
    let mut joined: Vec<Coord<f64>>;
    if coords_close(a_last, b_first, eps) {
        joined = a.to_vec();
        joined.extend_from_slice(&b[1..]);
    } else if coords_close(a_last, b_last, eps) {
        joined = a.to_vec();
        joined.extend(b[..b.len() - 1].iter().rev().copied());
    } else if coords_close(a_first, b_last, eps) {
        joined = b.to_vec();
        joined.extend_from_slice(&a[1..]);
    } else if coords_close(a_first, b_first, eps) {
        joined = b.iter().rev().copied().collect();
        joined.extend_from_slice(&a[1..]);
    } else {
        return None;
    }
    Some(joined)
}

/// Closes open coastline fragments into land rings against `rect`.
///
/// Fragments that do not start and end on the boundary, or touch it an odd
/// number of times, are ambiguous and dropped. Already-closed fragments
/// pass through as rings.
pub fn close_coastline_fragments(
    fragments: &[Vec<Coord<f64>>],
    rect: &Rect<f64>,
) -> Vec<Vec<Coord<f64>>> {
    let center = rect.center();
    let mut rings = Vec::new();
    let mut pool: Vec<OpenFragment> = Vec::new();

    for frag in fragments {
        if frag.len() < 2 {
            continue;
        }
        if coords_close(frag[0], frag[frag.len() - 1], EDGE_EPS) {
            rings.push(coerce_closed(frag.clone()));
            continue;
        }
        let crossings = frag.iter().filter(|p| on_boundary(rect, **p)).count();
        if crossings % 2 != 0
            || !on_boundary(rect, frag[0])
            || !on_boundary(rect, frag[frag.len() - 1])
        {
            log::debug!("dropping coastline fragment with ambiguous boundary contact");
            continue;
        }
        pool.push(OpenFragment {
            entry_angle: geom::bearing(center, frag[0]),
            exit_angle: geom::bearing(center, frag[frag.len() - 1]),
            points: frag.clone(),
        });
    }

    pool.sort_by(|a, b| {
        a.exit_angle
            .partial_cmp(&b.exit_angle)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    while !pool.is_empty() {
        let start = pool.remove(0);
        if let Some(ring) = close_one(start, &mut pool, rect, center) {
            rings.push(ring);
        }
    }
    rings
}

fn close_one(
    start: OpenFragment,
    pool: &mut Vec<OpenFragment>,
    rect: &Rect<f64>,
    center: Coord<f64>,
) -> Option<Vec<Coord<f64>>> {
    let origin_entry = start.points[0];
    let origin_entry_angle = start.entry_angle;
    let mut ring = start.points;
    let mut pending_angle = start.exit_angle;
    let mut edge = edge_of(rect, *ring.last()?)?;

    let mut advances = 0;
    while advances <= MAX_EDGE_ADVANCES {
        let remaining = geom::angle_forward(pending_angle, origin_entry_angle);

        // Next fragment entering on this edge, in rotation order, never
        // skipping past the ring's own entry point.
        let mut best: Option<(usize, f64)> = None;
        for (i, frag) in pool.iter().enumerate() {
            if edge_of(rect, frag.points[0]) != Some(edge) {
                continue;
            }
            let d = geom::angle_forward(pending_angle, frag.entry_angle);
            if d >= remaining {
                continue;
            }
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }

        if let Some((i, _)) = best {
            let frag = pool.remove(i);
            ring.extend_from_slice(&frag.points);
            pending_angle = frag.exit_angle;
            edge = edge_of(rect, *ring.last()?)?;
            continue;
        }

        let corner = far_corner(rect, edge);
        let corner_d = geom::angle_forward(pending_angle, geom::bearing(center, corner));
        if edge_of(rect, origin_entry) == Some(edge) && remaining <= corner_d {
            // Back at the starting fragment: close the ring on its entry.
            ring.push(origin_entry);
            return Some(coerce_closed(ring));
        }

        ring.push(corner);
        pending_angle = geom::bearing(center, corner);
        edge = (edge + 1) % 4;
        advances += 1;
    }
    log::debug!("coastline ring failed to close within the boundary walk bound; dropping");
    None
}

fn coerce_closed(mut ring: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    if ring.len() >= 2 {
        let first = ring[0];
        let last = ring[ring.len() - 1];
        if first != last {
            if coords_close(first, last, 1e-3) {
                *ring.last_mut().unwrap() = first;
            } else {
                ring.push(first);
            }
        }
    }
    ring
}

fn coords_close(a: Coord<f64>, b: Coord<f64>, eps: f64) -> bool {
    (a.x - b.x).abs() <= eps && (a.y - b.y).abs() <= eps
}

fn corner(rect: &Rect<f64>, index: usize) -> Coord<f64> {
    let (min, max) = (rect.min(), rect.max());
    match index % 4 {
        0 => Coord { x: min.x, y: min.y },
        1 => Coord { x: max.x, y: min.y },
        2 => Coord { x: max.x, y: max.y },
        _ => Coord { x: min.x, y: max.y },
    }
}

fn far_corner(rect: &Rect<f64>, edge: usize) -> Coord<f64> {
    corner(rect, edge + 1)
}

fn on_boundary(rect: &Rect<f64>, p: Coord<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    let on_x = (p.x - min.x).abs() <= EDGE_EPS || (p.x - max.x).abs() <= EDGE_EPS;
    let on_y = (p.y - min.y).abs() <= EDGE_EPS || (p.y - max.y).abs() <= EDGE_EPS;
    let in_x = p.x >= min.x - EDGE_EPS && p.x <= max.x + EDGE_EPS;
    let in_y = p.y >= min.y - EDGE_EPS && p.y <= max.y + EDGE_EPS;
    (on_x && in_y) || (on_y && in_x)
}

/// Which boundary edge a point lies on; a corner belongs to the edge that
/// starts there in rotation order.
fn edge_of(rect: &Rect<f64>, p: Coord<f64>) -> Option<usize> {
    for e in 0..4 {
        if on_edge(rect, e, p) {
            if coords_close(p, far_corner(rect, e), EDGE_EPS) {
                return Some((e + 1) % 4);
            }
            return Some(e);
        }
    }
    None
}

fn on_edge(rect: &Rect<f64>, edge: usize, p: Coord<f64>) -> bool {
    let (min, max) = (rect.min(), rect.max());
    match edge {
        0 => (p.y - min.y).abs() <= EDGE_EPS && p.x >= min.x - EDGE_EPS && p.x <= max.x + EDGE_EPS,
        1 => (p.x - max.x).abs() <= EDGE_EPS && p.y >= min.y - EDGE_EPS && p.y <= max.y + EDGE_EPS,
        2 => (p.y - max.y).abs() <= EDGE_EPS && p.x >= min.x - EDGE_EPS && p.x <= max.x + EDGE_EPS,
        _ => (p.x - min.x).abs() <= EDGE_EPS && p.y >= min.y - EDGE_EPS && p.y <= max.y + EDGE_EPS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn canvas() -> Rect<f64> {
        Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 100.0, y: 100.0 })
    }

    fn line(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| coord! { x: x, y: y }).collect()
    }

    #[test]
    fn two_fragments_close_into_one_ring() {
        let a = line(&[(0.0, 40.0), (50.0, 45.0), (100.0, 60.0)]);
        let b = line(&[(70.0, 100.0), (60.0, 80.0), (20.0, 100.0)]);
        let rings = close_coastline_fragments(&[a, b], &canvas());
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        // 3 + 3 fragment points, 2 inserted corners, 1 closing point.
        assert_eq!(ring.len(), 9);
        assert_eq!(ring.first(), ring.last());
        assert!(ring.contains(&coord! { x: 100.0, y: 100.0 }));
        assert!(ring.contains(&coord! { x: 0.0, y: 100.0 }));
    }

    #[test]
    fn single_crossing_fragment_closes_with_corners() {
        let a = line(&[(0.0, 40.0), (50.0, 45.0), (100.0, 60.0)]);
        let rings = close_coastline_fragments(&[a], &canvas());
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        assert_eq!(ring.len(), 6);
        assert_eq!(ring.first(), ring.last());
    }

    #[test]
    fn fragment_ending_inside_the_canvas_is_dropped() {
        let a = line(&[(0.0, 40.0), (50.0, 45.0)]);
        assert!(close_coastline_fragments(&[a], &canvas()).is_empty());
    }

    #[test]
    fn closed_fragment_passes_through() {
        let a = line(&[(30.0, 30.0), (60.0, 30.0), (45.0, 70.0), (30.0, 30.0)]);
        let rings = close_coastline_fragments(&[a.clone()], &canvas());
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0], a);
    }

    #[test]
    fn fragments_sharing_an_endpoint_merge() {
        let a = line(&[(0.0, 40.0), (50.0, 45.0)]);
        let b = line(&[(50.0, 45.0), (100.0, 60.0)]);
        let merged = merge_fragments(vec![a, b], 1e-9);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 3);
        assert_eq!(merged[0][0], coord! { x: 0.0, y: 40.0 });
        assert_eq!(merged[0][2], coord! { x: 100.0, y: 60.0 });
    }

    #[test]
    fn merge_handles_reversed_orientation() {
        let a = line(&[(0.0, 40.0), (50.0, 45.0)]);
        let b = line(&[(100.0, 60.0), (50.0, 45.0)]);
        let merged = merge_fragments(vec![a, b], 1e-9);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].len(), 3);
    }

    #[test]
    fn same_edge_pockets_make_separate_rings() {
        // Each fragment enters and exits on one edge with its entry just
        // ahead of its exit, so each ring closes on itself without corners.
        let a = line(&[(0.0, 40.0), (30.0, 50.0), (0.0, 60.0)]);
        let b = line(&[(100.0, 60.0), (70.0, 50.0), (100.0, 40.0)]);
        let rings = close_coastline_fragments(&[a, b], &canvas());
        assert_eq!(rings.len(), 2);
        for ring in &rings {
            assert_eq!(ring.len(), 4);
            assert_eq!(ring.first(), ring.last());
        }
    }
}
