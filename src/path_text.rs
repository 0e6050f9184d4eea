//! Text along a path: picking the straightest, most central stretch of a
//! line and walking glyphs along it one by one.
//!
//! The carrier path is clipped away from the canvas border and from already
//! occupied space first, so road names never run off the map or through
//! other labels. Each glyph is rotated to the local tangent and pushed
//! forward until it clears the glyphs placed before it.

use geo::{BooleanOps, Coord, LineString, MultiLineString};

use crate::geom;
use crate::occupancy::Occupancy;
use crate::text_metrics::{self, GlyphRecord};

/// Rendered text needs more room than its straight-line measurement when it
/// bends along a path.
pub const TEXT_PADDING_FACTOR: f64 = 1.2;
/// Default cap on the summed bearing changes inside a candidate segment.
pub const MAX_BEND: f64 = 7.0;

const GLYPH_RETRIES: usize = 30;
const CURSOR_STEP: f64 = 0.85;
const BEARING_BRACKET: f64 = 0.8;

/// One glyph fixed on the canvas: its outline contours in canvas units.
#[derive(Debug, Clone)]
pub struct PlacedGlyph {
    pub contours: Vec<Vec<Coord<f64>>>,
}

/// Result of laying a label along a path. `baseline` is the curve the
/// glyphs were walked along; the caller sweeps it by `band_height` when
/// registering the covered area.
#[derive(Debug, Clone)]
pub struct PathLabelLayout {
    pub glyphs: Vec<PlacedGlyph>,
    pub baseline: Vec<Coord<f64>>,
    pub band_height: f64,
}

/// Finds the sub-path `[start, end]` (node indexes) with the least bend
/// that is long enough for the text, preferring the most central one among
/// equals. `None` means the label cannot be placed on this path.
pub fn select_segment(
    points: &[Coord<f64>],
    text_width: f64,
    max_bend: f64,
) -> Option<(usize, usize)> {
    if points.len() < 2 {
        return None;
    }
    let seg_lens = geom::segment_lengths(points);
    let bearings = geom::segment_bearings(points);
    // Bearing change at each interior node, padded with zero at both ends so
    // indexes line up with nodes.
    let mut rad_diffs = Vec::with_capacity(points.len());
    rad_diffs.push(0.0);
    for pair in bearings.windows(2) {
        rad_diffs.push((pair[1] - pair[0]).abs());
    }
    rad_diffs.push(0.0);

    let needed = text_width * TEXT_PADDING_FACTOR;
    let mut min_rad = max_bend;
    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for start in 0..seg_lens.len() {
        let mut cur_len = 0.0;
        let mut end = None;
        for (i, seg_len) in seg_lens[start..].iter().enumerate() {
            cur_len += seg_len;
            if cur_len >= needed {
                end = Some(start + i + 1);
                break;
            }
        }
        let Some(end) = end else { continue };
        let rad: f64 = rad_diffs[start + 1..end].iter().sum();
        if rad < min_rad {
            min_rad = rad;
            candidates.clear();
            candidates.push((start, end));
        } else if rad == min_rad {
            candidates.push((start, end));
        }
    }

    // Among equally straight segments take the one closest to the middle of
    // the path: least imbalance between length before and after it.
    let mut best = None;
    let mut min_diff = f64::INFINITY;
    for (start, end) in candidates {
        let before: f64 = seg_lens[..start].iter().sum();
        let after: f64 = seg_lens[end..].iter().sum();
        let diff = (before - after).abs();
        if diff < min_diff {
            min_diff = diff;
            best = Some((start, end));
        }
    }
    best
}

/// Walks `glyphs` along `curve` starting near `start_offset` arc length.
///
/// A glyph is retried at most 30 cursor steps; if it still cannot clear the
/// glyphs placed before it, the rest of the label is dropped and whatever
/// was already placed stays.
pub fn place_glyphs(
    glyphs: &[GlyphRecord],
    curve: &[Coord<f64>],
    start_offset: f64,
) -> Vec<PlacedGlyph> {
    if curve.len() < 2 {
        return Vec::new();
    }
    // Never start a glyph right at the curve's tip.
    let mut cur_len = start_offset.max(1.0);
    let mut accepted: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut out = Vec::new();
    for glyph in glyphs {
        cur_len += glyph.spacing;
        let mut rotated: Vec<Vec<Coord<f64>>> = Vec::new();
        let mut last_rad = f64::NAN;
        let mut placed = false;
        for _ in 0..GLYPH_RETRIES {
            let pos = geom::point_at(curve, cur_len);
            let rad = geom::bearing_at(curve, cur_len, glyph.advance, BEARING_BRACKET);
            if rad != last_rad {
                rotated = glyph
                    .contours
                    .iter()
                    .map(|c| geom::rotate_coords(c, rad))
                    .collect();
                last_rad = rad;
            }
            let moved: Vec<Vec<Coord<f64>>> = rotated
                .iter()
                .map(|c| geom::translate_coords(c, pos.x, pos.y))
                .collect();
            cur_len += CURSOR_STEP;
            if geom::contours_distance(&accepted, &moved) >= glyph.spacing {
                accepted.extend(moved.iter().cloned());
                out.push(PlacedGlyph { contours: moved });
                placed = true;
                break;
            }
        }
        if !placed {
            break;
        }
    }
    out
}

/// Lays out a path label end to end: clip, pick a segment, orient, offset
/// the baseline, walk glyphs. Returns `None` whenever the label has to be
/// dropped; that is normal operation, not an error.
pub fn layout_path_label(
    occupancy: &Occupancy,
    canvas_width: f64,
    canvas_height: f64,
    points: &[Coord<f64>],
    text: &str,
    font_size: f64,
    font_family: &str,
) -> Option<PathLabelLayout> {
    let text = text.trim();
    if text.is_empty() || points.len() < 2 {
        return None;
    }
    let width = text_metrics::measure_text_width(text, font_size, font_family)?;
    if width <= 0.0 {
        return None;
    }
    let metrics = text_metrics::font_metrics(font_size, font_family)?;
    let height = metrics.line_height();

    let coords = clip_carrier(
        occupancy,
        canvas_width,
        canvas_height,
        points,
        width,
        height,
    )?;

    let (start, end) = select_segment(&coords, width, MAX_BEND)?;
    let mut sub: Vec<Coord<f64>> = coords[start..=end].to_vec();
    // Glyphs run left to right.
    if sub[sub.len() - 1].x < sub[0].x {
        sub.reverse();
    }
    let baseline = geom::offset_perpendicular(&sub, metrics.baseline_offset());

    let start_len = (geom::polyline_length(&baseline) - width) / 2.0;
    let glyphs = text_metrics::glyph_sequence(text, font_size, font_family)?;
    let placed = place_glyphs(&glyphs, &baseline, start_len);
    if placed.is_empty() {
        return None;
    }
    Some(PathLabelLayout {
        glyphs: placed,
        baseline,
        band_height: height,
    })
}

/// Removes the parts of the carrier path that run along the canvas border
/// or through occupied space, then picks the piece worth labelling.
fn clip_carrier(
    occupancy: &Occupancy,
    canvas_width: f64,
    canvas_height: f64,
    points: &[Coord<f64>],
    text_width: f64,
    text_height: f64,
) -> Option<Vec<Coord<f64>>> {
    let mut line = MultiLineString::new(vec![LineString::new(points.to_vec())]);

    let border_ring: Vec<Coord<f64>> = geom::rect_polygon(0.0, 0.0, canvas_width, canvas_height)
        .exterior()
        .coords()
        .copied()
        .collect();
    let border_band = geom::buffer_polyline(&border_ring, text_height);
    if !border_band.0.is_empty() {
        line = border_band.clip(&line, true);
    }
    if !occupancy.region().0.is_empty() {
        line = occupancy.region().clip(&line, true);
    }

    let pieces: Vec<Vec<Coord<f64>>> = line
        .0
        .into_iter()
        .map(|ls| ls.0)
        .filter(|coords| coords.len() >= 2 && geom::polyline_length(coords) > 0.0)
        .collect();
    match pieces.len() {
        0 => None,
        1 => pieces.into_iter().next(),
        _ => {
            let mut longest = None;
            let mut min_len = text_width * TEXT_PADDING_FACTOR;
            for piece in pieces {
                let len = geom::polyline_length(&piece);
                if len > min_len {
                    min_len = len;
                    longest = Some(piece);
                }
            }
            longest
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn line(points: &[(f64, f64)]) -> Vec<Coord<f64>> {
        points.iter().map(|&(x, y)| coord! { x: x, y: y }).collect()
    }

    fn square_glyph(size: f64, spacing: f64) -> GlyphRecord {
        GlyphRecord {
            contours: vec![line(&[
                (0.0, 0.0),
                (size, 0.0),
                (size, -size),
                (0.0, -size),
                (0.0, 0.0),
            ])],
            advance: size,
            spacing,
        }
    }

    #[test]
    fn straight_two_point_path_selects_whole_path() {
        let pts = line(&[(0.0, 0.0), (120.0, 0.0)]);
        assert_eq!(select_segment(&pts, 100.0, MAX_BEND), Some((0, 1)));
    }

    #[test]
    fn straight_path_with_nodes_keeps_zero_bend() {
        let pts = line(&[(0.0, 0.0), (40.0, 0.0), (80.0, 0.0), (120.0, 0.0)]);
        let (start, end) = select_segment(&pts, 95.0, MAX_BEND).unwrap();
        let chosen = &pts[start..=end];
        let bearings = geom::segment_bearings(chosen);
        assert!(bearings.windows(2).all(|w| (w[1] - w[0]).abs() == 0.0));
        assert!(geom::polyline_length(chosen) >= 95.0 * TEXT_PADDING_FACTOR);
    }

    #[test]
    fn too_bent_path_yields_nothing() {
        // Sharp zig-zag: every interior node turns by ~1.57 rad.
        let pts = line(&[
            (0.0, 0.0),
            (10.0, 10.0),
            (20.0, 0.0),
            (30.0, 10.0),
            (40.0, 0.0),
        ]);
        assert_eq!(select_segment(&pts, 30.0, 0.5), None);
    }

    #[test]
    fn too_short_path_yields_nothing() {
        let pts = line(&[(0.0, 0.0), (20.0, 0.0)]);
        assert_eq!(select_segment(&pts, 100.0, MAX_BEND), None);
    }

    #[test]
    fn centered_candidate_wins_among_equally_straight() {
        // Long straight path: many zero-bend windows; the winner should sit
        // around the middle.
        let pts: Vec<Coord<f64>> = (0..21).map(|i| coord! { x: i as f64 * 10.0, y: 0.0 }).collect();
        let (start, end) = select_segment(&pts, 40.0, MAX_BEND).unwrap();
        let before: f64 = geom::segment_lengths(&pts)[..start].iter().sum();
        let after: f64 = geom::segment_lengths(&pts)[end..].iter().sum();
        assert!((before - after).abs() <= 10.0);
    }

    #[test]
    fn glyphs_advance_along_a_straight_curve() {
        let curve = line(&[(0.0, 50.0), (200.0, 50.0)]);
        let glyphs: Vec<GlyphRecord> = (0..5).map(|_| square_glyph(6.0, 0.7)).collect();
        let placed = place_glyphs(&glyphs, &curve, 10.0);
        assert_eq!(placed.len(), 5);
        let mut last_x = f64::NEG_INFINITY;
        for glyph in &placed {
            let x = glyph.contours[0][0].x;
            assert!(x > last_x);
            last_x = x;
        }
    }

    #[test]
    fn impossible_glyph_stops_the_rest_of_the_label() {
        let curve = line(&[(0.0, 0.0), (200.0, 0.0)]);
        let glyphs = vec![
            square_glyph(6.0, 0.7),
            // Spacing no cursor walk of 30 steps can satisfy.
            square_glyph(6.0, 1.0e6),
            square_glyph(6.0, 0.7),
        ];
        let placed = place_glyphs(&glyphs, &curve, 1.0);
        assert_eq!(placed.len(), 1);
    }

    #[test]
    fn placement_respects_minimum_spacing() {
        let curve = line(&[(0.0, 0.0), (300.0, 0.0)]);
        let glyphs = vec![square_glyph(8.0, 0.7), square_glyph(8.0, 5.0)];
        let placed = place_glyphs(&glyphs, &curve, 1.0);
        assert_eq!(placed.len(), 2);
        let gap = geom::contours_distance(&placed[0].contours, &placed[1].contours);
        assert!(gap >= 5.0);
    }

    #[test]
    fn occupied_space_splits_the_carrier() {
        let mut occ = Occupancy::empty();
        occ.union(&geom::rect_polygon(90.0, 40.0, 110.0, 60.0), 0.0);
        let pts = line(&[(0.0, 50.0), (200.0, 50.0)]);
        let piece = clip_carrier(&occ, 200.0, 100.0, &pts, 20.0, 4.0).unwrap();
        // The kept piece avoids the reserved block around x 90..110.
        let len = geom::polyline_length(&piece);
        assert!(len < 95.0 && len > 20.0 * TEXT_PADDING_FACTOR);
    }
}
