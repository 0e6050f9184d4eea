//! Deferred annotations: labels and icons drawn after all opaque layers,
//! each placed against the occupancy region so none of them overlap.

use geo::{Coord, Polygon};

use crate::geom;
use crate::occupancy::Occupancy;

/// Crowding pre-filter radius around a label's anchor.
pub const DENSITY_RADIUS: f64 = 90.0;
/// A label may drift at most this fraction of the canvas's larger dimension
/// away from its anchor before it is dropped instead.
pub const MAX_ANCHOR_DRIFT: f64 = 0.1;

const FOOTPRINT_PAD: f64 = 2.0;

/// The closed set of geometry kinds the annotation pass understands.
#[derive(Debug, Clone)]
pub enum AnnotationGeometry {
    Point(Coord<f64>),
    Path(Vec<Coord<f64>>),
    Area(Vec<Coord<f64>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextTransform {
    Lowercase,
    Uppercase,
    Capitalize,
}

impl TextTransform {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lowercase" => Some(TextTransform::Lowercase),
            "uppercase" => Some(TextTransform::Uppercase),
            "capitalize" => Some(TextTransform::Capitalize),
            _ => None,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            TextTransform::Lowercase => text.to_lowercase(),
            TextTransform::Uppercase => text.to_uppercase(),
            TextTransform::Capitalize => text
                .split_whitespace()
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub color: String,
    pub font_size: f64,
    pub font_family: String,
    pub halo_width: f64,
    pub halo_color: String,
    pub transform: Option<TextTransform>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            color: "#000000".to_string(),
            font_size: 10.0,
            font_family: "sans-serif".to_string(),
            halo_width: 1.5,
            halo_color: "#ffffff".to_string(),
            transform: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Icon {
    pub href: String,
    pub size: f64,
    pub margin: f64,
}

/// One deferred annotation, queued while drawing opaque layers and placed
/// afterwards in decreasing `priority` order.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub geometry: AnnotationGeometry,
    pub text: Option<String>,
    pub icon: Option<Icon>,
    pub style: TextStyle,
    pub priority: i32,
}

/// A footprint at its ideal (unshifted) position plus the anchor bounding
/// how far it may drift.
#[derive(Debug, Clone, Copy)]
pub struct PlacementCandidate {
    pub min_x: f64,
    pub min_y: f64,
    pub width: f64,
    pub height: f64,
    pub anchor: Coord<f64>,
}

impl PlacementCandidate {
    pub fn polygon(&self) -> Polygon<f64> {
        geom::rect_polygon(
            self.min_x,
            self.min_y,
            self.min_x + self.width,
            self.min_y + self.height,
        )
    }
}

/// Footprint of a plain text label centred on its anchor.
pub fn text_candidate(anchor: Coord<f64>, text_width: f64, text_height: f64) -> PlacementCandidate {
    PlacementCandidate {
        min_x: anchor.x - text_width / 2.0 - FOOTPRINT_PAD,
        min_y: anchor.y - text_height / 2.0 - FOOTPRINT_PAD,
        width: text_width + 2.0 * FOOTPRINT_PAD,
        height: text_height + 2.0 * FOOTPRINT_PAD,
        anchor,
    }
}

/// Footprint of an icon centred on its anchor with text to its right.
pub fn icon_text_candidate(
    anchor: Coord<f64>,
    icon: &Icon,
    text_width: f64,
    text_height: f64,
) -> PlacementCandidate {
    let tall = text_height.max(icon.size);
    PlacementCandidate {
        min_x: anchor.x - icon.size / 2.0,
        min_y: anchor.y - tall / 2.0,
        width: icon.size * 1.5 + icon.margin + text_width,
        height: tall,
        anchor,
    }
}

/// Footprint of a standalone icon, inflated for the search.
pub fn icon_candidate(anchor: Coord<f64>, icon: &Icon) -> PlacementCandidate {
    PlacementCandidate {
        min_x: anchor.x - icon.size / 2.0 - FOOTPRINT_PAD,
        min_y: anchor.y - icon.size / 2.0 - FOOTPRINT_PAD,
        width: icon.size + 2.0 * FOOTPRINT_PAD,
        height: icon.size + 2.0 * FOOTPRINT_PAD,
        anchor,
    }
}

/// Places a point label footprint: crowding pre-filter, local placement
/// search, then the drift acceptance rule. Returns the placed min-x/min-y
/// position, or `None` when the label should be dropped.
pub fn layout_point_label(
    occupancy: &Occupancy,
    candidate: &PlacementCandidate,
    canvas_max_dim: f64,
) -> Option<(f64, f64)> {
    if occupancy.density(candidate.anchor.x, candidate.anchor.y, DENSITY_RADIUS) > 1 {
        return None;
    }
    let (x, y) = occupancy.find_position(&candidate.polygon(), 10, 4.0)?;
    let dx = x - candidate.min_x;
    let dy = y - candidate.min_y;
    if (dx * dx + dy * dy).sqrt() > MAX_ANCHOR_DRIFT * canvas_max_dim {
        log::trace!("dropping label: placed too far from its anchor");
        return None;
    }
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::rect_polygon;
    use geo::coord;

    #[test]
    fn text_transforms() {
        assert_eq!(TextTransform::Uppercase.apply("Ye Olde Pub"), "YE OLDE PUB");
        assert_eq!(TextTransform::Lowercase.apply("Ye Olde Pub"), "ye olde pub");
        assert_eq!(
            TextTransform::Capitalize.apply("rue de la paix"),
            "Rue De La Paix"
        );
        assert_eq!(TextTransform::parse("UPPERCASE"), Some(TextTransform::Uppercase));
        assert_eq!(TextTransform::parse("smallcaps"), None);
    }

    #[test]
    fn free_label_is_placed_at_its_ideal_position() {
        let occ = Occupancy::new(800.0, 600.0);
        let candidate = text_candidate(coord! { x: 400.0, y: 300.0 }, 60.0, 12.0);
        let placed = layout_point_label(&occ, &candidate, 800.0).unwrap();
        assert_eq!(placed, (candidate.min_x, candidate.min_y));
    }

    #[test]
    fn crowded_anchor_aborts_before_searching() {
        let mut occ = Occupancy::new(800.0, 600.0);
        occ.union(&rect_polygon(300.0, 250.0, 360.0, 270.0), 0.0);
        occ.union(&rect_polygon(440.0, 330.0, 500.0, 350.0), 0.0);
        let candidate = text_candidate(coord! { x: 400.0, y: 300.0 }, 60.0, 12.0);
        assert_eq!(layout_point_label(&occ, &candidate, 800.0), None);
    }

    #[test]
    fn drift_cap_rejects_distant_placements() {
        let mut occ = Occupancy::empty();
        // A wide wall the label escapes only by walking well upwards: the
        // search finds a spot, but 16 units of drift is too much on a small
        // canvas and fine on a larger one.
        occ.union(&rect_polygon(0.0, 0.0, 200.0, 20.0), 0.0);
        let candidate = text_candidate(coord! { x: 100.0, y: 14.0 }, 30.0, 10.0);
        assert_eq!(layout_point_label(&occ, &candidate, 100.0), None);
        assert!(layout_point_label(&occ, &candidate, 200.0).is_some());
    }
}
