//! The render driver: pulls styled features from the source and draws them
//! in layer order (background, coastlines, polygons, lines, points), then
//! flushes the deferred annotations in decreasing priority.

use std::collections::BTreeMap;

use geo::{BooleanOps, Centroid, Coord, LineString, MultiLineString};

use crate::annotate::{Annotation, AnnotationGeometry, Icon, TextStyle, TextTransform};
use crate::canvas::{Canvas, Stroke};
use crate::coastline;
use crate::config::{GeomKind, StyleAttrs, StyleSheet};
use crate::error::Error;
use crate::geom;
use crate::source::{Feature, FeatureSource, Geometry};

/// Relative dilation of the query bbox so features just outside the canvas
/// whose strokes reach into it are still fetched.
const QUERY_DILATION: f64 = 0.0005;

const FRAGMENT_MERGE_EPS: f64 = 1e-6;

pub struct Renderer<'a> {
    canvas: &'a mut Canvas,
    sheet: &'a StyleSheet,
    source: &'a dyn FeatureSource,
    query_bbox: (f64, f64, f64, f64),
    annotations: Vec<Annotation>,
}

impl<'a> Renderer<'a> {
    pub fn new(canvas: &'a mut Canvas, sheet: &'a StyleSheet, source: &'a dyn FeatureSource) -> Self {
        let (min_lon, min_lat, max_lon, max_lat) = canvas.bbox();
        let diag = ((max_lon - min_lon).powi(2) + (max_lat - min_lat).powi(2)).sqrt();
        let dilation = QUERY_DILATION * diag;
        let query_bbox = (
            min_lon - dilation,
            min_lat - dilation,
            max_lon + dilation,
            max_lat + dilation,
        );
        Self {
            canvas,
            sheet,
            source,
            query_bbox,
            annotations: Vec::new(),
        }
    }

    /// Runs the full render pass in layer order.
    pub fn run(&mut self) -> Result<(), Error> {
        let scale = self.canvas.scale;
        log::debug!(
            "rendering at scale {:.1} m/px (level {:?})",
            scale,
            self.sheet.level_for(scale)
        );
        self.canvas
            .draw_background(&self.sheet.map_background.clone());
        self.coastlines();
        self.polygons()?;
        self.lines()?;
        self.points()?;
        self.flush_annotations();
        Ok(())
    }

    /// Sea fill and land synthesis: when any coastline is present, flood the
    /// canvas with sea colour, then fill closed land rings with the map
    /// background.
    fn coastlines(&mut self) {
        let coast_tag = ("natural", "coastline");
        let lines: Vec<&Feature> = self
            .source
            .features(GeomKind::Line, self.query_bbox)
            .into_iter()
            .filter(|f| f.tag(coast_tag.0).as_deref() == Some(coast_tag.1))
            .collect();
        let polygons: Vec<&Feature> = self
            .source
            .features(GeomKind::Polygon, self.query_bbox)
            .into_iter()
            .filter(|f| f.tag(coast_tag.0).as_deref() == Some(coast_tag.1))
            .collect();
        if lines.is_empty() && polygons.is_empty() {
            return;
        }

        let sea = self.sheet.sea_color.clone();
        let land = self.sheet.map_background.clone();
        self.canvas.draw_background(&sea);

        // Clip open coastlines to the canvas so every fragment enters and
        // leaves through the boundary, then stitch them into land rings.
        let mut raw: Vec<LineString<f64>> = Vec::new();
        for feature in &lines {
            match &feature.geometry {
                Geometry::LineString { coordinates } => {
                    raw.push(LineString::new(self.canvas.transform_coords(coordinates)));
                }
                Geometry::MultiLineString { coordinates } => {
                    for part in coordinates {
                        raw.push(LineString::new(self.canvas.transform_coords(part)));
                    }
                }
                _ => {}
            }
        }
        let canvas_poly = geom::rect_polygon(0.0, 0.0, self.canvas.width, self.canvas.height);
        let clipped = canvas_poly.clip(&MultiLineString::new(raw), false);
        let fragments: Vec<Vec<Coord<f64>>> = clipped.0.into_iter().map(|ls| ls.0).collect();
        let merged = coastline::merge_fragments(fragments, FRAGMENT_MERGE_EPS);
        let rect = self.canvas.rect();
        for ring in coastline::close_coastline_fragments(&merged, &rect) {
            self.canvas.draw_ring_units(&ring, &land);
        }

        // Island polygons come pre-closed; fill them directly.
        for feature in &polygons {
            match &feature.geometry {
                Geometry::Polygon { coordinates } => {
                    if let Some(exterior) = coordinates.first() {
                        self.canvas.draw_polygon(exterior, &[], &land, None);
                    }
                }
                Geometry::MultiPolygon { coordinates } => {
                    for part in coordinates {
                        if let Some(exterior) = part.first() {
                            self.canvas.draw_polygon(exterior, &[], &land, None);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn polygons(&mut self) -> Result<(), Error> {
        for (feature, style) in self.styled_features(GeomKind::Polygon) {
            let fill = style
                .background_color
                .clone()
                .unwrap_or_else(|| "none".to_string());
            let border = style.border_width.map(|width| OwnedStroke {
                color: style
                    .border_color
                    .clone()
                    .unwrap_or_else(|| "#000000".to_string()),
                width,
                dash: style.line_dash.clone(),
            });
            match &feature.geometry {
                Geometry::Polygon { coordinates } => {
                    self.draw_polygon_rings(coordinates, &fill, border.as_ref());
                }
                Geometry::MultiPolygon { coordinates } => {
                    for part in coordinates {
                        self.draw_polygon_rings(part, &fill, border.as_ref());
                    }
                }
                _ => continue,
            }
            self.queue_annotation(feature, &style)?;
        }
        Ok(())
    }

    fn draw_polygon_rings(
        &mut self,
        rings: &[Vec<[f64; 2]>],
        fill: &str,
        border: Option<&OwnedStroke>,
    ) {
        let Some(exterior) = rings.first() else {
            return;
        };
        let stroke = border.map(OwnedStroke::as_stroke);
        self.canvas
            .draw_polygon(exterior, &rings[1..], fill, stroke.as_ref());
    }

    /// Lines draw in three passes per z bucket so casings nest: outlines
    /// first, then borders, then the core strokes.
    fn lines(&mut self) -> Result<(), Error> {
        let styled = self.styled_features(GeomKind::Line);
        let mut buckets: BTreeMap<i32, Vec<(&Feature, &StyleAttrs)>> = BTreeMap::new();
        for (feature, style) in &styled {
            buckets
                .entry(style.z_index.unwrap_or(0))
                .or_default()
                .push((*feature, style));
        }

        for bucket in buckets.values() {
            for &(feature, style) in bucket {
                let Some(width) = style.width else { continue };
                if let Some(outline_width) = style.outline_width {
                    let total =
                        width + 2.0 * style.border_width.unwrap_or(0.0) + 2.0 * outline_width;
                    let color = style
                        .outline_color
                        .clone()
                        .unwrap_or_else(|| "#ffffff".to_string());
                    self.draw_line_geometry(feature, &color, total, None);
                }
            }
            for &(feature, style) in bucket {
                let Some(width) = style.width else { continue };
                if let Some(border_width) = style.border_width {
                    let total = width + 2.0 * border_width;
                    let color = style
                        .border_color
                        .clone()
                        .unwrap_or_else(|| "#000000".to_string());
                    self.draw_line_geometry(feature, &color, total, None);
                }
            }
            for &(feature, style) in bucket {
                let Some(width) = style.width else { continue };
                let color = style.color.clone().unwrap_or_else(|| "#000000".to_string());
                self.draw_line_geometry(feature, &color, width, style.line_dash.as_deref());
            }
        }
        drop(buckets);

        for (feature, style) in &styled {
            self.queue_annotation(*feature, style)?;
        }
        Ok(())
    }

    fn draw_line_geometry(&mut self, feature: &Feature, color: &str, width: f64, dash: Option<&str>) {
        let stroke = Stroke { color, width, dash };
        match &feature.geometry {
            Geometry::LineString { coordinates } => self.canvas.draw_line(coordinates, &stroke),
            Geometry::MultiLineString { coordinates } => {
                for part in coordinates {
                    self.canvas.draw_line(part, &stroke);
                }
            }
            _ => {}
        }
    }

    fn points(&mut self) -> Result<(), Error> {
        for (feature, style) in self.styled_features(GeomKind::Point) {
            let Geometry::Point { coordinates } = &feature.geometry else {
                continue;
            };
            if let Some(radius) = style.circle_radius {
                let fill = style
                    .circle_color
                    .clone()
                    .unwrap_or_else(|| "#000000".to_string());
                let border = style.border_width.map(|width| OwnedStroke {
                    color: style
                        .border_color
                        .clone()
                        .unwrap_or_else(|| "#000000".to_string()),
                    width,
                    dash: None,
                });
                let stroke = border.as_ref().map(OwnedStroke::as_stroke);
                self.canvas
                    .draw_circle(*coordinates, radius, &fill, stroke.as_ref());
            }
            self.queue_annotation(feature, &style)?;
        }
        Ok(())
    }

    fn styled_features(&self, kind: GeomKind) -> Vec<(&'a Feature, StyleAttrs)> {
        let scale = self.canvas.scale;
        let mut styled: Vec<(&Feature, StyleAttrs)> = self
            .source
            .features(kind, self.query_bbox)
            .into_iter()
            .filter_map(|feature| {
                self.sheet
                    .resolve(scale, kind, &feature.tags())
                    .map(|style| (feature, style))
            })
            .collect();
        styled.sort_by_key(|(_, style)| style.z_index.unwrap_or(0));
        log::debug!("{} styled {} features", styled.len(), kind.name());
        styled
    }

    /// Queues the feature's label/icon for the deferred annotation pass, if
    /// its style asks for one.
    fn queue_annotation(&mut self, feature: &Feature, style: &StyleAttrs) -> Result<(), Error> {
        let text = style
            .text
            .as_deref()
            .and_then(|property| feature.tag(property))
            .filter(|t| !t.trim().is_empty());
        let icon = style.icon.clone().map(|href| Icon {
            href,
            size: style.icon_size.unwrap_or(12.0),
            margin: style.icon_margin.unwrap_or(4.0),
        });
        if text.is_none() && icon.is_none() {
            return Ok(());
        }

        let geometry = match &feature.geometry {
            Geometry::Point { coordinates } => {
                AnnotationGeometry::Point(Coord { x: coordinates[0], y: coordinates[1] })
            }
            Geometry::LineString { coordinates } => {
                AnnotationGeometry::Path(to_coords(coordinates))
            }
            Geometry::MultiLineString { coordinates } => {
                // Label the longest part.
                let longest = coordinates
                    .iter()
                    .max_by(|a, b| {
                        let la = geom::polyline_length(&to_coords(a));
                        let lb = geom::polyline_length(&to_coords(b));
                        la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
                    });
                match longest {
                    Some(part) => AnnotationGeometry::Path(to_coords(part)),
                    None => return Ok(()),
                }
            }
            Geometry::Polygon { coordinates } => match coordinates.first() {
                Some(exterior) => AnnotationGeometry::Area(to_coords(exterior)),
                None => return Ok(()),
            },
            Geometry::MultiPolygon { coordinates } => {
                let largest = coordinates
                    .iter()
                    .filter_map(|part| part.first())
                    .max_by_key(|ring| ring.len());
                match largest {
                    Some(exterior) => AnnotationGeometry::Area(to_coords(exterior)),
                    None => return Ok(()),
                }
            }
        };
        // Icons are a point concept; a stylesheet hanging one on a line or
        // area is a configuration defect, not a skippable condition.
        if icon.is_some() && !matches!(geometry, AnnotationGeometry::Point(_)) {
            return Err(Error::UnsupportedGeometry(format!(
                "icon on {} geometry",
                feature.geometry.kind().name()
            )));
        }

        self.annotations.push(Annotation {
            geometry,
            text,
            icon,
            style: text_style(style),
            priority: style.z_index.unwrap_or(0),
        });
        Ok(())
    }

    /// Places and draws the deferred annotations: points before paths before
    /// areas, higher z first within each kind.
    fn flush_annotations(&mut self) {
        let mut annotations = std::mem::take(&mut self.annotations);
        annotations.sort_by_key(|a| {
            let kind_rank = match a.geometry {
                AnnotationGeometry::Point(_) => 0,
                AnnotationGeometry::Path(_) => 1,
                AnnotationGeometry::Area(_) => 2,
            };
            (kind_rank, -a.priority)
        });

        for annotation in annotations {
            match &annotation.geometry {
                AnnotationGeometry::Point(point) => {
                    let lonlat = [point.x, point.y];
                    match (&annotation.text, &annotation.icon) {
                        (Some(text), icon @ Some(_)) => {
                            self.canvas
                                .draw_text(lonlat, text, &annotation.style, icon.as_ref());
                        }
                        (Some(text), None) => {
                            self.canvas.draw_text(lonlat, text, &annotation.style, None);
                        }
                        (None, Some(icon)) => self.canvas.draw_icon(lonlat, icon),
                        (None, None) => {}
                    }
                }
                AnnotationGeometry::Path(points) => {
                    if let Some(text) = &annotation.text {
                        let coords: Vec<[f64; 2]> =
                            points.iter().map(|c| [c.x, c.y]).collect();
                        self.canvas
                            .draw_text_on_line(&coords, text, &annotation.style);
                    }
                }
                AnnotationGeometry::Area(ring) => {
                    if let Some(text) = &annotation.text {
                        let polygon = geo::Polygon::new(LineString::new(ring.clone()), vec![]);
                        if let Some(center) = polygon.centroid() {
                            self.canvas.draw_text(
                                [center.x(), center.y()],
                                text,
                                &annotation.style,
                                None,
                            );
                        }
                    }
                }
            }
        }
    }
}

struct OwnedStroke {
    color: String,
    width: f64,
    dash: Option<String>,
}

impl OwnedStroke {
    fn as_stroke(&self) -> Stroke<'_> {
        Stroke {
            color: &self.color,
            width: self.width,
            dash: self.dash.as_deref(),
        }
    }
}

fn to_coords(coords: &[[f64; 2]]) -> Vec<Coord<f64>> {
    coords.iter().map(|c| Coord { x: c[0], y: c[1] }).collect()
}

fn text_style(style: &StyleAttrs) -> TextStyle {
    let defaults = TextStyle::default();
    TextStyle {
        color: style.text_color.clone().unwrap_or(defaults.color),
        font_size: style.font_size.unwrap_or(defaults.font_size),
        font_family: style.font_family.clone().unwrap_or(defaults.font_family),
        halo_width: style.text_halo_width.unwrap_or(defaults.halo_width),
        halo_color: style.text_halo_color.clone().unwrap_or(defaults.halo_color),
        transform: style
            .text_transform
            .as_deref()
            .and_then(TextTransform::parse),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projection;
    use crate::source::GeoJsonSource;

    const BBOX: (f64, f64, f64, f64) = (11.0, 45.5, 11.2, 45.65);

    fn render(doc: &str) -> String {
        let source = GeoJsonSource::from_str(doc).unwrap();
        let sheet = StyleSheet::default_sheet();
        let mut canvas = Canvas::new(BBOX, 400, Projection::Mercator).unwrap();
        let mut renderer = Renderer::new(&mut canvas, &sheet, &source);
        renderer.run().unwrap();
        canvas.to_svg()
    }

    #[test]
    fn renders_styled_layers() {
        let svg = render(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": {
                            "type": "LineString",
                            "coordinates": [[11.02, 45.52], [11.18, 45.63]]
                        },
                        "properties": { "highway": "motorway", "ref": "A22" }
                    },
                    {
                        "type": "Feature",
                        "geometry": {
                            "type": "Polygon",
                            "coordinates": [[
                                [11.05, 45.55], [11.10, 45.55],
                                [11.10, 45.58], [11.05, 45.58], [11.05, 45.55]
                            ]]
                        },
                        "properties": { "natural": "water" }
                    }
                ]
            }"#,
        );
        assert!(svg.contains("stroke=\"#e8913e\""));
        assert!(svg.contains("fill=\"#b8d2dc\""));
    }

    #[test]
    fn unmatched_features_draw_nothing() {
        let svg = render(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": {
                            "type": "LineString",
                            "coordinates": [[11.02, 45.52], [11.18, 45.63]]
                        },
                        "properties": { "highway": "bridleway" }
                    }
                ]
            }"#,
        );
        // Just the background rect.
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn coastline_triggers_sea_fill_and_land_rings() {
        let svg = render(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": {
                            "type": "LineString",
                            "coordinates": [[10.9, 45.56], [11.1, 45.58], [11.3, 45.60]]
                        },
                        "properties": { "natural": "coastline" }
                    }
                ]
            }"#,
        );
        // Sea flood plus at least one synthesized land ring.
        assert!(svg.contains("fill=\"#b8d2dc\""));
        assert!(svg.contains("fill=\"#f6f2ea\" fill-rule=\"evenodd\""));
        assert!(svg.matches("<rect").count() >= 2);
    }
}
