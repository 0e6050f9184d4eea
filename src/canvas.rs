//! The drawable canvas: a lon/lat bbox mapped onto a fixed-size pixel
//! surface, SVG primitive emission, and ownership of the occupancy region
//! for one render pass.
//!
//! Geometry layers draw in lon/lat and are transformed here; the coastline
//! and annotation machinery work in canvas units directly.

use geo::{coord, Coord, Rect};

use crate::annotate::{self, Icon, TextStyle};
use crate::error::Error;
use crate::geom;
use crate::occupancy::{Occupancy, CONFLICT_MARGIN};
use crate::path_text;
use crate::projection::Projection;
use crate::text_metrics;

/// Stroke options shared by lines and polygon borders.
#[derive(Debug, Clone, Default)]
pub struct Stroke<'a> {
    pub color: &'a str,
    pub width: f64,
    pub dash: Option<&'a str>,
}

pub struct Canvas {
    pub width: f64,
    pub height: f64,
    bbox: (f64, f64, f64, f64),
    projection: Projection,
    /// Projected origin (top-left of the canvas) in metres.
    x0: f64,
    y0: f64,
    x_diff: f64,
    y_diff: f64,
    /// Average metres per pixel.
    pub scale: f64,
    occupancy: Occupancy,
    body: String,
}

impl Canvas {
    /// Builds a canvas for `(min_lon, min_lat, max_lon, max_lat)` whose
    /// larger dimension is `max_size` pixels.
    pub fn new(
        bbox: (f64, f64, f64, f64),
        max_size: u32,
        projection: Projection,
    ) -> Result<Self, Error> {
        let (min_lon, min_lat, max_lon, max_lat) = bbox;
        let (min_x, min_y) = projection.project(min_lon, min_lat);
        let (max_x, max_y) = projection.project(max_lon, max_lat);
        let x_diff = (max_x - min_x).abs();
        let y_diff = (max_y - min_y).abs();
        if x_diff <= 0.0 || y_diff <= 0.0 || max_size == 0 {
            return Err(Error::CanvasExtent(format!(
                "bbox {bbox:?} at size {max_size} projects to nothing"
            )));
        }
        // Canvas y grows downwards, so the origin is the top-left corner.
        let x0 = min_x.min(max_x);
        let y0 = min_y.max(max_y);

        let max_size = max_size as f64;
        let (width, height) = if x_diff > y_diff {
            (max_size, (max_size / x_diff * y_diff).ceil())
        } else {
            ((max_size / y_diff * x_diff).ceil(), max_size)
        };
        // Average metres per pixel of a unit diagonal, matching how the
        // stylesheet's zoom bands are calibrated.
        let scale = 0.5f64.sqrt() * (x_diff / width + y_diff / height) / 2.0;

        Ok(Self {
            width,
            height,
            bbox,
            projection,
            x0,
            y0,
            x_diff,
            y_diff,
            scale,
            occupancy: Occupancy::new(width, height),
            body: String::new(),
        })
    }

    /// The lon/lat extent this canvas covers.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        self.bbox
    }

    /// Transforms degrees to canvas units.
    pub fn transform(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (x, y) = self.projection.project(lon, lat);
        (
            (x - self.x0) * self.width / self.x_diff,
            (self.y0 - y) * self.height / self.y_diff,
        )
    }

    /// Transforms canvas units back to degrees.
    pub fn transform_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let mx = x * self.x_diff / self.width + self.x0;
        let my = self.y0 - y * self.y_diff / self.height;
        self.projection.inverse(mx, my)
    }

    pub fn transform_coords(&self, coords: &[[f64; 2]]) -> Vec<Coord<f64>> {
        coords
            .iter()
            .map(|c| {
                let (x, y) = self.transform(c[0], c[1]);
                coord! { x: x, y: y }
            })
            .collect()
    }

    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: 0.0, y: 0.0 },
            coord! { x: self.width, y: self.height },
        )
    }

    pub fn max_dim(&self) -> f64 {
        self.width.max(self.height)
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }

    pub fn occupancy_mut(&mut self) -> &mut Occupancy {
        &mut self.occupancy
    }

    pub fn draw_background(&mut self, color: &str) {
        self.body.push_str(&format!(
            "<rect width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"/>",
            self.width, self.height, color
        ));
    }

    /// Strokes a lon/lat polyline.
    pub fn draw_line(&mut self, coords: &[[f64; 2]], stroke: &Stroke) {
        if coords.len() < 2 || stroke.width <= 0.0 {
            return;
        }
        let points = self.transform_coords(coords);
        let d = path_data(&points, false);
        self.body.push_str(&format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{:.2}\" \
             stroke-linecap=\"round\" stroke-linejoin=\"round\"{}/>",
            d,
            stroke.color,
            stroke.width,
            dash_attr(stroke.dash)
        ));
    }

    /// Fills (and optionally strokes) a lon/lat polygon with holes.
    pub fn draw_polygon(
        &mut self,
        exterior: &[[f64; 2]],
        interiors: &[Vec<[f64; 2]>],
        fill: &str,
        border: Option<&Stroke>,
    ) {
        if exterior.len() < 3 {
            return;
        }
        let mut d = path_data(&self.transform_coords(exterior), true);
        for hole in interiors {
            if hole.len() >= 3 {
                d.push(' ');
                d.push_str(&path_data(&self.transform_coords(hole), true));
            }
        }
        self.fill_path(&d, fill, border);
    }

    /// Fills a ring already expressed in canvas units (closed coastline
    /// output).
    pub fn draw_ring_units(&mut self, ring: &[Coord<f64>], fill: &str) {
        if ring.len() < 3 {
            return;
        }
        let d = path_data(ring, true);
        self.fill_path(&d, fill, None);
    }

    fn fill_path(&mut self, d: &str, fill: &str, border: Option<&Stroke>) {
        let stroke_attrs = match border {
            Some(stroke) if stroke.width > 0.0 => format!(
                " stroke=\"{}\" stroke-width=\"{:.2}\" stroke-linejoin=\"round\"{}",
                stroke.color,
                stroke.width,
                dash_attr(stroke.dash)
            ),
            _ => String::new(),
        };
        self.body.push_str(&format!(
            "<path d=\"{}\" fill=\"{}\" fill-rule=\"evenodd\"{}/>",
            d, fill, stroke_attrs
        ));
    }

    /// Draws a filled circle marker at a lon/lat position.
    pub fn draw_circle(&mut self, lonlat: [f64; 2], radius: f64, fill: &str, border: Option<&Stroke>) {
        if radius <= 0.0 {
            return;
        }
        let (x, y) = self.transform(lonlat[0], lonlat[1]);
        let stroke_attrs = match border {
            Some(stroke) if stroke.width > 0.0 => format!(
                " stroke=\"{}\" stroke-width=\"{:.2}\"",
                stroke.color, stroke.width
            ),
            _ => String::new(),
        };
        self.body.push_str(&format!(
            "<circle cx=\"{x:.2}\" cy=\"{y:.2}\" r=\"{radius:.2}\" fill=\"{fill}\"{stroke_attrs}/>"
        ));
    }

    /// Places and draws a point label (text, optionally with an icon to its
    /// left). Failure to place drops the label silently.
    pub fn draw_text(&mut self, lonlat: [f64; 2], text: &str, style: &TextStyle, icon: Option<&Icon>) {
        let text = match style.transform {
            Some(transform) => transform.apply(text),
            None => text.to_string(),
        };
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let (x, y) = self.transform(lonlat[0], lonlat[1]);
        let anchor = coord! { x: x, y: y };

        let Some(width) = text_metrics::measure_text_width(text, style.font_size, &style.font_family)
        else {
            log::debug!("no font for family `{}`; label dropped", style.font_family);
            return;
        };
        let Some(metrics) = text_metrics::font_metrics(style.font_size, &style.font_family) else {
            return;
        };
        let height = metrics.line_height();

        let candidate = match icon {
            Some(icon) => annotate::icon_text_candidate(anchor, icon, width, height),
            None => annotate::text_candidate(anchor, width, height),
        };
        let Some((px, py)) = annotate::layout_point_label(&self.occupancy, &candidate, self.max_dim())
        else {
            return;
        };

        if let Some(icon) = icon {
            let icon_y = py + (candidate.height - icon.size) / 2.0;
            self.push_image(px, icon_y, icon.size, &icon.href);
            let text_x = px + icon.size + icon.margin;
            let baseline = py + candidate.height / 2.0 + metrics.ascent / 2.0 - metrics.descent / 2.0;
            self.push_text(text_x, baseline, "start", text, style);
        } else {
            let center_x = px + candidate.width / 2.0;
            let baseline = py + candidate.height / 2.0 + metrics.ascent / 2.0 - metrics.descent / 2.0;
            self.push_text(center_x, baseline, "middle", text, style);
        }

        let placed = geom::rect_polygon(px, py, px + candidate.width, py + candidate.height);
        self.occupancy.union(&placed, CONFLICT_MARGIN);
    }

    /// Lays text along a lon/lat path and draws the glyph outlines. Dropped
    /// silently when no acceptable segment exists.
    pub fn draw_text_on_line(&mut self, coords: &[[f64; 2]], text: &str, style: &TextStyle) {
        let text = match style.transform {
            Some(transform) => transform.apply(text),
            None => text.to_string(),
        };
        let text = text.trim();
        if text.is_empty() || coords.len() < 2 {
            return;
        }
        let points = self.transform_coords(coords);
        let Some(layout) = path_text::layout_path_label(
            &self.occupancy,
            self.width,
            self.height,
            &points,
            text,
            style.font_size,
            &style.font_family,
        ) else {
            return;
        };

        let mut d = String::new();
        for glyph in &layout.glyphs {
            for contour in &glyph.contours {
                if contour.len() < 2 {
                    continue;
                }
                if !d.is_empty() {
                    d.push(' ');
                }
                d.push_str(&path_data(contour, true));
            }
        }
        if d.is_empty() {
            return;
        }
        if style.halo_width > 0.0 {
            self.body.push_str(&format!(
                "<path d=\"{}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{:.2}\" \
                 stroke-linecap=\"round\" stroke-linejoin=\"round\"/>",
                d,
                style.halo_color,
                2.0 * style.halo_width
            ));
        }
        self.body.push_str(&format!(
            "<path d=\"{}\" fill=\"{}\" fill-rule=\"evenodd\"/>",
            d, style.color
        ));

        self.occupancy
            .union_polyline(&layout.baseline, layout.band_height + CONFLICT_MARGIN);
    }

    /// Places and draws a standalone icon.
    pub fn draw_icon(&mut self, lonlat: [f64; 2], icon: &Icon) {
        let (x, y) = self.transform(lonlat[0], lonlat[1]);
        let anchor = coord! { x: x, y: y };
        let candidate = annotate::icon_candidate(anchor, icon);
        let Some((px, py)) = annotate::layout_point_label(&self.occupancy, &candidate, self.max_dim())
        else {
            return;
        };
        // The search footprint is padded; the drawn icon is the exact size.
        let ix = px + (candidate.width - icon.size) / 2.0;
        let iy = py + (candidate.height - icon.size) / 2.0;
        self.push_image(ix, iy, icon.size, &icon.href);
        self.occupancy
            .union(&geom::rect_polygon(ix, iy, ix + icon.size, iy + icon.size), 0.0);
    }

    fn push_image(&mut self, x: f64, y: f64, size: f64, href: &str) {
        self.body.push_str(&format!(
            "<image x=\"{x:.2}\" y=\"{y:.2}\" width=\"{size:.2}\" height=\"{size:.2}\" href=\"{}\"/>",
            escape_xml(href)
        ));
    }

    fn push_text(&mut self, x: f64, baseline: f64, anchor: &str, text: &str, style: &TextStyle) {
        let halo = if style.halo_width > 0.0 {
            format!(
                " paint-order=\"stroke\" stroke=\"{}\" stroke-width=\"{:.2}\" stroke-linejoin=\"round\"",
                style.halo_color,
                2.0 * style.halo_width
            )
        } else {
            String::new()
        };
        // Integer positions keep the glyph rasterization crisp.
        self.body.push_str(&format!(
            "<text x=\"{:.0}\" y=\"{:.0}\" text-anchor=\"{}\" font-family=\"{}\" \
             font-size=\"{:.1}\" fill=\"{}\"{}>{}</text>",
            x,
            baseline,
            anchor,
            escape_xml(&style.font_family),
            style.font_size,
            style.color,
            halo,
            escape_xml(text)
        ));
    }

    pub fn to_svg(&self) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w:.0}\" height=\"{h:.0}\" \
             viewBox=\"0 0 {w:.0} {h:.0}\">{body}</svg>",
            w = self.width,
            h = self.height,
            body = self.body
        )
    }

    pub fn write_svg(&self, path: &std::path::Path) -> Result<(), Error> {
        std::fs::write(path, self.to_svg()).map_err(|e| Error::io(path, e))
    }

    #[cfg(feature = "png")]
    pub fn write_png(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let svg = self.to_svg();
        let opt = usvg::Options::default();
        let tree = usvg::Tree::from_str(&svg, &opt)?;
        let size = tree.size().to_int_size();
        let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
            .ok_or_else(|| anyhow::anyhow!("failed to allocate pixmap"))?;
        let mut pixmap_mut = pixmap.as_mut();
        resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
        pixmap.save_png(path)?;
        Ok(())
    }
}

fn path_data(points: &[Coord<f64>], close: bool) -> String {
    if points.is_empty() {
        return String::new();
    }
    let mut d = format!("M {:.2} {:.2}", points[0].x, points[0].y);
    for point in points.iter().skip(1) {
        d.push_str(&format!(" L {:.2} {:.2}", point.x, point.y));
    }
    if close {
        d.push_str(" Z");
    }
    d
}

fn dash_attr(dash: Option<&str>) -> String {
    match dash {
        Some(dash) if !dash.is_empty() => format!(" stroke-dasharray=\"{dash}\""),
        None | Some(_) => String::new(),
    }
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
