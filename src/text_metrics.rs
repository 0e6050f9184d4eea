//! Text measurement and glyph outline extraction.
//!
//! Labels need two things from a font: advance widths (to size footprints
//! and pick path segments) and flattened glyph outlines (to lay characters
//! along a curve). Both come from the system font database; faces are
//! cached per family.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use geo::{coord, Coord};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::{Face, GlyphId, OutlineBuilder};

/// Base spacing between consecutive glyphs on a path, canvas units.
pub const GLYPH_SPACING: f64 = 0.7;
/// Extra leading spacing contributed by each space character.
pub const SPACE_WIDTH: f64 = 3.0;

static TEXT_SHAPER: Lazy<Mutex<TextShaper>> = Lazy::new(|| Mutex::new(TextShaper::new()));

/// One character prepared for path placement: outline contours in a local
/// frame with the pen position at the origin, the advance width, and the
/// spacing to apply before this glyph.
#[derive(Debug, Clone)]
pub struct GlyphRecord {
    pub contours: Vec<Vec<Coord<f64>>>,
    pub advance: f64,
    pub spacing: f64,
}

/// Scaled vertical metrics of a face.
#[derive(Debug, Clone, Copy)]
pub struct FontMetrics {
    pub ascent: f64,
    pub descent: f64,
}

impl FontMetrics {
    /// Vertical shift that centres a glyph run on its carrier path.
    pub fn baseline_offset(&self) -> f64 {
        self.ascent / 2.0 - self.descent
    }

    pub fn line_height(&self) -> f64 {
        self.ascent + self.descent
    }
}

pub fn measure_text_width(text: &str, font_size: f64, font_family: &str) -> Option<f64> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut guard = TEXT_SHAPER.lock().ok()?;
    guard.with_face(font_family, |face| face.measure_width(text, font_size))
}

pub fn font_metrics(font_size: f64, font_family: &str) -> Option<FontMetrics> {
    if font_size <= 0.0 {
        return None;
    }
    let mut guard = TEXT_SHAPER.lock().ok()?;
    guard.with_face(font_family, |face| Some(face.metrics(font_size)))
}

/// Builds the glyph records for `text`. Space characters emit no record;
/// each one widens the next glyph's leading spacing instead.
pub fn glyph_sequence(text: &str, font_size: f64, font_family: &str) -> Option<Vec<GlyphRecord>> {
    if font_size <= 0.0 {
        return None;
    }
    let mut guard = TEXT_SHAPER.lock().ok()?;
    guard.with_face(font_family, |face| Some(face.glyphs(text, font_size)))
}

struct TextShaper {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<LoadedFace>>,
}

impl TextShaper {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    fn with_face<R>(
        &mut self,
        font_family: &str,
        f: impl FnOnce(&mut LoadedFace) -> Option<R>,
    ) -> Option<R> {
        let key = normalize_family_key(font_family);
        if !self.cache.contains_key(&key) {
            let face = self.load_face(font_family);
            self.cache.insert(key.clone(), face);
        }
        let face = self.cache.get_mut(&key).and_then(|face| face.as_mut())?;
        f(face)
    }

    fn load_face(&mut self, font_family: &str) -> Option<LoadedFace> {
        let mut names: Vec<String> = Vec::new();
        let mut tokens: Vec<Option<Family<'static>>> = Vec::new();
        for part in font_family.split(',') {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => tokens.push(Some(Family::Serif)),
                "sans-serif" | "system-ui" => tokens.push(Some(Family::SansSerif)),
                "monospace" => tokens.push(Some(Family::Monospace)),
                "cursive" => tokens.push(Some(Family::Cursive)),
                "fantasy" => tokens.push(Some(Family::Fantasy)),
                _ => {
                    names.push(raw.to_string());
                    tokens.push(None);
                }
            }
        }
        let mut name_iter = names.iter();
        let mut families: Vec<Family<'_>> = tokens
            .into_iter()
            .map(|token| match token {
                Some(family) => family,
                None => Family::Name(name_iter.next().expect("name token")),
            })
            .collect();
        if families.is_empty() {
            families.push(Family::SansSerif);
        }

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        let mut loaded: Option<LoadedFace> = None;
        self.db.with_face_data(id, |data, index| {
            loaded = LoadedFace::new(data.to_vec(), index);
        });
        loaded
    }
}

struct LoadedFace {
    _data: Vec<u8>,
    units_per_em: u16,
    face: Face<'static>,
    advance_cache: HashMap<char, Option<(GlyphId, u16)>>,
}

impl LoadedFace {
    fn new(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        // The face borrows `data`, which lives (and moves) with this struct
        // and is never mutated.
        let face = unsafe { std::mem::transmute::<Face<'_>, Face<'static>>(face) };
        Some(Self {
            _data: data,
            units_per_em,
            face,
            advance_cache: HashMap::new(),
        })
    }

    fn scale(&self, font_size: f64) -> f64 {
        font_size / self.units_per_em as f64
    }

    fn glyph(&mut self, ch: char) -> Option<(GlyphId, u16)> {
        if let Some(cached) = self.advance_cache.get(&ch) {
            return *cached;
        }
        let entry = self.face.glyph_index(ch).map(|id| {
            let advance = self.face.glyph_hor_advance(id).unwrap_or(0);
            (id, advance)
        });
        self.advance_cache.insert(ch, entry);
        entry
    }

    fn measure_width(&mut self, text: &str, font_size: f64) -> Option<f64> {
        let scale = self.scale(font_size);
        let fallback = font_size * 0.56;
        let mut width = 0.0;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            match self.glyph(ch) {
                Some((_, advance)) if advance > 0 => width += advance as f64 * scale,
                _ => width += fallback,
            }
        }
        Some(width.max(0.0))
    }

    fn metrics(&self, font_size: f64) -> FontMetrics {
        let scale = self.scale(font_size);
        FontMetrics {
            ascent: self.face.ascender() as f64 * scale,
            descent: -(self.face.descender() as f64) * scale,
        }
    }

    fn glyphs(&mut self, text: &str, font_size: f64) -> Vec<GlyphRecord> {
        let scale = self.scale(font_size);
        let mut records = Vec::new();
        let mut cur_spacing = GLYPH_SPACING;
        for ch in text.chars() {
            if ch == ' ' {
                cur_spacing += SPACE_WIDTH;
                continue;
            }
            let Some((id, advance)) = self.glyph(ch) else {
                continue;
            };
            let mut sink = OutlineSink::new(scale);
            self.face.outline_glyph(id, &mut sink);
            records.push(GlyphRecord {
                contours: sink.finish(),
                advance: advance as f64 * scale,
                spacing: cur_spacing,
            });
            cur_spacing = GLYPH_SPACING;
        }
        records
    }
}

/// Flattens glyph curves into polyline contours. Font coordinates are y-up;
/// the canvas is y-down, so y is negated while scaling.
struct OutlineSink {
    scale: f64,
    contours: Vec<Vec<Coord<f64>>>,
    current: Vec<Coord<f64>>,
    last: (f32, f32),
}

const QUAD_STEPS: u32 = 6;
const CUBIC_STEPS: u32 = 8;

impl OutlineSink {
    fn new(scale: f64) -> Self {
        Self {
            scale,
            contours: Vec::new(),
            current: Vec::new(),
            last: (0.0, 0.0),
        }
    }

    fn push(&mut self, x: f32, y: f32) {
        self.current.push(coord! {
            x: x as f64 * self.scale,
            y: -(y as f64) * self.scale,
        });
        self.last = (x, y);
    }

    fn finish(mut self) -> Vec<Vec<Coord<f64>>> {
        if self.current.len() > 1 {
            self.contours.push(std::mem::take(&mut self.current));
        }
        self.contours
    }
}

impl OutlineBuilder for OutlineSink {
    fn move_to(&mut self, x: f32, y: f32) {
        if self.current.len() > 1 {
            let done = std::mem::take(&mut self.current);
            self.contours.push(done);
        } else {
            self.current.clear();
        }
        self.push(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.push(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x0, y0) = self.last;
        for i in 1..=QUAD_STEPS {
            let t = i as f32 / QUAD_STEPS as f32;
            let mt = 1.0 - t;
            let px = mt * mt * x0 + 2.0 * mt * t * x1 + t * t * x;
            let py = mt * mt * y0 + 2.0 * mt * t * y1 + t * t * y;
            self.push(px, py);
        }
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x0, y0) = self.last;
        for i in 1..=CUBIC_STEPS {
            let t = i as f32 / CUBIC_STEPS as f32;
            let mt = 1.0 - t;
            let px =
                mt * mt * mt * x0 + 3.0 * mt * mt * t * x1 + 3.0 * mt * t * t * x2 + t * t * t * x;
            let py =
                mt * mt * mt * y0 + 3.0 * mt * mt * t * y1 + 3.0 * mt * t * t * y2 + t * t * t * y;
            self.push(px, py);
        }
    }

    fn close(&mut self) {
        if self.current.len() > 1 {
            let first = self.current[0];
            self.current.push(first);
            let done = std::mem::take(&mut self.current);
            self.contours.push(done);
        } else {
            self.current.clear();
        }
    }
}

fn normalize_family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These run only when the host has any usable font; the shaping layer
    // returns None otherwise and the renderer drops the label.

    #[test]
    fn empty_text_is_zero_width() {
        assert_eq!(measure_text_width("", 12.0, "sans-serif"), Some(0.0));
    }

    #[test]
    fn wider_text_measures_wider() {
        let Some(short) = measure_text_width("il", 12.0, "sans-serif") else {
            return;
        };
        let long = measure_text_width("Hauptbahnhof", 12.0, "sans-serif").unwrap();
        assert!(long > short);
    }

    #[test]
    fn spaces_accumulate_leading_spacing() {
        let Some(glyphs) = glyph_sequence("a  b", 12.0, "sans-serif") else {
            return;
        };
        assert_eq!(glyphs.len(), 2);
        assert_eq!(glyphs[0].spacing, GLYPH_SPACING);
        assert_eq!(glyphs[1].spacing, GLYPH_SPACING + 2.0 * SPACE_WIDTH);
    }

    #[test]
    fn glyph_outlines_sit_on_the_baseline() {
        let Some(glyphs) = glyph_sequence("H", 12.0, "sans-serif") else {
            return;
        };
        let glyph = &glyphs[0];
        assert!(glyph.advance > 0.0);
        assert!(!glyph.contours.is_empty());
        // y-down local frame: ink above the baseline has negative y.
        let min_y = glyph
            .contours
            .iter()
            .flatten()
            .map(|c| c.y)
            .fold(f64::INFINITY, f64::min);
        assert!(min_y < 0.0);
    }
}
