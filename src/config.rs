//! YAML stylesheet: which features are drawn at which zoom level, and how.
//!
//! A stylesheet is a list of rules per geometry kind. Each rule matches
//! feature tags, applies to a set of zoom levels, and contributes style
//! attributes; later matching rules override earlier ones attribute by
//! attribute. Zoom levels are bands of map scale (metres per pixel).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;

/// Built-in stylesheet used when none is given on the command line.
pub const DEFAULT_STYLESHEET: &str = include_str!("../styles/default.yml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeomKind {
    Point,
    Line,
    Polygon,
}

impl GeomKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeomKind::Point => "point",
            GeomKind::Line => "line",
            GeomKind::Polygon => "polygon",
        }
    }
}

/// Flat bundle of optional style attributes. Unset attributes fall through
/// to the next rule in the cascade or to renderer defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StyleAttrs {
    pub color: Option<String>,
    pub width: Option<f64>,
    pub border_color: Option<String>,
    pub border_width: Option<f64>,
    pub outline_color: Option<String>,
    pub outline_width: Option<f64>,
    pub line_dash: Option<String>,
    pub background_color: Option<String>,
    pub circle_radius: Option<f64>,
    pub circle_color: Option<String>,
    /// Name of the feature property holding the label text.
    pub text: Option<String>,
    pub text_color: Option<String>,
    pub text_halo_color: Option<String>,
    pub text_halo_width: Option<f64>,
    pub text_transform: Option<String>,
    pub font_size: Option<f64>,
    pub font_family: Option<String>,
    pub icon: Option<String>,
    pub icon_size: Option<f64>,
    pub icon_margin: Option<f64>,
    pub z_index: Option<i32>,
}

macro_rules! take_if_set {
    ($self:ident, $other:ident, $($field:ident),+ $(,)?) => {
        $(
            if $other.$field.is_some() {
                $self.$field = $other.$field.clone();
            }
        )+
    };
}

impl StyleAttrs {
    /// Overlays `other` on top of `self`, attribute by attribute.
    pub fn merge_from(&mut self, other: &StyleAttrs) {
        take_if_set!(
            self,
            other,
            color,
            width,
            border_color,
            border_width,
            outline_color,
            outline_width,
            line_dash,
            background_color,
            circle_radius,
            circle_color,
            text,
            text_color,
            text_halo_color,
            text_halo_width,
            text_transform,
            font_size,
            font_family,
            icon,
            icon_size,
            icon_margin,
            z_index,
        );
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ZoomLevel {
    pub level: u8,
    /// `[min, max)` scale band in metres per pixel.
    pub scales: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Rule {
    /// Feature tags this rule requires; every listed tag must match.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Zoom level selector: `all`, `4`, `2-5`, or a comma list of those.
    #[serde(default = "all_levels")]
    pub levels: String,
    pub style: StyleAttrs,
}

fn all_levels() -> String {
    "all".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuleSet {
    pub point: Vec<Rule>,
    pub line: Vec<Rule>,
    pub polygon: Vec<Rule>,
}

impl RuleSet {
    fn for_kind(&self, kind: GeomKind) -> &[Rule] {
        match kind {
            GeomKind::Point => &self.point,
            GeomKind::Line => &self.line,
            GeomKind::Polygon => &self.polygon,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StyleSheet {
    pub zoom_levels: Vec<ZoomLevel>,
    pub map_background: String,
    pub sea_color: String,
    #[serde(default)]
    pub rules: RuleSet,
}

impl StyleSheet {
    pub fn from_str(doc: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(doc)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let doc = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_str(&doc)
    }

    pub fn default_sheet() -> Self {
        Self::from_str(DEFAULT_STYLESHEET).expect("built-in stylesheet parses")
    }

    /// Zoom level whose scale band contains `scale`.
    pub fn level_for(&self, scale: f64) -> Option<u8> {
        self.zoom_levels
            .iter()
            .find(|zl| zl.scales[0] <= scale && scale < zl.scales[1])
            .map(|zl| zl.level)
    }

    /// Resolves the style for a feature, or `None` when no rule matches
    /// (the feature is simply not drawn at this scale).
    pub fn resolve(
        &self,
        scale: f64,
        kind: GeomKind,
        tags: &BTreeMap<String, String>,
    ) -> Option<StyleAttrs> {
        let level = self.level_for(scale)?;
        let mut merged: Option<StyleAttrs> = None;
        for rule in self.rules.for_kind(kind) {
            if !level_selector_matches(&rule.levels, level) {
                continue;
            }
            if !rule
                .tags
                .iter()
                .all(|(key, value)| tags.get(key).map(String::as_str) == Some(value.as_str()))
            {
                continue;
            }
            match merged.as_mut() {
                Some(attrs) => attrs.merge_from(&rule.style),
                None => merged = Some(rule.style.clone()),
            }
        }
        merged
    }
}

fn level_selector_matches(selector: &str, level: u8) -> bool {
    for part in selector.split(',') {
        let part = part.trim();
        if part.eq_ignore_ascii_case("all") {
            return true;
        }
        if let Some((lo, hi)) = part.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u8>(), hi.trim().parse::<u8>()) {
                if lo <= level && level <= hi {
                    return true;
                }
            }
        } else if part.parse::<u8>() == Ok(level) {
            return true;
        }
    }
    false
}
