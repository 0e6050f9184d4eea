//! Feature input. The renderer only needs "give me the features of one
//! geometry kind intersecting this bbox"; [`FeatureSource`] is that seam,
//! and [`GeoJsonSource`] is the file-backed implementation.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::GeomKind;
use crate::error::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2],
    },
    LineString {
        coordinates: Vec<[f64; 2]>,
    },
    Polygon {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiLineString {
        coordinates: Vec<Vec<[f64; 2]>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<[f64; 2]>>>,
    },
}

impl Geometry {
    pub fn kind(&self) -> GeomKind {
        match self {
            Geometry::Point { .. } => GeomKind::Point,
            Geometry::LineString { .. } | Geometry::MultiLineString { .. } => GeomKind::Line,
            Geometry::Polygon { .. } | Geometry::MultiPolygon { .. } => GeomKind::Polygon,
        }
    }

    fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut bounds = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut grow = |c: &[f64; 2]| {
            bounds.0 = bounds.0.min(c[0]);
            bounds.1 = bounds.1.min(c[1]);
            bounds.2 = bounds.2.max(c[0]);
            bounds.3 = bounds.3.max(c[1]);
        };
        match self {
            Geometry::Point { coordinates } => grow(coordinates),
            Geometry::LineString { coordinates } => coordinates.iter().for_each(&mut grow),
            Geometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().for_each(&mut grow)
            }
            Geometry::Polygon { coordinates } => coordinates.iter().flatten().for_each(&mut grow),
            Geometry::MultiPolygon { coordinates } => coordinates
                .iter()
                .flatten()
                .flatten()
                .for_each(&mut grow),
        }
        bounds
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Feature {
    /// Scalar properties as strings, the form the stylesheet matches on.
    pub fn tags(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key.clone(), v)))
            .collect()
    }

    pub fn tag(&self, key: &str) -> Option<String> {
        self.properties.get(key).and_then(scalar_to_string)
    }
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(if *b { "yes" } else { "no" }.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

/// Anything that can hand the renderer pre-filtered features.
pub trait FeatureSource {
    /// Features of `kind` whose bounds intersect `(min_lon, min_lat,
    /// max_lon, max_lat)`.
    fn features(&self, kind: GeomKind, bbox: (f64, f64, f64, f64)) -> Vec<&Feature>;
}

pub struct GeoJsonSource {
    collection: FeatureCollection,
}

impl GeoJsonSource {
    pub fn from_str(doc: &str) -> Result<Self, Error> {
        let collection: FeatureCollection = serde_json::from_str(doc)?;
        Ok(Self { collection })
    }

    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let doc = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_str(&doc)
    }

    pub fn len(&self) -> usize {
        self.collection.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collection.features.is_empty()
    }
}

impl FeatureSource for GeoJsonSource {
    fn features(&self, kind: GeomKind, bbox: (f64, f64, f64, f64)) -> Vec<&Feature> {
        self.collection
            .features
            .iter()
            .filter(|f| f.geometry.kind() == kind)
            .filter(|f| {
                let (min_x, min_y, max_x, max_y) = f.geometry.bounds();
                min_x <= bbox.2 && max_x >= bbox.0 && min_y <= bbox.3 && max_y >= bbox.1
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [11.1, 45.6] },
                "properties": { "place": "town", "name": "Ala", "population": 8900 }
            },
            {
                "type": "Feature",
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[11.0, 45.5], [11.2, 45.7]]
                },
                "properties": { "highway": "primary", "name": "Via Roma" }
            }
        ]
    }"#;

    #[test]
    fn parses_and_filters_by_kind_and_bbox() {
        let source = GeoJsonSource::from_str(DOC).unwrap();
        assert_eq!(source.len(), 2);
        let bbox = (11.0, 45.5, 11.25, 45.75);
        assert_eq!(source.features(GeomKind::Point, bbox).len(), 1);
        assert_eq!(source.features(GeomKind::Line, bbox).len(), 1);
        assert_eq!(source.features(GeomKind::Polygon, bbox).len(), 0);

        let far = (20.0, 50.0, 21.0, 51.0);
        assert_eq!(source.features(GeomKind::Point, far).len(), 0);
    }

    #[test]
    fn tags_stringify_scalars() {
        let source = GeoJsonSource::from_str(DOC).unwrap();
        let town = &source.features(GeomKind::Point, (11.0, 45.5, 11.25, 45.75))[0];
        let tags = town.tags();
        assert_eq!(tags.get("place").map(String::as_str), Some("town"));
        assert_eq!(tags.get("population").map(String::as_str), Some("8900"));
        assert_eq!(town.tag("name").as_deref(), Some("Ala"));
    }
}
