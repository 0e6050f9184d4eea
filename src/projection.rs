//! Map projections as pure `(lon, lat) <-> (x, y)` function pairs.
//!
//! All projections work in metres on the WGS84 sphere (radius 6378137) so the
//! canvas can derive a metres-per-pixel scale from any of them. They are
//! interchangeable: the renderer never depends on which one is active.

use std::f64::consts::PI;

const EARTH_RADIUS: f64 = 6_378_137.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Spherical (web) Mercator, EPSG:3857.
    #[default]
    Mercator,
    /// Equirectangular, ESRI:53001.
    PlateCarree,
}

impl Projection {
    /// Projects degrees to metres.
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Projection::Mercator => {
                let x = EARTH_RADIUS * lon.to_radians();
                let y = EARTH_RADIUS * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
                (x, y)
            }
            Projection::PlateCarree => (
                EARTH_RADIUS * lon.to_radians(),
                EARTH_RADIUS * lat.to_radians(),
            ),
        }
    }

    /// Inverse of [`Projection::project`].
    pub fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Projection::Mercator => {
                let lon = (x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
                (lon, lat)
            }
            Projection::PlateCarree => (
                (x / EARTH_RADIUS).to_degrees(),
                (y / EARTH_RADIUS).to_degrees(),
            ),
        }
    }
}
