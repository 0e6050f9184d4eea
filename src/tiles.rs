//! Tile-pyramid driver: slippy z/x/y tile math and a fixed-size worker pool
//! that renders independent tiles from a shared job queue.
//!
//! Workers share nothing mutable but the queue and a coarse stop flag
//! checked between jobs; each tile gets its own canvas and occupancy
//! region. One failed tile is logged and skipped, never fatal.

use std::collections::VecDeque;
use std::f64::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use crate::canvas::Canvas;
use crate::config::StyleSheet;
use crate::error::Error;
use crate::projection::Projection;
use crate::render::Renderer;
use crate::source::FeatureSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileJob {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TileFormat {
    #[cfg_attr(not(feature = "png"), default)]
    Svg,
    #[cfg(feature = "png")]
    #[cfg_attr(feature = "png", default)]
    Png,
}

impl TileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Svg => "svg",
            #[cfg(feature = "png")]
            TileFormat::Png => "png",
        }
    }
}

/// Lon/lat bounds of a slippy tile.
pub fn tile_bbox(zoom: u8, x: u32, y: u32) -> (f64, f64, f64, f64) {
    let n = (1u32 << zoom) as f64;
    let min_lon = x as f64 / n * 360.0 - 180.0;
    let max_lon = (x + 1) as f64 / n * 360.0 - 180.0;
    let max_lat = tile_y_to_lat(y as f64, n);
    let min_lat = tile_y_to_lat((y + 1) as f64, n);
    (min_lon, min_lat, max_lon, max_lat)
}

fn tile_y_to_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

fn lonlat_to_tile(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let n = (1u32 << zoom) as f64;
    let x = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n;
    (x, y)
}

/// Tile indexes covering a lon/lat bbox at `zoom`, clamped to the tile grid.
pub fn tile_range(bbox: (f64, f64, f64, f64), zoom: u8) -> (u32, u32, u32, u32) {
    let max_index = (1u32 << zoom) - 1;
    let (x0, y1) = lonlat_to_tile(bbox.0, bbox.1, zoom);
    let (x1, y0) = lonlat_to_tile(bbox.2, bbox.3, zoom);
    let clamp = |v: f64| (v.floor().max(0.0) as u32).min(max_index);
    (clamp(x0), clamp(x1), clamp(y0), clamp(y1))
}

/// Jobs for every tile touching `bbox` across the zoom range.
pub fn pyramid_jobs(bbox: (f64, f64, f64, f64), min_zoom: u8, max_zoom: u8) -> Vec<TileJob> {
    let mut jobs = Vec::new();
    for zoom in min_zoom..=max_zoom {
        let (x0, x1, y0, y1) = tile_range(bbox, zoom);
        for x in x0..=x1 {
            for y in y0..=y1 {
                jobs.push(TileJob { zoom, x, y });
            }
        }
    }
    jobs
}

/// Renders `jobs` into `out_dir/{zoom}/{x}/{y}.{ext}` using `workers`
/// threads. Returns the number of tiles written; tiles that fail are
/// logged and skipped. The stop flag is honoured between jobs only.
pub fn render_pyramid(
    source: &(dyn FeatureSource + Sync),
    sheet: &StyleSheet,
    jobs: Vec<TileJob>,
    out_dir: &Path,
    tile_size: u32,
    format: TileFormat,
    workers: usize,
    stop: &AtomicBool,
) -> Result<usize, Error> {
    let queue = Mutex::new(VecDeque::from(jobs));
    let rendered = AtomicUsize::new(0);
    let workers = workers.max(1);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if stop.load(Ordering::Relaxed) {
                    break;
                }
                let job = match queue.lock() {
                    Ok(mut queue) => queue.pop_front(),
                    Err(_) => break,
                };
                let Some(job) = job else { break };
                match render_tile(source, sheet, job, out_dir, tile_size, format) {
                    Ok(()) => {
                        rendered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        log::warn!(
                            "tile {}/{}/{} failed: {err}; continuing",
                            job.zoom,
                            job.x,
                            job.y
                        );
                    }
                }
            });
        }
    });

    Ok(rendered.into_inner())
}

fn render_tile(
    source: &dyn FeatureSource,
    sheet: &StyleSheet,
    job: TileJob,
    out_dir: &Path,
    tile_size: u32,
    format: TileFormat,
) -> Result<(), Error> {
    let bbox = tile_bbox(job.zoom, job.x, job.y);
    let mut canvas = Canvas::new(bbox, tile_size, Projection::Mercator)?;
    Renderer::new(&mut canvas, sheet, source).run()?;

    let dir = out_dir.join(job.zoom.to_string()).join(job.x.to_string());
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    let path = dir.join(format!("{}.{}", job.y, format.extension()));
    match format {
        TileFormat::Svg => canvas.write_svg(&path)?,
        #[cfg(feature = "png")]
        TileFormat::Png => canvas
            .write_png(&path)
            .map_err(|e| Error::io(&path, std::io::Error::other(e)))?,
    }
    log::trace!("wrote {}", path.display());
    Ok(())
}
