use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::Parser;

use crate::canvas::Canvas;
use crate::config::StyleSheet;
use crate::projection::Projection;
use crate::render::Renderer;
use crate::source::GeoJsonSource;
use crate::tiles::{self, TileFormat};

#[derive(Parser, Debug)]
#[command(name = "inkmap", version, about = "Vector map renderer")]
pub struct Args {
    /// GeoJSON feature collection to render
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// Map extent as min_lon,min_lat,max_lon,max_lat
    #[arg(short = 'b', long = "bbox")]
    pub bbox: String,

    /// Output image path (.svg or .png), or a directory in tile mode
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// YAML stylesheet; the built-in one is used if omitted
    #[arg(short = 's', long = "style")]
    pub style: Option<PathBuf>,

    /// Larger canvas dimension in pixels (single-image mode)
    #[arg(long, default_value_t = 800)]
    pub size: u32,

    /// Zoom level or range (e.g. 10 or 8-12); enables tile-pyramid mode
    #[arg(short = 'z', long = "zoom")]
    pub zoom: Option<String>,

    /// Worker threads in tile-pyramid mode
    #[arg(short = 'w', long = "workers", default_value_t = 4)]
    pub workers: usize,

    /// Tile edge length in pixels
    #[arg(long, default_value_t = 256)]
    pub tile_size: u32,
}

pub fn run() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bbox = parse_bbox(&args.bbox)?;
    let sheet = match &args.style {
        Some(path) => StyleSheet::from_path(path)?,
        None => StyleSheet::default_sheet(),
    };
    let source = GeoJsonSource::from_path(&args.input)?;
    log::info!("loaded {} features", source.len());

    match &args.zoom {
        Some(zoom) => {
            let (min_zoom, max_zoom) = parse_zoom(zoom)?;
            let jobs = tiles::pyramid_jobs(bbox, min_zoom, max_zoom);
            log::info!(
                "rendering {} tiles at zoom {min_zoom}-{max_zoom} with {} workers",
                jobs.len(),
                args.workers
            );
            let stop = AtomicBool::new(false);
            let rendered = tiles::render_pyramid(
                &source,
                &sheet,
                jobs,
                &args.output,
                args.tile_size,
                TileFormat::default(),
                args.workers,
                &stop,
            )?;
            println!("{rendered} tiles written to {}", args.output.display());
        }
        None => {
            let mut canvas = Canvas::new(bbox, args.size, Projection::Mercator)?;
            Renderer::new(&mut canvas, &sheet, &source).run()?;
            write_single(&canvas, &args.output)?;
            println!("map written to {}", args.output.display());
        }
    }
    Ok(())
}

fn write_single(canvas: &Canvas, output: &std::path::Path) -> Result<()> {
    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("svg") => canvas.write_svg(output)?,
        #[cfg(feature = "png")]
        Some("png") | None => canvas.write_png(output)?,
        other => anyhow::bail!("unsupported output format: {:?}", other),
    }
    Ok(())
}

fn parse_bbox(raw: &str) -> Result<(f64, f64, f64, f64)> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .with_context(|| format!("invalid bbox `{raw}`"))?;
    if parts.len() != 4 {
        anyhow::bail!("bbox needs 4 comma-separated numbers, got {}", parts.len());
    }
    if parts[0] >= parts[2] || parts[1] >= parts[3] {
        anyhow::bail!("bbox `{raw}` is empty");
    }
    Ok((parts[0], parts[1], parts[2], parts[3]))
}

fn parse_zoom(raw: &str) -> Result<(u8, u8)> {
    let (lo, hi) = match raw.split_once('-') {
        Some((lo, hi)) => (lo.trim().parse()?, hi.trim().parse()?),
        None => {
            let z = raw.trim().parse()?;
            (z, z)
        }
    };
    if lo > hi {
        anyhow::bail!("zoom range `{raw}` is reversed");
    }
    Ok((lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_parsing() {
        assert_eq!(
            parse_bbox("11.0, 45.5, 11.2, 45.7").unwrap(),
            (11.0, 45.5, 11.2, 45.7)
        );
        assert!(parse_bbox("11.0,45.5,11.2").is_err());
        assert!(parse_bbox("11.2,45.5,11.0,45.7").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }

    #[test]
    fn zoom_parsing() {
        assert_eq!(parse_zoom("10").unwrap(), (10, 10));
        assert_eq!(parse_zoom("8-12").unwrap(), (8, 12));
        assert!(parse_zoom("12-8").is_err());
        assert!(parse_zoom("x").is_err());
    }
}
