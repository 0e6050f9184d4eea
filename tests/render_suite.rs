use std::path::Path;
use std::sync::atomic::AtomicBool;

use inkmap::canvas::Canvas;
use inkmap::config::StyleSheet;
use inkmap::projection::Projection;
use inkmap::render::Renderer;
use inkmap::source::GeoJsonSource;
use inkmap::tiles::{self, TileFormat};

const BBOX: (f64, f64, f64, f64) = (10.98, 45.54, 11.22, 45.66);

fn load_fixture(name: &str) -> GeoJsonSource {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    GeoJsonSource::from_path(&path).expect("fixture parses")
}

fn render_fixture(name: &str) -> String {
    let source = load_fixture(name);
    let sheet = StyleSheet::default_sheet();
    let mut canvas = Canvas::new(BBOX, 800, Projection::Mercator).expect("canvas");
    Renderer::new(&mut canvas, &sheet, &source)
        .run()
        .expect("render succeeds");
    canvas.to_svg()
}

#[test]
fn harbour_renders_all_layers() {
    let svg = render_fixture("harbour.geojson");
    assert!(svg.starts_with("<svg"), "missing <svg tag");
    assert!(svg.ends_with("</svg>"), "missing </svg tag");
    // Sea flood from the coastline pass plus a synthesized land ring.
    assert!(svg.contains("fill=\"#b8d2dc\""), "missing sea fill");
    assert!(
        svg.contains("fill=\"#f6f2ea\" fill-rule=\"evenodd\""),
        "missing land ring"
    );
    // Styled strokes for the road hierarchy.
    assert!(svg.contains("stroke=\"#e8913e\""), "missing motorway");
    assert!(svg.contains("stroke=\"#f4c23f\""), "missing primary road");
    // Polygon fills.
    assert!(svg.contains("fill=\"#d5e8c8\""), "missing park");
}

#[test]
fn rendering_is_deterministic() {
    assert_eq!(
        render_fixture("harbour.geojson"),
        render_fixture("harbour.geojson")
    );
}

#[test]
fn tile_pyramid_writes_the_expected_layout() {
    let source = load_fixture("harbour.geojson");
    let sheet = StyleSheet::default_sheet();
    let out_dir = std::env::temp_dir().join("inkmap-test-pyramid");
    let _ = std::fs::remove_dir_all(&out_dir);

    let jobs = tiles::pyramid_jobs(BBOX, 10, 10);
    assert!(!jobs.is_empty());
    let expected = jobs[0];

    let stop = AtomicBool::new(false);
    let rendered = tiles::render_pyramid(
        &source,
        &sheet,
        jobs.clone(),
        &out_dir,
        256,
        TileFormat::Svg,
        2,
        &stop,
    )
    .expect("pyramid renders");
    assert_eq!(rendered, jobs.len());

    let tile_path = out_dir
        .join(expected.zoom.to_string())
        .join(expected.x.to_string())
        .join(format!("{}.svg", expected.y));
    assert!(tile_path.exists(), "missing {}", tile_path.display());

    let _ = std::fs::remove_dir_all(&out_dir);
}

#[test]
fn stop_flag_prevents_new_work() {
    let source = load_fixture("harbour.geojson");
    let sheet = StyleSheet::default_sheet();
    let out_dir = std::env::temp_dir().join("inkmap-test-stopped");
    let _ = std::fs::remove_dir_all(&out_dir);

    let stop = AtomicBool::new(true);
    let rendered = tiles::render_pyramid(
        &source,
        &sheet,
        tiles::pyramid_jobs(BBOX, 10, 10),
        &out_dir,
        256,
        TileFormat::Svg,
        2,
        &stop,
    )
    .expect("returns cleanly");
    assert_eq!(rendered, 0);

    let _ = std::fs::remove_dir_all(&out_dir);
}
