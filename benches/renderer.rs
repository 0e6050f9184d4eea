use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use geo::{coord, Coord};
use inkmap::coastline;
use inkmap::geom;
use inkmap::occupancy::Occupancy;
use inkmap::path_text;
use inkmap::text_metrics::GlyphRecord;

fn crowded_occupancy(blocks: usize) -> Occupancy {
    let mut occ = Occupancy::new(800.0, 600.0);
    for i in 0..blocks {
        let x = (i % 10) as f64 * 78.0 + 5.0;
        let y = (i / 10) as f64 * 55.0 + 5.0;
        occ.union(&geom::rect_polygon(x, y, x + 60.0, y + 14.0), 3.0);
    }
    occ
}

fn synthetic_glyphs(count: usize) -> Vec<GlyphRecord> {
    (0..count)
        .map(|_| GlyphRecord {
            contours: vec![vec![
                coord! { x: 0.0, y: 0.0 },
                coord! { x: 6.0, y: 0.0 },
                coord! { x: 6.0, y: -8.0 },
                coord! { x: 0.0, y: -8.0 },
                coord! { x: 0.0, y: 0.0 },
            ]],
            advance: 6.0,
            spacing: 0.7,
        })
        .collect()
}

fn wavy_curve(points: usize) -> Vec<Coord<f64>> {
    (0..points)
        .map(|i| {
            let x = i as f64 * 8.0;
            coord! { x: x, y: 300.0 + (x * 0.02).sin() * 40.0 }
        })
        .collect()
}

fn bench_find_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_position");
    for blocks in [10usize, 40, 70] {
        let occ = crowded_occupancy(blocks);
        let candidate = geom::rect_polygon(390.0, 290.0, 460.0, 310.0);
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &occ, |b, occ| {
            b.iter(|| black_box(occ.find_position(black_box(&candidate), 10, 4.0)));
        });
    }
    group.finish();
}

fn bench_place_glyphs(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_glyphs");
    for count in [8usize, 24, 48] {
        let glyphs = synthetic_glyphs(count);
        let curve = wavy_curve(120);
        group.bench_with_input(BenchmarkId::from_parameter(count), &glyphs, |b, glyphs| {
            b.iter(|| black_box(path_text::place_glyphs(glyphs, &curve, 10.0).len()));
        });
    }
    group.finish();
}

fn bench_coastline_closure(c: &mut Criterion) {
    let rect = geo::Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1000.0, y: 1000.0 });
    let mut fragments = Vec::new();
    for i in 0..12 {
        let y = 40.0 + i as f64 * 75.0;
        fragments.push(vec![
            coord! { x: 0.0, y: y },
            coord! { x: 500.0, y: y + 20.0 },
            coord! { x: 0.0, y: y + 40.0 },
        ]);
    }
    c.bench_function("coastline_closure", |b| {
        b.iter(|| black_box(coastline::close_coastline_fragments(black_box(&fragments), &rect).len()));
    });
}

fn bench_select_segment(c: &mut Criterion) {
    let curve = wavy_curve(400);
    c.bench_function("select_segment", |b| {
        b.iter(|| black_box(path_text::select_segment(black_box(&curve), 180.0, path_text::MAX_BEND)));
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_find_position, bench_place_glyphs, bench_coastline_closure, bench_select_segment
);
criterion_main!(benches);
