use std::io::Write;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hypso::{ElevationEngine, GeoPoint, Quadrant, TileIndex};
use tempfile::TempDir;

const SRTM3_SAMPLES: usize = 1201;
const SRTM3_SIZE: usize = SRTM3_SAMPLES * SRTM3_SAMPLES * 2;

/// Create a synthetic SRTM3 tile with a simple elevation gradient.
fn create_tile(dir: &std::path::Path, filename: &str) {
    let mut data = vec![0u8; SRTM3_SIZE];
    for row in 0..SRTM3_SAMPLES {
        for col in 0..SRTM3_SAMPLES {
            let elev = (1200 + (row + col) % 3000) as i16;
            let offset = (row * SRTM3_SAMPLES + col) * 2;
            let bytes = elev.to_be_bytes();
            data[offset] = bytes[0];
            data[offset + 1] = bytes[1];
        }
    }
    let path = dir.join(filename);
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&data).unwrap();
}

/// Four quadrant tiles and an engine reading them.
fn engine(tmp: &TempDir) -> ElevationEngine {
    let index = TileIndex::new_mexico().with_filename_template("nm_dem_{quadrant}.hgt");
    for quadrant in Quadrant::ALL {
        create_tile(tmp.path(), &index.filename(quadrant));
    }
    ElevationEngine::builder(tmp.path())
        .tile_index(index)
        .build()
        .unwrap()
}

fn bench_single_cached(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    // Warm the caches
    let _ = engine.query_elevation(35.0844, -106.6504);

    c.bench_function("single_cached_chunk", |b| {
        b.iter(|| {
            black_box(engine.query_elevation(black_box(35.0844), black_box(-106.6504)));
        });
    });
}

fn bench_batch_same_chunk(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    // 1000 coords inside one chunk of the NW tile
    let coords: Vec<(f64, f64)> = (0..1000)
        .map(|i| {
            let frac = i as f64 / 1000.0;
            (36.9 + frac * 0.05, -109.0 + frac * 0.05)
        })
        .collect();

    let _ = engine.query_elevation(36.9, -109.0);

    c.bench_function("batch_1000_same_chunk", |b| {
        b.iter(|| {
            black_box(engine.query_batch(black_box(&coords)));
        });
    });
}

fn bench_batch_chunk_churn(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    // 1000 coords spread diagonally across all four tiles, far more chunks
    // than the cache holds
    let coords: Vec<(f64, f64)> = (0..1000)
        .map(|i| {
            let frac = i as f64 / 1000.0;
            (31.4 + frac * 5.5, -109.0 + frac * 5.9)
        })
        .collect();

    c.bench_function("batch_1000_chunk_churn", |b| {
        b.iter(|| {
            black_box(engine.query_batch(black_box(&coords)));
        });
    });
}

fn bench_profile(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let start = GeoPoint::new(35.0844, -106.6504);
    let end = GeoPoint::new(35.6870, -105.9378);

    c.bench_function("profile_100_points", |b| {
        b.iter(|| {
            black_box(engine.profile(black_box(start), black_box(end), 100).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_single_cached,
    bench_batch_same_chunk,
    bench_batch_chunk_churn,
    bench_profile,
);
criterion_main!(benches);
