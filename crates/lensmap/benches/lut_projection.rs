//! LUT Projection Benchmark
//!
//! Measures inverse projection through a ray-direction lookup table:
//!
//! - nearest stored ray through the k-d tree vs an exhaustive scan
//! - full batch projection through `RayDirectionLut` and `LutView`
//!
//! ## Usage
//!
//! ```bash
//! cargo bench --bench lut_projection
//! ```

use criterion::{Criterion, criterion_group, criterion_main};
use lensmap::camera_models::KdTree3;
use lensmap::camera_models::kdtree::nearest_brute_force;
use lensmap::{CameraFrame, CameraView, LutConfig, LutView, RayDirectionLut, RayImage};
use nalgebra::Vector3;
use std::hint::black_box;
use tracing::info;

const ROWS: usize = 200;
const COLS: usize = 300;
const FOCAL: f64 = 150.0;
const QUERIES: usize = 1000;

fn pinhole_lut() -> RayImage {
    let mut image = RayImage::zeros(ROWS, COLS, 3);
    for r in 0..ROWS {
        for c in 0..COLS {
            let x = c as f64 + 0.5 - COLS as f64 / 2.0;
            let y = ROWS as f64 / 2.0 - r as f64 - 0.5;
            image.set_ray(r, c, &Vector3::new(x, y, -FOCAL).normalize());
        }
    }
    image
}

/// Deterministic queries spread over the table.
fn queries() -> Vec<Vector3<f64>> {
    (0..QUERIES)
        .map(|i| {
            let x = ((i as f64 * 0.618_034) % 1.0 - 0.5) * COLS as f64 * 0.9;
            let y = ((i as f64 * 0.414_214) % 1.0 - 0.5) * ROWS as f64 * 0.9;
            Vector3::new(x, y, -FOCAL).normalize()
        })
        .collect()
}

fn criterion_benchmark(c: &mut Criterion) {
    lensmap::init_logger();

    let image = pinhole_lut();
    let rays = image.rays();
    let queries = queries();
    let tree = KdTree3::build(&rays);
    info!(cells = rays.len(), queries = queries.len(), "LUT benchmark data ready");

    let mut group = c.benchmark_group("nearest_ray");
    group.bench_function("kd_tree", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(tree.nearest(black_box(q)));
            }
        })
    });
    group.sample_size(10);
    group.bench_function("brute_force", |b| {
        b.iter(|| {
            for q in &queries {
                black_box(nearest_brute_force(&rays, black_box(q)));
            }
        })
    });
    group.finish();

    let lut = match RayDirectionLut::from_image(&image, &LutConfig::new()) {
        Ok(lut) => lut,
        Err(e) => {
            tracing::error!("failed to build benchmark LUT: {e}");
            return;
        }
    };
    let view = match LutView::from_image(&image, &LutConfig::new(), CameraFrame::default()) {
        Ok(view) => view,
        Err(e) => {
            tracing::error!("failed to build benchmark view: {e}");
            return;
        }
    };

    let mut group = c.benchmark_group("batch_projection");
    group.bench_function("ray_dirs_to_pixels_rc", |b| {
        b.iter(|| black_box(lut.ray_dirs_to_pixels_rc(black_box(&queries), false)))
    });
    group.bench_function("lut_view_project_to_image", |b| {
        b.iter(|| black_box(view.project_to_image(black_box(&queries))))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
