// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use criterion::{criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;
use mono_vors::core::{candidates::fast, track::klt};

/// Smooth texture shifted horizontally by `shift` pixels.
fn texture(shift: f64) -> DMatrix<u8> {
    DMatrix::from_fn(376, 1241, |r, c| {
        let (x, y) = (c as f64 - shift, r as f64);
        let v = 128.0 + 40.0 * (x / 6.0).sin() + 40.0 * (y / 8.0).cos() + 30.0 * ((x - y) / 10.0).sin();
        v as u8
    })
}

fn criterion_benchmark(c: &mut Criterion) {
    let fast_config = fast::Config::default();
    let previous = texture(0.0);
    c.bench_function("fast 376x1241", |b| b.iter(|| fast_config.detect(&previous)));

    let klt_config = klt::Config::default();
    let points: Vec<_> = fast_config
        .detect(&previous)
        .iter()
        .map(fast::Corner::position)
        .collect();
    let previous_pyramid = klt_config.pyramid(previous);
    let current_pyramid = klt_config.pyramid(texture(2.5));
    c.bench_function(&format!("klt {} points", points.len()), |b| {
        b.iter(|| klt_config.track(&previous_pyramid, &current_pyramid, &points))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
