//! Criterion benchmarks for sinogram restoration.
//!
//! Run with: cargo bench -p sinodec_core
//! Run specific: cargo bench -p sinodec_core -- transforms

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rand::prelude::*;

use sinodec_core::filters::median_filter_2d;
use sinodec_core::{
    estimate_shift, haar_dwt2, plan_transform, DeconvolutionParams, SpectralDeconvolver,
    TransformBackend, WaveletArtifactSuppressor,
};

// =============================================================================
// Helper Functions for Test Data Generation
// =============================================================================

fn random_sinogram_f32(pixels: usize, angles: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((pixels, angles), |_| rng.gen())
}

fn random_sinogram_f64(pixels: usize, angles: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((pixels, angles), |_| rng.gen())
}

fn backends() -> Vec<TransformBackend> {
    let mut list = vec![TransformBackend::Direct];
    if cfg!(feature = "half-spectrum") {
        list.push(TransformBackend::HalfSpectrum);
    }
    list
}

// =============================================================================
// Transform Benchmarks
// =============================================================================

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("transforms");

    for (pixels, angles) in [(256, 180), (512, 400), (1024, 400)] {
        let input = random_sinogram_f32(pixels, angles, 42);
        let label = format!("{pixels}x{angles}");
        group.throughput(Throughput::Elements((pixels * angles) as u64));

        for backend in backends() {
            let Ok(transform) = plan_transform::<f32>(backend, (pixels, angles)) else {
                continue;
            };
            let spectrum = transform.forward(input.view()).unwrap();

            group.bench_with_input(
                BenchmarkId::new(format!("{}/forward", backend.name()), &label),
                &label,
                |b, _| b.iter(|| transform.forward(black_box(input.view()))),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("{}/inverse", backend.name()), &label),
                &label,
                |b, _| b.iter(|| transform.inverse(black_box(spectrum.view()))),
            );
        }
    }

    group.finish();
}

// =============================================================================
// Deconvolution Benchmarks
// =============================================================================

fn bench_deconvolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("deconvolution");
    group.sample_size(20);

    for (pixels, angles) in [(256, 180), (512, 400)] {
        let input = random_sinogram_f64(pixels, angles, 7);
        let label = format!("{pixels}x{angles}");
        group.throughput(Throughput::Elements((pixels * angles) as u64));

        for backend in backends() {
            let Ok(transform) = plan_transform::<f64>(backend, (pixels, angles)) else {
                continue;
            };
            let deconvolver =
                SpectralDeconvolver::new(transform, DeconvolutionParams::new(1.0, 0.05)).unwrap();
            group.bench_with_input(BenchmarkId::new(backend.name(), &label), &label, |b, _| {
                b.iter(|| deconvolver.deconvolve(black_box(input.view())))
            });
        }
    }

    group.finish();
}

// =============================================================================
// Wavelet Benchmarks
// =============================================================================

fn bench_wavelet(c: &mut Criterion) {
    let mut group = c.benchmark_group("wavelet");

    for (pixels, angles) in [(256, 180), (1024, 400)] {
        let input = random_sinogram_f32(pixels, angles, 123);
        let label = format!("{pixels}x{angles}");
        group.throughput(Throughput::Elements((pixels * angles) as u64));

        group.bench_with_input(BenchmarkId::new("haar_dwt2", &label), &label, |b, _| {
            b.iter(|| haar_dwt2(black_box(input.view())))
        });

        let suppressor = WaveletArtifactSuppressor::new(5).unwrap();
        group.bench_with_input(BenchmarkId::new("remove_artifacts", &label), &label, |b, _| {
            b.iter(|| suppressor.remove_artifacts(black_box(input.view())))
        });
    }

    for size in [3, 5, 10] {
        let input = random_sinogram_f32(512, 200, 9);
        group.bench_with_input(BenchmarkId::new("median_filter_512x200", size), &size, |b, &s| {
            b.iter(|| median_filter_2d(black_box(input.view()), s))
        });
    }

    group.finish();
}

// =============================================================================
// Centering Benchmarks
// =============================================================================

fn bench_centering(c: &mut Criterion) {
    let mut group = c.benchmark_group("centering");

    for pixels in [256, 1024, 2048] {
        let input = random_sinogram_f32(pixels, 400, 5);
        group.throughput(Throughput::Elements(pixels as u64 * 50));
        group.bench_with_input(BenchmarkId::new("estimate_shift_span50", pixels), &pixels, |b, _| {
            b.iter(|| estimate_shift(black_box(input.view()), 50, true))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_transforms,
    bench_deconvolution,
    bench_wavelet,
    bench_centering
);
criterion_main!(benches);
