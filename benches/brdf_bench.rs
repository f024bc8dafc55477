use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::Vec3;
use ibl_bake::panorama::Panorama;
use ibl_bake::passes::brdf::{integrate, integrate_brdf};
use ibl_bake::passes::equirect::convert;
use ibl_bake::passes::irradiance::convolve;
use ibl_bake::passes::{CancelToken, HostExecutor, PassContext};

fn brdf_texel_benchmark(c: &mut Criterion) {
    c.bench_function("integrate_brdf_1024_samples", |b| {
        b.iter(|| black_box(integrate_brdf(black_box(0.5), black_box(0.5), 1024)))
    });
}

fn brdf_lut_benchmark(c: &mut Criterion) {
    let cancel = CancelToken::new();
    let ctx = PassContext {
        executor: &HostExecutor,
        cancel: &cancel,
    };
    let mut group = c.benchmark_group("brdf_lut");
    group.sample_size(10);

    for size in [32u32, 64, 128].iter() {
        group.bench_function(format!("{}x{}_256_samples", size, size), |b| {
            b.iter(|| black_box(integrate(*size, 256, &ctx)))
        });
    }
    group.finish();
}

fn irradiance_benchmark(c: &mut Criterion) {
    let cancel = CancelToken::new();
    let ctx = PassContext {
        executor: &HostExecutor,
        cancel: &cancel,
    };
    let pano = Panorama::from_fn(128, 64, |dir| Vec3::splat(dir.y.max(0.0)) + 0.1)
        .expect("valid panorama");
    let env = convert(&pano, 64, &ctx).expect("capture succeeds");

    let mut group = c.benchmark_group("irradiance");
    group.sample_size(10);
    for delta in [0.1f32, 0.05].iter() {
        group.bench_function(format!("16x16_delta_{}", delta), |b| {
            b.iter(|| black_box(convolve(&env, 16, *delta, &ctx)))
        });
    }
    group.finish();
}

criterion_group!(benches, brdf_texel_benchmark, brdf_lut_benchmark, irradiance_benchmark);
criterion_main!(benches);
