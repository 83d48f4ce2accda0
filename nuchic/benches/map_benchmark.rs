use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use nuchic::benchmark::integrands::{GenzGaussian, GenzProductPeak};
use nuchic::config::VegasConfig;
use nuchic::vegas::Vegas;
use nuchic::{AdaptiveMap, HistogramMap};

fn map_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Map 4D");
    let mut rng = Pcg64::seed_from_u64(1234);
    let points: Vec<Vec<f64>> = (0..10_000)
        .map(|_| (0..4).map(|_| rng.gen::<f64>()).collect())
        .collect();

    let adaptive = AdaptiveMap::new(4, 50);
    group.bench_function("AdaptiveMap batch (SIMD)", |b| {
        b.iter(|| adaptive.map(black_box(&points)).unwrap())
    });

    group.bench_function("AdaptiveMap single point", |b| {
        b.iter(|| {
            for p in &points {
                black_box(adaptive.map_point(black_box(p)).unwrap());
            }
        })
    });

    let histogram = HistogramMap::new(4, 50);
    group.bench_function("HistogramMap in place", |b| {
        b.iter(|| {
            let mut p = [0.0; 4];
            for point in &points {
                p.copy_from_slice(point);
                black_box(histogram.map_in_place(black_box(&mut p)).unwrap());
            }
        })
    });

    group.bench_function("AdaptiveMap train + adapt", |b| {
        b.iter(|| {
            let mut map = AdaptiveMap::new(4, 50);
            let weights = vec![1.0; points.len()];
            map.add_training_data(black_box(&points), &weights).unwrap();
            map.adapt(0.5, 0).unwrap();
        })
    });
    group.finish();
}

fn vegas_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Vegas 3D");
    let boundaries = &[(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)];
    let config = VegasConfig {
        n_iter: 1,
        n_eval: 100_000,
        seed: Some(1234),
        ..VegasConfig::default()
    };

    group.bench_function("GenzGaussian", |b| {
        b.iter(|| {
            let mut vegas = Vegas::new(config.clone(), boundaries).unwrap();
            vegas.integrate(black_box(&GenzGaussian::new(3))).unwrap();
        })
    });

    group.bench_function("GenzProductPeak", |b| {
        b.iter(|| {
            let mut vegas = Vegas::new(config.clone(), boundaries).unwrap();
            vegas.integrate(black_box(&GenzProductPeak::new(3))).unwrap();
        })
    });
    group.finish();
}

criterion_group!(benches, map_benchmark, vegas_benchmark);
criterion_main!(benches);
