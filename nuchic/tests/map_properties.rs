use approx::assert_relative_eq;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use nuchic::{AdaptiveMap, Error, HistogramMap, Samplable, Split};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn strictly_increasing(edges: &[f64]) -> bool {
    edges.windows(2).all(|pair| pair[0] < pair[1])
}

#[test]
fn uniform_grid_has_equal_bins() {
    let mut map = AdaptiveMap::new(3, 0);
    map.make_uniform(16).unwrap();
    for d in 0..3 {
        let edges = map.edges(d);
        assert_eq!(edges.len(), 17);
        assert_eq!(edges[0], 0.0);
        assert_eq!(edges[16], 1.0);
        assert!(strictly_increasing(edges));
        for pair in edges.windows(2) {
            assert_relative_eq!(pair[1] - pair[0], 1.0 / 16.0, epsilon = 1e-15);
        }
    }
}

#[test]
fn uniform_grid_maps_identically() {
    let map = AdaptiveMap::new(4, 9);
    let mut rng = Pcg64::seed_from_u64(7);
    let points: Vec<Vec<f64>> = (0..37)
        .map(|_| (0..4).map(|_| rng.gen::<f64>()).collect())
        .collect();
    let (mapped, jacobians) = map.map(&points).unwrap();
    for (point, (x, jac)) in points.iter().zip(mapped.iter().zip(&jacobians)) {
        assert_relative_eq!(*jac, 1.0, epsilon = 1e-12);
        for (a, b) in point.iter().zip(x) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn training_clusters_edges_near_heavy_points() {
    init_logging();
    let mut map = AdaptiveMap::new(1, 4);
    let points = vec![vec![0.1], vec![0.1], vec![0.1], vec![0.9]];
    map.add_training_data(&points, &[1.0; 4]).unwrap();
    map.adapt(1.0, 0).unwrap();

    let edges = map.edges(0);
    assert!(strictly_increasing(edges));
    let bin_of = |x: f64| edges.partition_point(|&e| e <= x) - 1;
    let width = |bin: usize| edges[bin + 1] - edges[bin];
    assert!(width(bin_of(0.1)) < width(bin_of(0.9)));
    assert!(width(bin_of(0.1)) < 0.25);
}

#[test]
fn last_bin_point_maps_cleanly() {
    let map = AdaptiveMap::new(1, 10);
    let (x, jac) = map.map_point(&[0.9999999]).unwrap();
    assert!(jac.is_finite() && jac > 0.0);
    assert!(x[0] >= map.edges(0)[9] && x[0] <= 1.0);
}

#[test]
fn adapt_without_training_is_stable() {
    let mut map = AdaptiveMap::new(2, 8);
    map.add_training_point(&[0.2, 0.7], 3.0).unwrap();
    map.adapt(0.7, 0).unwrap();
    let before: Vec<Vec<f64>> = (0..2).map(|d| map.edges(d).to_vec()).collect();

    map.adapt(0.7, 0).unwrap();
    map.adapt(1.0, 0).unwrap();
    for d in 0..2 {
        assert_eq!(map.edges(d), &before[d][..]);
        assert!(map.edges(d).iter().all(|e| e.is_finite()));
    }
}

#[test]
fn repeated_adaptation_stays_monotone() {
    init_logging();
    let mut map = AdaptiveMap::new(2, 20);
    map.set_seed(99);
    let peak = [0.3, 0.8];
    for _ in 0..15 {
        for _ in 0..2_000 {
            let (x, jac) = map.random().unwrap();
            let r2: f64 = x.iter().zip(peak).map(|(a, b)| (a - b).powi(2)).sum();
            let f = (-r2 * 400.0).exp() * jac;
            map.add_training_point(&x, f * f).unwrap();
        }
        map.adapt(0.5, 0).unwrap();
        for d in 0..2 {
            let edges = map.edges(d);
            assert!(strictly_increasing(edges));
            assert_eq!(edges[0], 0.0);
            assert_eq!(edges[20], 1.0);
        }
    }

    // The bin holding the peak is narrower than a uniform bin.
    for (d, &p) in peak.iter().enumerate() {
        let edges = map.edges(d);
        let bin = edges.partition_point(|&e| e <= p) - 1;
        assert!(edges[bin + 1] - edges[bin] < 1.0 / 20.0);
    }
}

#[test]
fn mismatched_dimensions_are_rejected() {
    let mut map = AdaptiveMap::new(2, 4);
    assert!(matches!(
        map.add_training_point(&[0.1, 0.2, 0.3], 1.0),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        map.map(&[vec![0.1, 0.2], vec![0.3]]),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        map.map(&[vec![0.1, 0.2], vec![0.3, 1.2]]),
        Err(Error::OutOfRange { dim: 1, .. })
    ));
}

#[test]
fn histogram_map_round_trip_is_exact() {
    let mut map = HistogramMap::new(3, 5);
    let mut rng = Pcg64::seed_from_u64(3);
    for _ in 0..200 {
        let point: Vec<f64> = (0..3).map(|_| rng.gen::<f64>()).collect();
        map.adapt(0.3, &point).unwrap();
    }
    map.split(Split::Third).unwrap();

    let mut buffer = Vec::new();
    map.serialize(&mut buffer).unwrap();
    let restored = HistogramMap::deserialize(&buffer[..]).unwrap();

    assert_eq!(restored.dims(), 3);
    assert_eq!(restored.bins(), 15);
    let bits = |m: &HistogramMap| m.edges().iter().map(|e| e.to_bits()).collect::<Vec<_>>();
    assert_eq!(bits(&restored), bits(&map));
}

#[test]
fn histogram_split_contains_original_edges() {
    let mut map = HistogramMap::new(2, 4);
    map.adapt(0.8, &[0.1, 0.6]).unwrap();
    map.adapt(0.4, &[0.45, 0.95]).unwrap();
    let original = map.edges().to_vec();

    map.split(Split::Half).unwrap();
    assert_eq!(map.bins(), 8);
    for d in 0..2 {
        let edges = map.dim_edges(d);
        assert!(strictly_increasing(edges));
        for edge in &original[d * 5..(d + 1) * 5] {
            assert!(edges.contains(edge));
        }
    }
}

#[test]
fn histogram_adaptation_stays_monotone() {
    let mut map = HistogramMap::new(2, 6);
    let mut rng = Pcg64::seed_from_u64(11);
    for i in 0..1_000 {
        let point = [rng.gen::<f64>().powi(3), 1.0 - rng.gen::<f64>().powi(3)];
        map.adapt(0.25, &point).unwrap();
        if i == 500 {
            map.split(Split::Quarter).unwrap();
        }
    }
    for d in 0..2 {
        let edges = map.dim_edges(d);
        assert!(strictly_increasing(edges));
        assert_eq!(edges[0], 0.0);
        assert_eq!(edges[24], 1.0);
    }
}

#[test]
fn both_maps_share_the_samplable_interface() {
    fn exercise<M: Samplable>(map: &mut M) {
        let (x, jac) = map.map_sample(&vec![0.5; map.dims()]).unwrap();
        assert!(jac > 0.0);
        map.train(&x, 1.0).unwrap();
        map.refine(0.5).unwrap();
        assert_eq!(map.region(0), [0.0, 1.0]);
    }
    exercise(&mut AdaptiveMap::new(2, 5));
    exercise(&mut HistogramMap::new(2, 5));
}
