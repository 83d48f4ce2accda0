// This test is an integration test and must be run with mpirun.
// Example: mpirun -n 4 cargo test --features mpi --test mpi_integration_test -- --nocapture

#[cfg(feature = "mpi")]
mod mpi_tests {
    use mpi::traits::*;
    use nuchic::benchmark::integrands::GenzGaussian;
    use nuchic::config::VegasConfig;
    use nuchic::vegas::Vegas;
    use nuchic::AdaptiveMap;

    #[test]
    fn test_mpi_gaussian_integration() {
        let universe = mpi::initialize().unwrap();
        let world = universe.world();
        let rank = world.rank();

        let integrand = GenzGaussian::with_params(2, 3.0, 0.4);
        let config = VegasConfig {
            n_iter: 10,
            n_eval: 40_000,
            seed: Some(2024),
            ..VegasConfig::default()
        };
        let mut vegas = Vegas::new(config, &[(0.0, 1.0), (0.0, 1.0)]).unwrap();
        let result = vegas.integrate_mpi(&integrand, &world, None).unwrap();

        if rank == 0 {
            let expected = integrand.analytical_result();
            assert!((result.value - expected).abs() < 5.0 * result.error);
            assert!(result.chi2_dof < 5.0);
        }

        // Every rank ends with the same grid.
        let edges = vegas.map().edges(0).to_vec();
        let mut root_edges = edges.clone();
        world.process_at_rank(0).broadcast_into(&mut root_edges[..]);
        assert_eq!(edges, root_edges);

        let mut map = AdaptiveMap::new(1, 4);
        map.add_training_point(&[0.1], 1.0).unwrap();
        map.all_reduce_training_data(&world).unwrap();
        assert_eq!(map.training_data()[0], world.size() as f64);
    }
}
