//! MPI-specific implementation for distributed training and integration.
use log::{debug, info};
use mpi::collective::SystemOperation;
use mpi::topology::Communicator;
use mpi::traits::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::adaptive_map::AdaptiveMap;
use crate::error::Result;
use crate::integrand::Integrand;
use crate::sampler::Samplable;
use crate::vegas::{reached_accuracy, Vegas, VegasResult};

impl AdaptiveMap {
    /// Sums the training data of all processes in `world` element-wise.
    ///
    /// Every process must hold a map with the same partition (the same
    /// adaptation history). Afterwards each process holds the global
    /// training data, so calling [`AdaptiveMap::adapt`] on every rank keeps
    /// the grids identical.
    pub fn all_reduce_training_data<C: Communicator>(&mut self, world: &C) -> Result<()> {
        let local_data = self.training_data();
        let mut global_data = vec![0.0; local_data.len()];

        world.all_reduce_into(
            &local_data[..],
            &mut global_data[..],
            SystemOperation::sum(),
        );

        self.set_training_data(&global_data)
    }
}

impl Vegas<AdaptiveMap> {
    /// Integrates the given function in a distributed manner using MPI.
    ///
    /// This method should be called by all processes in the MPI communicator.
    /// The final result is returned on the root process (rank 0), while other
    /// processes will return a default `VegasResult`.
    ///
    /// # Arguments
    ///
    /// * `integrand`: The function to integrate. Must be `Sync`.
    /// * `world`: The MPI communicator.
    /// * `target_accuracy`: Optional relative accuracy in percent; overrides the config.
    pub fn integrate_mpi<F: Integrand + Sync, C: Communicator>(
        &mut self,
        integrand: &F,
        world: &C,
        target_accuracy: Option<f64>,
    ) -> Result<VegasResult> {
        let rank = world.rank();
        let size = world.size();

        // Every rank needs its own stream of random numbers.
        if let Some(seed) = self.config.seed {
            self.rng = Pcg64::seed_from_u64(seed.wrapping_add(rank as u64));
        }

        let n_eval_per_rank = (self.config.n_eval / size as usize).max(2);
        let target_accuracy = target_accuracy.or(self.config.target_accuracy);

        let mut iter_results = Vec::new();
        let mut iter_errors = Vec::new();

        for iter in 0..self.config.n_iter {
            let (iter_val, iter_err) = self.run_iteration(integrand, n_eval_per_rank)?;

            self.map.all_reduce_training_data(world)?;

            let mut stop_signal = 0i32;
            let root = world.process_at_rank(0);

            if rank == 0 {
                let mut global_iter_val = 0.0;
                root.reduce_into_root(&iter_val, &mut global_iter_val, SystemOperation::sum());

                let mut global_iter_err_sq: f64 = 0.0;
                let iter_err_sq = iter_err.powi(2);
                root.reduce_into_root(
                    &iter_err_sq,
                    &mut global_iter_err_sq,
                    SystemOperation::sum(),
                );

                // Each rank estimated the full integral, so average them.
                let global_val = global_iter_val / size as f64;
                let global_err = global_iter_err_sq.sqrt() / size as f64;
                debug!("iteration {iter}: {global_val} +/- {global_err}");

                if iter > 0 {
                    iter_results.push(global_val);
                    iter_errors.push(global_err);

                    if let Some(acc_req) = target_accuracy {
                        let current = self.combine_results(&iter_results, &iter_errors);
                        if reached_accuracy(&current, acc_req) {
                            info!("target accuracy {acc_req}% reached after {} iterations", iter + 1);
                            stop_signal = 1;
                        }
                    }
                }
            } else {
                root.reduce_into(&iter_val, SystemOperation::sum());
                let iter_err_sq = iter_err.powi(2);
                root.reduce_into(&iter_err_sq, SystemOperation::sum());
            }

            root.broadcast_into(&mut stop_signal);

            if stop_signal == 1 {
                break;
            }

            self.map.refine(self.config.alpha)?;
        }

        if rank == 0 {
            Ok(self.combine_results(&iter_results, &iter_errors))
        } else {
            Ok(VegasResult::default())
        }
    }
}
