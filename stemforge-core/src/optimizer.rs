//! Cycle-count and working-volume search.
//!
//! Both searches re-run the same Monte Carlo experiment: every run multiplies
//! one sampled cycle factor per cycle, and the experiment passes when the
//! `(1 - threshold)` percentile of the final fold increase reaches the
//! required total fold increase.

use crate::{
    allocation::{VesselAllocation, VesselAllocator},
    error::StemforgeError,
    sampling::{percentile, CycleFactorSource},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use stemforge_schemas::settings::SimulationSettings;
use tracing::{debug, info};

/// Outcome of one Monte Carlo experiment over all runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldIncreaseTrial {
    /// Final cumulative fold increase of each run, in run order.
    pub final_fold_increases: Vec<f64>,
    /// Mean cumulative fold increase after each cycle.
    pub mean_cycle_fold_increases: Vec<f64>,
}

impl FoldIncreaseTrial {
    /// Fold increase reached by a `threshold` share of the runs.
    pub fn threshold_fold_increase(&self, threshold: f64) -> f64 {
        let mut values = self.final_fold_increases.clone();
        percentile(&mut values, (1.0 - threshold) * 100.0)
    }

    /// Share of runs reaching `required`, rounded to three decimals.
    pub fn success_probability(&self, required: f64) -> f64 {
        if self.final_fold_increases.is_empty() {
            return 0.0;
        }
        let hits = self
            .final_fold_increases
            .iter()
            .filter(|&&f| f >= required)
            .count();
        (hits as f64 / self.final_fold_increases.len() as f64 * 1000.0).round() / 1000.0
    }
}

/// Parallel, batch-seeded Monte Carlo runner.
///
/// Runs are split into batches of `batch_size`; batch `b` draws from
/// `StdRng::seed_from_u64(seed + b)`, so the outcome depends only on `seed`.
#[derive(Clone, Copy)]
pub struct MonteCarlo<'a> {
    source: &'a dyn CycleFactorSource,
    runs: usize,
    batch_size: usize,
}

impl<'a> MonteCarlo<'a> {
    pub fn new(source: &'a dyn CycleFactorSource, runs: usize, batch_size: usize) -> Self {
        Self {
            source,
            runs,
            batch_size: batch_size.max(1),
        }
    }

    /// Simulates `cycles` sequential cycles per run. With a `cap`, the
    /// cumulative fold increase after cycle `c` is limited to `cap^c` for every
    /// cycle but the last.
    pub fn simulate(&self, cycles: usize, cap: Option<f64>, seed: u64) -> FoldIncreaseTrial {
        let batches = (self.runs + self.batch_size - 1) / self.batch_size;
        let results: Vec<(Vec<f64>, Vec<f64>)> = (0..batches)
            .into_par_iter()
            .map(|batch| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(batch as u64));
                let len = self.batch_size.min(self.runs - batch * self.batch_size);
                let mut finals = Vec::with_capacity(len);
                let mut cycle_sums = vec![0.0; cycles];
                for _ in 0..len {
                    let mut cumulative = 1.0;
                    for cycle in 1..=cycles {
                        cumulative *= self.source.cycle_factor(&mut rng);
                        if let Some(cap) = cap {
                            if cycle < cycles {
                                cumulative = cumulative.min(cap.powi(cycle as i32));
                            }
                        }
                        cycle_sums[cycle - 1] += cumulative;
                    }
                    finals.push(cumulative);
                }
                (finals, cycle_sums)
            })
            .collect();

        let mut final_fold_increases = Vec::with_capacity(self.runs);
        let mut sums = vec![0.0; cycles];
        for (finals, cycle_sums) in results {
            final_fold_increases.extend(finals);
            for (total, partial) in sums.iter_mut().zip(cycle_sums) {
                *total += partial;
            }
        }
        let runs = self.runs.max(1) as f64;
        FoldIncreaseTrial {
            final_fold_increases,
            mean_cycle_fold_increases: sums.into_iter().map(|s| s / runs).collect(),
        }
    }
}

/// Cycle count and per-cycle working volumes meeting the confidence threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CyclePlan {
    pub cycle_count: usize,
    /// Per-cycle fold increase the volumes are planned around.
    pub optimal_fold_increase: f64,
    /// Lowest per-cycle fold increase still reaching the final-volume floor.
    pub minimum_fold_increase: f64,
    pub required_fold_increase: f64,
    /// Fold increase at the `(1 - threshold)` percentile of the accepted trial.
    pub threshold_fold_increase: f64,
    pub success_probability: f64,
    pub volumes_ml: Vec<f64>,
    #[serde(skip)]
    pub final_fold_increases: Vec<f64>,
    pub mean_cycle_fold_increases: Vec<f64>,
}

pub struct WorkflowOptimizer<'a> {
    monte_carlo: MonteCarlo<'a>,
    source: &'a dyn CycleFactorSource,
    settings: &'a SimulationSettings,
    threshold: f64,
    required_fold_increase: f64,
    initial_volume_ml: f64,
}

impl<'a> WorkflowOptimizer<'a> {
    pub fn new(
        source: &'a dyn CycleFactorSource,
        settings: &'a SimulationSettings,
        threshold: f64,
        required_fold_increase: f64,
        initial_volume_ml: f64,
    ) -> Result<Self, StemforgeError> {
        if settings.simulation_runs == 0 {
            return Err(StemforgeError::Configuration(
                "simulation runs must be positive".to_string(),
            ));
        }
        if !(settings.decrease_ratio > 0.0 && settings.decrease_ratio < 1.0) {
            return Err(StemforgeError::Configuration(format!(
                "decrease ratio must be in (0, 1), got {}",
                settings.decrease_ratio
            )));
        }
        if !(required_fold_increase > 0.0 && required_fold_increase.is_finite()) {
            return Err(StemforgeError::Configuration(format!(
                "required fold increase must be positive, got {}",
                required_fold_increase
            )));
        }
        Ok(Self {
            monte_carlo: MonteCarlo::new(source, settings.simulation_runs, settings.batch_size),
            source,
            settings,
            threshold,
            required_fold_increase,
            initial_volume_ml,
        })
    }

    /// Runs the cycle-count search followed by the volume minimization.
    pub fn optimize(&self, rng: &mut StdRng) -> Result<CyclePlan, StemforgeError> {
        let (cycle_count, uncapped) = self.required_cycles(rng)?;

        let (optimal, minimum, trial) = if cycle_count == 1 {
            let average = self.source.average_cycle_factor();
            (average, average, uncapped)
        } else {
            self.minimize_fold_increase(cycle_count, rng)?
        };

        let success_probability = trial.success_probability(self.required_fold_increase);
        if success_probability <= 0.0 {
            return Err(StemforgeError::Convergence(format!(
                "no simulated run reaches the required fold increase of {:.2}",
                self.required_fold_increase
            )));
        }
        let volumes_ml = (0..cycle_count)
            .map(|i| self.initial_volume_ml * optimal.powi(i as i32))
            .collect();

        Ok(CyclePlan {
            cycle_count,
            optimal_fold_increase: optimal,
            minimum_fold_increase: minimum,
            required_fold_increase: self.required_fold_increase,
            threshold_fold_increase: trial.threshold_fold_increase(self.threshold),
            success_probability,
            volumes_ml,
            final_fold_increases: trial.final_fold_increases,
            mean_cycle_fold_increases: trial.mean_cycle_fold_increases,
        })
    }

    /// Smallest cycle count whose uncapped threshold fold increase reaches the
    /// required fold increase.
    pub fn required_cycles(
        &self,
        rng: &mut StdRng,
    ) -> Result<(usize, FoldIncreaseTrial), StemforgeError> {
        if self.required_fold_increase <= 1.0 {
            let trial = self.monte_carlo.simulate(1, None, rng.gen());
            return Ok((1, trial));
        }
        for cycles in 1..=self.settings.max_cycles {
            let trial = self.monte_carlo.simulate(cycles, None, rng.gen());
            let reached = trial.threshold_fold_increase(self.threshold);
            debug!(cycles, reached, required = self.required_fold_increase, "cycle count trial");
            if reached >= self.required_fold_increase {
                info!(cycles, "cycle count determined");
                return Ok((cycles, trial));
            }
        }
        Err(StemforgeError::Convergence(format!(
            "{} cycles do not reach a {:.2}-fold increase at threshold {}",
            self.settings.max_cycles, self.required_fold_increase, self.threshold
        )))
    }

    /// Lowers the per-cycle fold increase from the distribution average until the
    /// threshold fails or the final-volume floor is reached, then keeps the last
    /// passing value. Returns (optimal, floor, accepted trial).
    pub fn minimize_fold_increase(
        &self,
        cycles: usize,
        rng: &mut StdRng,
    ) -> Result<(f64, f64, FoldIncreaseTrial), StemforgeError> {
        let ratio = self.settings.decrease_ratio;
        let floor = (self.settings.min_final_volume_ml / self.initial_volume_ml)
            .powf(1.0 / (cycles - 1) as f64);
        let mut optimal = self.source.average_cycle_factor();

        if optimal <= floor {
            let trial = self.monte_carlo.simulate(cycles, Some(floor), rng.gen());
            debug!(floor, "average fold increase below the volume floor, clamping");
            return Ok((floor, floor, trial));
        }

        let mut accepted: Option<(f64, FoldIncreaseTrial)> = None;
        for step in 0..self.settings.max_optimization_steps {
            let trial = self.monte_carlo.simulate(cycles, Some(optimal), rng.gen());
            let reached = trial.threshold_fold_increase(self.threshold);
            debug!(step, optimal, reached, "volume minimization step");

            if reached < self.required_fold_increase {
                if let Some((previous, trial)) = accepted {
                    return Ok((previous, floor, trial));
                }
                // The distribution average already fails under the cap; climb back up.
                optimal /= ratio;
                continue;
            }
            if accepted.is_none() && step > 0 {
                return Ok((optimal, floor, trial));
            }
            if optimal <= floor {
                return Ok((floor, floor, trial));
            }
            accepted = Some((optimal, trial));
            optimal = (optimal * ratio).max(floor);
        }
        Err(StemforgeError::Convergence(format!(
            "volume minimization did not settle within {} steps",
            self.settings.max_optimization_steps
        )))
    }
}

/// Fits the volume plan to what the allocated vessels can actually hold.
///
/// When a cycle's vessels need more volume than planned, the fold increase of
/// all earlier cycles is raised uniformly so that cycle lands on the required
/// volume, and allocation restarts from the first cycle.
pub fn reconcile_volumes(
    volumes_ml: &mut [f64],
    allocator: &VesselAllocator,
    max_passes: usize,
) -> Result<Vec<VesselAllocation>, StemforgeError> {
    let last = volumes_ml.len().saturating_sub(1);
    for pass in 0..max_passes.max(1) {
        let mut allocations = Vec::with_capacity(volumes_ml.len());
        let mut corrected = false;

        for cycle in 0..volumes_ml.len() {
            let allocation = allocator.allocate(volumes_ml[cycle], cycle == last)?;
            if allocation.needs_more_volume() {
                let required = allocation.required_volume_ml;
                if cycle > 0 {
                    let corrected_fold = (required / volumes_ml[0]).powf(1.0 / cycle as f64);
                    for i in 1..cycle {
                        volumes_ml[i] = volumes_ml[i - 1] * corrected_fold;
                    }
                }
                volumes_ml[cycle] = required;
                for i in cycle + 1..volumes_ml.len() {
                    volumes_ml[i] = volumes_ml[i].max(volumes_ml[i - 1]);
                }
                debug!(pass, cycle, required, "raising planned volumes to fit vessels");
                corrected = true;
                break;
            }
            allocations.push(allocation);
        }
        if !corrected {
            return Ok(allocations);
        }
    }
    Err(StemforgeError::Convergence(format!(
        "vessel allocation did not settle within {} passes",
        max_passes
    )))
}
