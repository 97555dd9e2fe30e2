//! Stochastic draws of fold expansion and recovery efficiency.
//!
//! Fold expansion is normal with the SEM-derived std. Recovery efficiency is
//! beta, fitted by matching moments to the measured average and a
//! down-scaled std. Without the down-scaling, the beta fitted to the raw
//! measurement piles its mass against 1.0.

use crate::error::StemforgeError;
use rand::{rngs::StdRng, Rng};
use rand_distr::{Beta, Distribution, Normal};
use stemforge_schemas::culture::CultureConditions;

/// Alpha and beta of the beta distribution with the given mean and std.
///
/// # Errors
///
/// Returns `StemforgeError::Distribution` when the mean is outside (0, 1) or
/// when `std >= sqrt(mean * (1 - mean))`, where no beta distribution exists.
pub fn beta_parameters(average: f64, std: f64) -> Result<(f64, f64), StemforgeError> {
    if !(average > 0.0 && average < 1.0) {
        return Err(StemforgeError::Distribution(format!(
            "beta mean must lie in (0, 1), got {}",
            average
        )));
    }
    if !(std > 0.0) {
        return Err(StemforgeError::Distribution(format!(
            "beta std must be positive, got {}",
            std
        )));
    }
    let variance_limit = average * (1.0 - average);
    if std * std >= variance_limit {
        return Err(StemforgeError::Distribution(format!(
            "std {} is too large for a beta distribution with mean {} (limit {:.4})",
            std,
            average,
            variance_limit.sqrt()
        )));
    }
    let precision = variance_limit / (std * std) - 1.0;
    Ok((average * precision, (1.0 - average) * precision))
}

/// Draws (fold expansion, recovery efficiency) pairs for one scenario.
#[derive(Debug, Clone)]
pub struct DistributionSampler {
    fold_expansion: Normal<f64>,
    recovery_efficiency: Beta<f64>,
    fold_expansion_average: f64,
    recovery_efficiency_average: f64,
}

impl DistributionSampler {
    /// Builds the sampler from resolved conditions. The recovery std is divided
    /// by `recovery_std_divisor` before the beta fit.
    pub fn new(
        conditions: &CultureConditions,
        recovery_std_divisor: f64,
    ) -> Result<Self, StemforgeError> {
        if !(recovery_std_divisor > 0.0) {
            return Err(StemforgeError::Configuration(format!(
                "recovery std divisor must be positive, got {}",
                recovery_std_divisor
            )));
        }
        if !(conditions.fold_increase_average > 0.0) {
            return Err(StemforgeError::Distribution(format!(
                "fold expansion average must be positive, got {}",
                conditions.fold_increase_average
            )));
        }
        let fold_expansion = Normal::new(conditions.fold_increase_average, conditions.fold_increase_std)
            .map_err(|e| StemforgeError::Distribution(format!("fold expansion: {}", e)))?;

        let (alpha, beta) = beta_parameters(
            conditions.recovery_efficiency_average,
            conditions.recovery_efficiency_std / recovery_std_divisor,
        )?;
        let recovery_efficiency = Beta::new(alpha, beta)
            .map_err(|e| StemforgeError::Distribution(format!("recovery efficiency: {}", e)))?;

        Ok(Self {
            fold_expansion,
            recovery_efficiency,
            fold_expansion_average: conditions.fold_increase_average,
            recovery_efficiency_average: conditions.recovery_efficiency_average,
        })
    }

    /// One (fold expansion, recovery efficiency) draw. Negative fold expansions
    /// from the normal tail are clamped to zero.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> (f64, f64) {
        let fold = self.fold_expansion.sample(rng).max(0.0);
        let recovery = self.recovery_efficiency.sample(rng);
        (fold, recovery)
    }

    /// Net growth of one cycle: fold expansion times recovery after harvest.
    pub fn cycle_factor<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let (fold, recovery) = self.draw(rng);
        fold * recovery
    }

    /// Product of the distribution averages, the optimizer's starting point.
    pub fn average_cycle_factor(&self) -> f64 {
        self.fold_expansion_average * self.recovery_efficiency_average
    }

    pub fn sample_set<R: Rng + ?Sized>(&self, rng: &mut R, runs: usize) -> SampleSet {
        let pairs = (0..runs).map(|_| self.draw(rng)).collect();
        SampleSet { pairs }
    }
}

/// Independently drawn (fold expansion, recovery efficiency) pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    pairs: Vec<(f64, f64)>,
}

impl SampleSet {
    /// Wraps pre-drawn pairs, for replaying a pipeline on fixed samples.
    pub fn from_pairs(pairs: Vec<(f64, f64)>) -> Result<Self, StemforgeError> {
        if pairs.is_empty() {
            return Err(StemforgeError::Configuration(
                "a sample set needs at least one pair".to_string(),
            ));
        }
        Ok(Self { pairs })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(f64, f64)] {
        &self.pairs
    }

    pub fn mean_fold_expansion(&self) -> f64 {
        mean(self.pairs.iter().map(|p| p.0))
    }

    pub fn mean_recovery_efficiency(&self) -> f64 {
        mean(self.pairs.iter().map(|p| p.1))
    }

    /// Fold expansion met or exceeded by a `threshold` share of the samples.
    pub fn min_fold_expansion(&self, threshold: f64) -> f64 {
        threshold_value(self.pairs.iter().map(|p| p.0).collect(), threshold)
    }

    pub fn min_recovery_efficiency(&self, threshold: f64) -> f64 {
        threshold_value(self.pairs.iter().map(|p| p.1).collect(), threshold)
    }

    /// Threshold lookup on the per-pair product of both draws.
    pub fn min_cycle_factor(&self, threshold: f64) -> f64 {
        threshold_value(self.pairs.iter().map(|p| p.0 * p.1).collect(), threshold)
    }
}

/// Per-cycle growth factors for the Monte Carlo runs.
pub trait CycleFactorSource: Sync {
    fn cycle_factor(&self, rng: &mut StdRng) -> f64;

    fn average_cycle_factor(&self) -> f64;
}

impl CycleFactorSource for DistributionSampler {
    fn cycle_factor(&self, rng: &mut StdRng) -> f64 {
        DistributionSampler::cycle_factor(self, rng)
    }

    fn average_cycle_factor(&self) -> f64 {
        DistributionSampler::average_cycle_factor(self)
    }
}

/// Replays injected samples: each cycle picks one stored pair at random.
impl CycleFactorSource for SampleSet {
    fn cycle_factor(&self, rng: &mut StdRng) -> f64 {
        let (fold, recovery) = self.pairs[rng.gen_range(0..self.pairs.len())];
        fold * recovery
    }

    fn average_cycle_factor(&self) -> f64 {
        self.mean_fold_expansion() * self.mean_recovery_efficiency()
    }
}

fn mean(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

/// Element at index `ceil(n * (1 - threshold))` of the ascending sort,
/// clamped to the last element.
fn threshold_value(mut values: Vec<f64>, threshold: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(f64::total_cmp);
    let index = (values.len() as f64 * (1.0 - threshold)).ceil() as usize;
    values[index.min(values.len() - 1)]
}

/// Linearly interpolated percentile (`q` in [0, 100]) of unsorted values.
pub fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_unstable_by(f64::total_cmp);
    let rank = (q / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    values[lower] + (values[upper] - values[lower]) * weight
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::resolve_conditions;
    use rand::SeedableRng;
    use stemforge_schemas::{culture::ScenarioConfig, reference::ReferenceData};

    fn conditions() -> CultureConditions {
        resolve_conditions(&ScenarioConfig::standard("test"), &ReferenceData::standard()).unwrap()
    }

    #[test]
    fn beta_moments_match_requested_mean_and_std() {
        let (alpha, beta) = beta_parameters(0.952, 0.08 / 3.0).unwrap();
        let mean = alpha / (alpha + beta);
        let variance = alpha * beta / ((alpha + beta).powi(2) * (alpha + beta + 1.0));
        assert!((mean - 0.952).abs() < 1e-12);
        assert!((variance.sqrt() - 0.08 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn oversized_std_is_a_distribution_error() {
        let limit = (0.952f64 * 0.048).sqrt();
        let err = beta_parameters(0.952, limit * 1.0001).unwrap_err();
        assert!(matches!(err, StemforgeError::Distribution(_)));
        assert!(beta_parameters(0.952, limit * 1.5).is_err());
        assert!(beta_parameters(1.0, 0.01).is_err());
    }

    #[test]
    fn sampler_rejects_recovery_spread_without_divisor() {
        let wide = conditions().with_recovery_efficiency(0.952, 0.25);
        let err = DistributionSampler::new(&wide, 1.0).unwrap_err();
        assert!(matches!(err, StemforgeError::Distribution(_)));
        assert!(DistributionSampler::new(&wide, 3.0).is_ok());
    }

    #[test]
    fn sample_means_approach_distribution_averages() {
        let sampler = DistributionSampler::new(&conditions(), 3.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let samples = sampler.sample_set(&mut rng, 50_000);
        assert_eq!(samples.len(), 50_000);
        assert!((samples.mean_fold_expansion() - 4.8).abs() < 0.02);
        assert!((samples.mean_recovery_efficiency() - 0.952).abs() < 0.002);
        assert!(samples.pairs().iter().all(|&(_, r)| (0.0..=1.0).contains(&r)));
    }

    #[test]
    fn threshold_lookup_uses_ceiling_index() {
        let pairs = (1..=10).map(|i| (i as f64, 0.5)).collect();
        let samples = SampleSet::from_pairs(pairs).unwrap();
        // ceil(10 * 0.05) = 1 -> second smallest
        assert_eq!(samples.min_fold_expansion(0.95), 2.0);
        assert_eq!(samples.min_fold_expansion(1.0), 1.0);
        assert_eq!(samples.min_cycle_factor(0.95), 1.0);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let mut values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&mut values, 0.0), 1.0);
        assert_eq!(percentile(&mut values, 100.0), 5.0);
        assert_eq!(percentile(&mut values, 50.0), 3.0);
        assert!((percentile(&mut values, 5.0) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn injected_samples_replay_stored_pairs() {
        let samples = SampleSet::from_pairs(vec![(4.0, 0.5), (6.0, 0.5)]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let factor = CycleFactorSource::cycle_factor(&samples, &mut rng);
            assert!(factor == 2.0 || factor == 3.0);
        }
        assert_eq!(CycleFactorSource::average_cycle_factor(&samples), 2.5);
    }

    #[test]
    fn empty_sample_set_is_rejected() {
        assert!(SampleSet::from_pairs(Vec::new()).is_err());
    }
}
