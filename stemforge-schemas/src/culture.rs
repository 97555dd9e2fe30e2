use crate::kinds::{CultureMedium, ReagentKind, SimulationSource};
use serde::{Deserialize, Serialize};

fn default_failure_probability() -> f64 {
    0.1
}

fn default_qc_detection_probability() -> f64 {
    0.2
}

/// A scenario as requested by a user or a comparison study.
///
/// This is the unvalidated record. It only becomes usable once it has been
/// resolved against a reference catalog into [`CultureConditions`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub initial_cell_number: u64,
    pub target_cell_number: u64,
    pub culture_medium: CultureMedium,
    pub initial_volume_ml: f64,
    pub simulation_source: SimulationSource,
    #[serde(default)]
    pub ds_supplementation: bool,
    /// Required probability of reaching the target, in (0, 1].
    pub minimum_threshold: f64,
    #[serde(default = "default_failure_probability")]
    pub failure_probability: f64,
    #[serde(default = "default_qc_detection_probability")]
    pub qc_detection_probability: f64,
    /// Multiplier on the published fold expansion, used to model media
    /// formulations of different strength.
    #[serde(default)]
    pub efficacy: Option<f64>,
    #[serde(default)]
    pub culture_days: Option<u32>,
    #[serde(default)]
    pub medium_exchanges: Option<u32>,
}

/// Fully resolved culture parameters for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CultureConditions {
    pub initial_cell_number: u64,
    pub target_cell_number: u64,
    pub culture_medium: CultureMedium,
    pub supplements: Vec<ReagentKind>,
    pub initial_volume_ml: f64,
    pub seeding_density: f64,
    pub fold_increase_average: f64,
    pub fold_increase_std: f64,
    pub recovery_efficiency_average: f64,
    pub recovery_efficiency_std: f64,
    pub threshold: f64,
    pub failure_probability: f64,
    pub qc_detection_probability: f64,
    pub culture_days: u32,
    pub medium_exchanges: u32,
    pub exchange_fraction: f64,
}

impl CultureConditions {
    /// Cells placed in the first bioreactor cycle.
    pub fn inoculation_cell_number(&self) -> f64 {
        (self.seeding_density * self.initial_volume_ml).ceil()
    }

    /// Fold increase the bioreactor cycles must deliver between them.
    pub fn required_fold_increase(&self) -> f64 {
        self.target_cell_number as f64 / self.inoculation_cell_number()
    }

    /// Working volumes of medium consumed over one expansion cycle,
    /// counting the initial fill.
    pub fn volumes_spent(&self) -> f64 {
        1.0 + self.medium_exchanges as f64 * self.exchange_fraction
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_target_cell_number(mut self, target: u64) -> Self {
        self.target_cell_number = target;
        self
    }

    pub fn with_initial_volume(mut self, volume_ml: f64) -> Self {
        self.initial_volume_ml = volume_ml;
        self
    }

    pub fn with_seeding_density(mut self, density: f64) -> Self {
        self.seeding_density = density;
        self
    }

    pub fn with_fold_increase(mut self, average: f64, std: f64) -> Self {
        self.fold_increase_average = average;
        self.fold_increase_std = std;
        self
    }

    pub fn with_recovery_efficiency(mut self, average: f64, std: f64) -> Self {
        self.recovery_efficiency_average = average;
        self.recovery_efficiency_std = std;
        self
    }

    pub fn with_failure_model(mut self, failure_probability: f64, qc_detection_probability: f64) -> Self {
        self.failure_probability = failure_probability;
        self.qc_detection_probability = qc_detection_probability;
        self
    }
}

/// A named group of scenarios evaluated side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    pub name: String,
    pub description: Option<String>,
    pub scenarios: Vec<ScenarioConfig>,
}
