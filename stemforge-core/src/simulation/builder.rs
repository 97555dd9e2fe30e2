use crate::{
    allocation::VesselAllocator,
    conditions::{resolve_conditions, validate_conditions},
    error::StemforgeError,
    rates::FacilityRates,
    sampling::{DistributionSampler, SampleSet},
    simulation::{
        engine::BioprocessEngine,
        state::{PipelineData, PipelineState},
    },
};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use tracing::info;
use stemforge_schemas::{
    culture::{CultureConditions, ScenarioConfig},
    reference::ReferenceData,
    settings::{AllocationPolicy, ProcessSettings, SimulationSettings},
};

/// A fluent builder for constructing a `BioprocessEngine`.
///
/// Conditions come either resolved (`with_conditions`) or as a scenario that
/// is resolved against the reference catalog at build time. Explicit
/// conditions win when both are given.
#[derive(Default)]
pub struct BioprocessBuilder {
    reference: Option<Arc<ReferenceData>>,
    scenario: Option<ScenarioConfig>,
    conditions: Option<CultureConditions>,
    settings: SimulationSettings,
    allocation: AllocationPolicy,
    process: ProcessSettings,
    samples: Option<SampleSet>,
    label: Option<String>,
}

impl BioprocessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the catalog every price and vessel lookup goes through.
    pub fn with_reference(mut self, reference: impl Into<Arc<ReferenceData>>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_scenario(mut self, scenario: ScenarioConfig) -> Self {
        self.label.get_or_insert_with(|| scenario.name.clone());
        self.scenario = Some(scenario);
        self
    }

    pub fn with_conditions(mut self, conditions: CultureConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn with_settings(mut self, settings: SimulationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_allocation_policy(mut self, policy: AllocationPolicy) -> Self {
        self.allocation = policy;
        self
    }

    pub fn with_process_settings(mut self, process: ProcessSettings) -> Self {
        self.process = process;
        self
    }

    /// Replaces live distribution draws with a fixed set of samples. Without a
    /// seed the pipeline is then seeded with 0 so reruns are identical.
    pub fn with_samples(mut self, samples: SampleSet) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.settings.seed = Some(seed);
        self
    }

    /// Name used in log events. Defaults to the scenario name.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Consumes the builder and returns an engine in the `Configured` state.
    ///
    /// # Errors
    ///
    /// Returns `StemforgeError::Configuration` when no reference data or
    /// conditions were provided or a setting is out of range,
    /// `StemforgeError::UnknownReference` when the scenario or process names
    /// something the catalog lacks, and `StemforgeError::Distribution` when the
    /// culture parameters cannot be fitted.
    pub fn build(self) -> Result<BioprocessEngine, StemforgeError> {
        let reference = self.reference.ok_or_else(|| {
            StemforgeError::Configuration("no reference data provided".to_string())
        })?;
        let mut conditions = match (self.conditions, &self.scenario) {
            (Some(conditions), _) => conditions,
            (None, Some(scenario)) => resolve_conditions(scenario, &reference)?,
            (None, None) => {
                return Err(StemforgeError::Configuration(
                    "no scenario or culture conditions provided".to_string(),
                ))
            }
        };
        validate_conditions(&conditions)?;
        validate_settings(&self.settings)?;

        let sampler = DistributionSampler::new(&conditions, self.settings.recovery_std_divisor)?;
        let allocator = VesselAllocator::new(&reference, &self.process.vessels, &self.allocation)?;
        let largest = allocator.largest_vessel_ml();
        if largest < self.settings.min_final_volume_ml {
            return Err(StemforgeError::Configuration(format!(
                "the largest vessel holds {} mL, below the final-volume floor of {} mL",
                largest, self.settings.min_final_volume_ml
            )));
        }
        if let Some(capacity) = allocator.max_capacity_ml() {
            if capacity < self.settings.min_final_volume_ml {
                return Err(StemforgeError::Configuration(format!(
                    "capped vessel stock holds {} mL, below the final-volume floor of {} mL",
                    capacity, self.settings.min_final_volume_ml
                )));
            }
        }
        // The first cycle runs at a volume its vessels can hold; the required
        // fold increase and the inoculated cells both follow from it.
        let first = allocator.allocate(conditions.initial_volume_ml, false)?;
        if first.needs_more_volume() {
            info!(
                requested_ml = conditions.initial_volume_ml,
                used_ml = first.required_volume_ml,
                "initial volume raised to fit the first vessels"
            );
            conditions = conditions.with_initial_volume(first.required_volume_ml);
        }
        let rates = FacilityRates::from_reference(&reference)?;

        let injected_samples = self.samples.is_some();
        let rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None if injected_samples => StdRng::seed_from_u64(0),
            None => StdRng::from_entropy(),
        };

        Ok(BioprocessEngine {
            label: self.label.unwrap_or_else(|| "scenario".to_string()),
            state: PipelineState::Configured,
            reference,
            conditions,
            settings: self.settings,
            process: self.process,
            allocator,
            rates,
            sampler,
            injected_samples,
            rng,
            data: PipelineData {
                samples: self.samples,
                ..PipelineData::default()
            },
        })
    }
}

fn validate_settings(settings: &SimulationSettings) -> Result<(), StemforgeError> {
    if settings.simulation_runs == 0 || settings.batch_size == 0 {
        return Err(StemforgeError::Configuration(
            "simulation runs and batch size must be positive".to_string(),
        ));
    }
    if settings.max_cycles == 0 || settings.max_optimization_steps == 0 {
        return Err(StemforgeError::Configuration(
            "cycle and optimization step limits must be positive".to_string(),
        ));
    }
    if !(settings.min_final_volume_ml > 0.0) {
        return Err(StemforgeError::Configuration(format!(
            "final-volume floor must be positive, got {}",
            settings.min_final_volume_ml
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_reference_is_a_configuration_error() {
        let err = BioprocessBuilder::new()
            .with_scenario(ScenarioConfig::standard("Default"))
            .build()
            .err();
        assert!(err.is_some_and(|e| e.is_configuration()));
    }

    #[test]
    fn missing_conditions_is_a_configuration_error() {
        let err = BioprocessBuilder::new()
            .with_reference(ReferenceData::standard())
            .build()
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some("Configuration error: no scenario or culture conditions provided")
        );
    }

    #[test]
    fn builds_in_configured_state() {
        let engine = BioprocessBuilder::new()
            .with_reference(ReferenceData::standard())
            .with_scenario(ScenarioConfig::standard("Default"))
            .with_seed(7)
            .build()
            .unwrap();
        assert_eq!(engine.state(), PipelineState::Configured);
        assert!(engine.result().is_none());
    }

    #[test]
    fn final_floor_beyond_largest_vessel_is_rejected() {
        let settings = SimulationSettings {
            min_final_volume_ml: 1e9,
            ..SimulationSettings::default()
        };
        let err = BioprocessBuilder::new()
            .with_reference(ReferenceData::standard())
            .with_scenario(ScenarioConfig::standard("Default"))
            .with_settings(settings)
            .build()
            .err();
        assert!(err.is_some_and(|e| e.is_configuration()));
    }

    #[test]
    fn initial_volume_below_smallest_vessel_is_raised() {
        let engine = BioprocessBuilder::new()
            .with_reference(ReferenceData::standard())
            .with_scenario(ScenarioConfig {
                initial_volume_ml: 50.0,
                ..ScenarioConfig::standard("Small")
            })
            .with_seed(2)
            .build()
            .unwrap();
        let conditions = engine.conditions();
        assert_eq!(conditions.initial_volume_ml, 60.0);
        assert_eq!(conditions.inoculation_cell_number(), 15_000_000.0);
        assert!((conditions.required_fold_increase() - 2e9 / 1.5e7).abs() < 1e-9);
    }

    #[test]
    fn final_floor_up_to_largest_vessel_is_accepted() {
        let settings = SimulationSettings {
            min_final_volume_ml: 3_000.0,
            ..SimulationSettings::default()
        };
        let engine = BioprocessBuilder::new()
            .with_reference(ReferenceData::standard())
            .with_scenario(ScenarioConfig::standard("Default"))
            .with_settings(settings.clone())
            .build();
        assert!(engine.is_ok());

        let err = BioprocessBuilder::new()
            .with_reference(ReferenceData::standard())
            .with_scenario(ScenarioConfig::standard("Default"))
            .with_settings(SimulationSettings {
                min_final_volume_ml: 3_001.0,
                ..settings
            })
            .build()
            .err()
            .map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("largest vessel holds 3000 mL")));
    }
}
