//! Side-by-side evaluation of several scenarios against one catalog.

use crate::{analysis::BioprocessResult, error::StemforgeError, simulation::builder::BioprocessBuilder};
use rayon::prelude::*;
use std::sync::Arc;
use stemforge_schemas::{
    culture::{ScenarioConfig, StudyConfig},
    reference::ReferenceData,
    settings::{AllocationPolicy, ProcessSettings, SimulationSettings},
};
use tracing::{info, warn};

/// One scenario's result. A failed scenario keeps its error and does not
/// stop the others.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub name: String,
    pub result: Result<BioprocessResult, StemforgeError>,
}

impl ScenarioOutcome {
    pub fn succeeded(&self) -> Option<&BioprocessResult> {
        self.result.as_ref().ok()
    }
}

pub struct ComparisonStudy {
    pub name: String,
    pub scenarios: Vec<ScenarioConfig>,
    reference: Arc<ReferenceData>,
    settings: SimulationSettings,
    allocation: AllocationPolicy,
    process: ProcessSettings,
}

impl ComparisonStudy {
    pub fn new(study: &StudyConfig, reference: impl Into<Arc<ReferenceData>>) -> Self {
        Self {
            name: study.name.clone(),
            scenarios: study.scenarios.clone(),
            reference: reference.into(),
            settings: SimulationSettings::default(),
            allocation: AllocationPolicy::default(),
            process: ProcessSettings::default(),
        }
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

    /// Runs every scenario in parallel. Scenario `i` is seeded with
    /// `seed + i` when a seed is set; outcomes keep the scenario order.
    pub fn run(&self) -> Vec<ScenarioOutcome> {
        info!(study = %self.name, scenarios = self.scenarios.len(), "running comparison study");
        self.scenarios
            .par_iter()
            .enumerate()
            .map(|(index, scenario)| {
                let outcome = ScenarioOutcome {
                    name: scenario.name.clone(),
                    result: self.run_scenario(index, scenario),
                };
                if let Err(err) = &outcome.result {
                    warn!(study = %self.name, scenario = %outcome.name, error = %err, "scenario failed");
                }
                outcome
            })
            .collect()
    }

    fn run_scenario(
        &self,
        index: usize,
        scenario: &ScenarioConfig,
    ) -> Result<BioprocessResult, StemforgeError> {
        let settings = SimulationSettings {
            seed: self.settings.seed.map(|seed| seed.wrapping_add(index as u64)),
            ..self.settings.clone()
        };
        BioprocessBuilder::new()
            .with_reference(Arc::clone(&self.reference))
            .with_scenario(scenario.clone())
            .with_settings(settings)
            .with_allocation_policy(self.allocation.clone())
            .with_process_settings(self.process.clone())
            .build()?
            .execute()
    }
}
