use crate::{
    culture::{ScenarioConfig, StudyConfig},
    reference::ReferenceData,
    settings::{AllocationPolicy, ProcessSettings, SimulationSettings},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ReferenceFile {
    pub schema_version: String,
    pub reference: ReferenceData,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub schema_version: String,
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default)]
    pub studies: Vec<StudyConfig>,
}

/// Every tunable of a run in one document. Missing sections fall back to defaults.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    pub schema_version: String,
    #[serde(default)]
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub allocation: AllocationPolicy,
    #[serde(default)]
    pub process: ProcessSettings,
}
