use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::{fs, path::Path};
use stemforge_schemas::{
    culture::{ScenarioConfig, StudyConfig},
    file_formats::{ReferenceFile, ScenarioFile, SettingsFile},
    reference::ReferenceData,
    standard::{standard_scenarios, standard_studies},
};
use tracing::info;

/// Schema versions this build can read.
const SUPPORTED_SCHEMA: &str = "1";

/// Everything a run reads before it starts: the catalog, the named scenarios
/// and studies, and the tunables.
pub struct Inputs {
    pub reference: ReferenceData,
    pub scenarios: Vec<ScenarioConfig>,
    pub studies: Vec<StudyConfig>,
    pub settings: SettingsFile,
}

impl Inputs {
    /// Loads each part from its YAML file when one is given, falling back to
    /// the built-in catalog, presets and defaults otherwise.
    pub fn load(
        reference: Option<&Path>,
        scenarios: Option<&Path>,
        settings: Option<&Path>,
    ) -> Result<Self> {
        let reference = match reference {
            Some(path) => {
                let file: ReferenceFile = load_yaml(path)?;
                check_schema(&file.schema_version, path)?;
                file.reference
            }
            None => ReferenceData::standard(),
        };

        let (scenarios, studies) = match scenarios {
            Some(path) => {
                let file: ScenarioFile = load_yaml(path)?;
                check_schema(&file.schema_version, path)?;
                (file.scenarios, file.studies)
            }
            None => (standard_scenarios(), standard_studies()),
        };

        let settings = match settings {
            Some(path) => {
                let file: SettingsFile = load_yaml(path)?;
                check_schema(&file.schema_version, path)?;
                file
            }
            None => SettingsFile::default(),
        };

        info!(
            scenarios = scenarios.len(),
            studies = studies.len(),
            vessels = reference.vessels.len(),
            "inputs loaded"
        );
        Ok(Self {
            reference,
            scenarios,
            studies,
            settings,
        })
    }

    pub fn scenario(&self, name: &str) -> Result<&ScenarioConfig> {
        self.scenarios
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .with_context(|| {
                format!(
                    "Unknown scenario '{}'. Available: {}",
                    name,
                    self.scenarios.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
                )
            })
    }

    pub fn study(&self, name: &str) -> Result<&StudyConfig> {
        self.studies
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .with_context(|| {
                format!(
                    "Unknown study '{}'. Available: {}",
                    name,
                    self.studies.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
                )
            })
    }
}

fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Failed to parse YAML from {:?}", path))
}

fn check_schema(version: &str, path: &Path) -> Result<()> {
    if version != SUPPORTED_SCHEMA {
        bail!(
            "{:?} has schema version '{}', expected '{}'",
            path,
            version,
            SUPPORTED_SCHEMA
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_use_the_standard_catalog() {
        let inputs = Inputs::load(None, None, None).unwrap();
        assert_eq!(inputs.reference, ReferenceData::standard());
        assert!(inputs.scenario("default").is_ok());
        assert!(inputs.study("b8").is_ok());
        assert_eq!(inputs.settings.simulation.simulation_runs, 100_000);
    }

    #[test]
    fn partial_settings_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "settings.yaml",
            "schema_version: \"1\"\nsimulation:\n  simulation_runs: 500\n  seed: 4\n",
        );
        let inputs = Inputs::load(None, None, Some(&path)).unwrap();
        assert_eq!(inputs.settings.simulation.simulation_runs, 500);
        assert_eq!(inputs.settings.simulation.seed, Some(4));
        assert_eq!(inputs.settings.simulation.max_cycles, 30);
        assert_eq!(inputs.settings.allocation.volume_increment_ml, 1.0);
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "settings.yaml", "schema_version: \"9\"\n");
        let err = Inputs::load(None, None, Some(&path)).err().map(|e| e.to_string());
        assert!(err.is_some_and(|e| e.contains("schema version '9'")));
    }

    #[test]
    fn shipped_data_files_match_the_builtin_catalog() {
        let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
        let inputs = Inputs::load(
            Some(&data.join("reference.yaml")),
            Some(&data.join("scenarios.yaml")),
            Some(&data.join("settings.yaml")),
        )
        .unwrap();
        assert_eq!(inputs.reference, ReferenceData::standard());
        assert_eq!(inputs.scenarios, standard_scenarios());
        assert_eq!(inputs.studies, standard_studies());
        let defaults = SettingsFile::default();
        assert_eq!(inputs.settings.simulation, defaults.simulation);
        assert_eq!(inputs.settings.allocation, defaults.allocation);
        assert_eq!(inputs.settings.process, defaults.process);
    }

    #[test]
    fn unknown_scenario_lists_the_available_ones() {
        let inputs = Inputs::load(None, None, None).unwrap();
        let err = inputs.scenario("nope").unwrap_err().to_string();
        assert!(err.starts_with("Unknown scenario 'nope'"));
        assert!(err.contains("Default"));
    }
}
