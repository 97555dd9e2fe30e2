use crate::error::StemforgeError;
use stemforge_schemas::{
    culture::{CultureConditions, ScenarioConfig},
    reference::ReferenceData,
};

/// Converts a standard error of the mean into a standard deviation.
pub fn sem_to_std(sem: f64, sample_size: u32) -> f64 {
    sem * (sample_size as f64).sqrt()
}

/// Resolves a requested scenario against the catalog.
///
/// # Errors
///
/// Returns `StemforgeError::Configuration` for out-of-range parameters or a
/// protocol combination the catalog has no measurements for, and
/// `StemforgeError::UnknownReference` when the medium or a profile is missing.
pub fn resolve_conditions(
    scenario: &ScenarioConfig,
    reference: &ReferenceData,
) -> Result<CultureConditions, StemforgeError> {
    if !(scenario.minimum_threshold > 0.0 && scenario.minimum_threshold <= 1.0) {
        return Err(StemforgeError::Configuration(format!(
            "threshold must be in (0, 1], got {}",
            scenario.minimum_threshold
        )));
    }

    let profile = reference
        .expansion_profile(scenario.simulation_source, scenario.ds_supplementation)
        .ok_or_else(|| {
            if scenario.ds_supplementation {
                StemforgeError::Configuration(format!(
                    "no supplemented expansion data for {}",
                    scenario.simulation_source
                ))
            } else {
                StemforgeError::unknown("expansion profile", scenario.simulation_source)
            }
        })?;
    let recovery = reference
        .recovery_profile(&profile.recovery_profile)
        .ok_or_else(|| StemforgeError::unknown("recovery profile", &profile.recovery_profile))?;
    reference
        .reagent_price(scenario.culture_medium.reagent())
        .ok_or_else(|| StemforgeError::unknown("culture medium", scenario.culture_medium))?;

    let efficacy = scenario.efficacy.unwrap_or(1.0);
    if efficacy <= 0.0 {
        return Err(StemforgeError::Configuration(format!(
            "efficacy must be positive, got {}",
            efficacy
        )));
    }

    let conditions = CultureConditions {
        initial_cell_number: scenario.initial_cell_number,
        target_cell_number: scenario.target_cell_number,
        culture_medium: scenario.culture_medium,
        supplements: profile.supplements.clone(),
        initial_volume_ml: scenario.initial_volume_ml,
        seeding_density: profile.seeding_density,
        fold_increase_average: profile.fold_expansion_average * efficacy,
        fold_increase_std: sem_to_std(profile.fold_expansion_sem * efficacy, profile.sample_size),
        recovery_efficiency_average: recovery.recovery_efficiency_average,
        recovery_efficiency_std: sem_to_std(recovery.recovery_efficiency_sem, recovery.sample_size),
        threshold: scenario.minimum_threshold,
        failure_probability: scenario.failure_probability,
        qc_detection_probability: scenario.qc_detection_probability,
        culture_days: scenario.culture_days.unwrap_or(profile.culture_days),
        medium_exchanges: scenario.medium_exchanges.unwrap_or(profile.medium_exchanges),
        exchange_fraction: profile.exchange_fraction,
    };
    validate_conditions(&conditions)?;
    Ok(conditions)
}

/// Checks the ranges every pipeline stage relies on.
pub fn validate_conditions(conditions: &CultureConditions) -> Result<(), StemforgeError> {
    let fail = |msg: String| Err(StemforgeError::Configuration(msg));

    if !(conditions.threshold > 0.0 && conditions.threshold <= 1.0) {
        return fail(format!("threshold must be in (0, 1], got {}", conditions.threshold));
    }
    if !(0.0..1.0).contains(&conditions.failure_probability) {
        return fail(format!(
            "failure probability must be in [0, 1), got {}",
            conditions.failure_probability
        ));
    }
    if !(0.0..=1.0).contains(&conditions.qc_detection_probability) {
        return fail(format!(
            "QC detection probability must be in [0, 1], got {}",
            conditions.qc_detection_probability
        ));
    }
    if conditions.initial_cell_number == 0 {
        return fail("initial cell number must be positive".to_string());
    }
    if conditions.target_cell_number < conditions.initial_cell_number {
        return fail(format!(
            "target cell number {} is below the initial cell number {}",
            conditions.target_cell_number, conditions.initial_cell_number
        ));
    }
    if !(conditions.initial_volume_ml > 0.0) {
        return fail(format!("initial volume must be positive, got {}", conditions.initial_volume_ml));
    }
    if !(conditions.seeding_density > 0.0) {
        return fail(format!("seeding density must be positive, got {}", conditions.seeding_density));
    }
    if conditions.culture_days == 0 {
        return fail("expansion cycles must last at least one day".to_string());
    }
    if !(0.0..=1.0).contains(&conditions.exchange_fraction) {
        return fail(format!(
            "medium exchange fraction must be in [0, 1], got {}",
            conditions.exchange_fraction
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemforge_schemas::kinds::SimulationSource;

    fn scenario() -> ScenarioConfig {
        ScenarioConfig::standard("test")
    }

    #[test]
    fn default_scenario_resolves_to_published_values() {
        let conditions = resolve_conditions(&scenario(), &ReferenceData::standard()).unwrap();
        assert_eq!(conditions.seeding_density, 250_000.0);
        assert!((conditions.fold_increase_std - 0.5 * 3f64.sqrt()).abs() < 1e-12);
        assert!((conditions.recovery_efficiency_std - 0.08).abs() < 1e-12);
        assert_eq!(conditions.inoculation_cell_number(), 1.5e7);
        assert!((conditions.volumes_spent() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn efficacy_scales_fold_expansion() {
        let boosted = ScenarioConfig {
            efficacy: Some(1.5),
            ..scenario()
        };
        let conditions = resolve_conditions(&boosted, &ReferenceData::standard()).unwrap();
        assert!((conditions.fold_increase_average - 7.2).abs() < 1e-12);
        assert!((conditions.fold_increase_std - 0.75 * 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        for threshold in [0.0, -0.1, 1.01] {
            let bad = ScenarioConfig {
                minimum_threshold: threshold,
                ..scenario()
            };
            let err = resolve_conditions(&bad, &ReferenceData::standard()).unwrap_err();
            assert!(err.is_configuration(), "{threshold}: {err}");
        }
    }

    #[test]
    fn low_density_with_dextran_sulfate_is_rejected() {
        let bad = ScenarioConfig {
            simulation_source: SimulationSource::Borys2021,
            ds_supplementation: true,
            ..scenario()
        };
        let err = resolve_conditions(&bad, &ReferenceData::standard()).unwrap_err();
        assert!(matches!(err, StemforgeError::Configuration(_)));
    }

    #[test]
    fn missing_medium_price_is_an_unknown_reference() {
        let mut reference = ReferenceData::standard();
        reference.reagents.retain(|r| r.reagent != scenario().culture_medium.reagent());
        let err = resolve_conditions(&scenario(), &reference).unwrap_err();
        assert!(matches!(err, StemforgeError::UnknownReference { kind: "culture medium", .. }));
    }

    #[test]
    fn certain_failure_is_rejected() {
        let bad = ScenarioConfig {
            failure_probability: 1.0,
            ..scenario()
        };
        assert!(resolve_conditions(&bad, &ReferenceData::standard()).is_err());
    }
}
