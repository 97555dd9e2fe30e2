use rand::{rngs::StdRng, SeedableRng};
use stemforge_core::{
    conditions::resolve_conditions,
    sampling::{DistributionSampler, SampleSet},
    stages::StageKind,
    BioprocessBuilder, BioprocessResult, ComparisonStudy, PipelineState, StemforgeError,
};
use stemforge_schemas::{
    culture::{CultureConditions, ScenarioConfig, StudyConfig},
    reference::ReferenceData,
    settings::{ProcessSettings, SimulationSettings},
};

fn settings(seed: u64) -> SimulationSettings {
    SimulationSettings {
        simulation_runs: 10_000,
        batch_size: 2_048,
        seed: Some(seed),
        ..SimulationSettings::default()
    }
}

fn default_conditions() -> CultureConditions {
    resolve_conditions(&ScenarioConfig::standard("Default"), &ReferenceData::standard()).unwrap()
}

fn run(builder: BioprocessBuilder) -> Result<BioprocessResult, StemforgeError> {
    builder.with_reference(ReferenceData::standard()).build()?.execute()
}

#[test]
fn seeded_pipeline_is_reproducible() {
    let first = run(BioprocessBuilder::new()
        .with_scenario(ScenarioConfig::standard("Default"))
        .with_settings(settings(42)))
    .unwrap();
    let second = run(BioprocessBuilder::new()
        .with_scenario(ScenarioConfig::standard("Default"))
        .with_settings(settings(42)))
    .unwrap();

    assert_eq!(first, second);
    assert_eq!(first.cycle_count(), 4);
}

#[test]
fn cycle_count_is_stable_across_seeds() {
    let cycle_counts: Vec<usize> = [0, 7_919, 15_838, 23_757, 31_676]
        .into_iter()
        .map(|seed| {
            run(BioprocessBuilder::new()
                .with_scenario(ScenarioConfig::standard("Default"))
                .with_settings(SimulationSettings {
                    simulation_runs: 100_000,
                    ..SimulationSettings::default()
                })
                .with_seed(seed))
            .unwrap()
            .cycle_count()
        })
        .collect();
    assert!(cycle_counts.iter().all(|&count| count == cycle_counts[0]), "{cycle_counts:?}");
}

#[test]
fn totals_agree_with_cycle_records() {
    let result = run(BioprocessBuilder::new()
        .with_scenario(ScenarioConfig::standard("Default"))
        .with_settings(settings(3)))
    .unwrap();

    assert_eq!(result.cycles.len(), result.cycle_count() + 1);
    assert_eq!(result.cycles[0].label, "2D");
    assert_eq!(result.cycles.last().unwrap().label, format!("C{}", result.cycle_count()));

    let summed: f64 = result.cycles.iter().map(|c| c.total_cost()).sum();
    assert!((result.totals.total_cost - summed).abs() < 1e-6 * summed);
    assert!((result.totals.stages.total() - result.totals.total_cost).abs() < 1e-6 * summed);
    assert!((result.failure.stages.total() - result.failure.total_cost).abs() < 1e-6 * summed);
    assert!(result.failure.failure_cost > 0.0);
    assert!(result.total_cost() > result.totals.total_cost);
    assert!(result.cost_per_million_cells() > 0.0);

    let caught: f64 = result.failure.detection_probabilities.iter().sum();
    assert!((caught - 0.1).abs() < 1e-12);
    assert!(result.success_probability > 0.0 && result.success_probability <= 1.0);
}

#[test]
fn allocations_cover_planned_volumes() {
    let result = run(BioprocessBuilder::new()
        .with_scenario(ScenarioConfig::standard("Default"))
        .with_settings(settings(5)))
    .unwrap();

    let volumes = &result.plan.volumes_ml;
    assert!(volumes.windows(2).all(|w| w[1] >= w[0]));
    assert!(*volumes.last().unwrap() >= 1_800.0 - 1e-6);
    for (cycle, volume) in result.cycles[1..].iter().zip(volumes) {
        let allocation = cycle.allocation.as_ref().unwrap();
        assert!(allocation.volume_ml() >= volume * (1.0 - 1e-9));
        assert!(!allocation.needs_more_volume());
    }
}

#[test]
fn unit_fold_increase_runs_one_cycle() {
    let conditions = default_conditions();
    let cells = conditions.inoculation_cell_number() as u64;
    let result = run(BioprocessBuilder::new()
        .with_conditions(conditions.with_target_cell_number(cells))
        .with_settings(settings(9)))
    .unwrap();

    assert_eq!(result.cycle_count(), 1);
    assert_eq!(result.plan.volumes_ml, vec![60.0]);
    assert_eq!(result.cycles.len(), 2);
    assert_eq!(result.failure.detection_probabilities.len(), 2);
}

#[test]
fn full_confidence_threshold_is_deterministic() {
    let outcome = || {
        run(BioprocessBuilder::new()
            .with_conditions(default_conditions().with_threshold(1.0))
            .with_settings(SimulationSettings {
                simulation_runs: 2_000,
                max_cycles: 8,
                ..settings(17)
            }))
        .map(|r| (r.cycle_count(), r.plan.volumes_ml))
        .map_err(|e| e.to_string())
    };
    assert_eq!(outcome(), outcome());
}

#[test]
fn injected_samples_rerun_identically() {
    let conditions = default_conditions();
    let sampler = DistributionSampler::new(&conditions, 3.0).unwrap();
    let samples: SampleSet = sampler.sample_set(&mut StdRng::seed_from_u64(1), 5_000);
    let settings = SimulationSettings {
        seed: None,
        ..settings(0)
    };

    let first = run(BioprocessBuilder::new()
        .with_conditions(conditions.clone())
        .with_settings(settings.clone())
        .with_samples(samples.clone()))
    .unwrap();
    let second = run(BioprocessBuilder::new()
        .with_conditions(conditions)
        .with_settings(settings)
        .with_samples(samples))
    .unwrap();
    assert_eq!(first, second);
}

#[test]
fn engine_steps_through_every_state() {
    let mut engine = BioprocessBuilder::new()
        .with_reference(ReferenceData::standard())
        .with_scenario(ScenarioConfig::standard("Default"))
        .with_settings(settings(21))
        .build()
        .unwrap();

    let mut visited = vec![engine.state()];
    while engine.advance().unwrap() {
        visited.push(engine.state());
    }
    assert_eq!(visited.first(), Some(&PipelineState::Configured));
    assert_eq!(visited.len(), 8);
    assert!(engine.state().is_final());
    assert!(engine.result().is_some());
    assert!(!engine.advance().unwrap());
}

#[test]
fn failed_scenario_does_not_stop_a_study() {
    let study = StudyConfig {
        name: "mixed".to_string(),
        description: None,
        scenarios: vec![
            ScenarioConfig::standard("Default"),
            ScenarioConfig {
                minimum_threshold: 0.0,
                ..ScenarioConfig::standard("Broken")
            },
            ScenarioConfig {
                ds_supplementation: true,
                ..ScenarioConfig::standard("DS Supplementation")
            },
        ],
    };
    let outcomes = ComparisonStudy::new(&study, ReferenceData::standard())
        .with_settings(settings(8))
        .run();

    let names: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["Default", "Broken", "DS Supplementation"]);
    assert!(outcomes[0].succeeded().is_some());
    assert!(outcomes[1].result.as_ref().is_err_and(|e| e.is_configuration()));
    assert!(outcomes[2].succeeded().is_some());
}

#[test]
fn result_serializes_with_every_cycle() {
    let result = run(BioprocessBuilder::new()
        .with_scenario(ScenarioConfig::standard("Default"))
        .with_settings(settings(11)))
    .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["cycles"].as_array().map(Vec::len), Some(result.cycles.len()));
    assert_eq!(json["success_probability"].as_f64(), Some(result.success_probability));
}

fn intermediate_qc_cost(result: &BioprocessResult) -> f64 {
    result
        .cycles
        .iter()
        .flat_map(|c| &c.records)
        .filter(|r| r.stage == StageKind::IntermediateQualityControl)
        .map(|r| r.total_cost())
        .sum()
}

#[test]
fn undetectable_qc_drops_intermediate_checks() {
    let blind = ScenarioConfig {
        qc_detection_probability: 0.0,
        ..ScenarioConfig::standard("Blind")
    };
    let charged = run(BioprocessBuilder::new()
        .with_scenario(blind.clone())
        .with_settings(settings(13))
        .with_process_settings(ProcessSettings {
            skip_undetectable_qc: false,
            ..ProcessSettings::default()
        }))
    .unwrap();
    let skipped = run(BioprocessBuilder::new()
        .with_scenario(blind)
        .with_settings(settings(13)))
    .unwrap();

    let removed = intermediate_qc_cost(&charged);
    assert!(removed > 0.0);
    assert_eq!(intermediate_qc_cost(&skipped), 0.0);
    assert_eq!(skipped.plan, charged.plan);
    let saved = charged.totals.stages.quality_control - skipped.totals.stages.quality_control;
    assert!((saved - removed).abs() < 1e-6 * removed);
    assert!(skipped.total_cost() < charged.total_cost());
}

#[test]
fn raised_initial_volume_drives_plan_and_cell_counts() {
    let result = run(BioprocessBuilder::new()
        .with_scenario(ScenarioConfig {
            initial_volume_ml: 50.0,
            ..ScenarioConfig::standard("Small")
        })
        .with_settings(settings(4)))
    .unwrap();

    assert_eq!(result.conditions.initial_volume_ml, 60.0);
    assert_eq!(result.plan.volumes_ml[0], 60.0);
    assert_eq!(result.plan.required_fold_increase, result.conditions.required_fold_increase());
    let first = &result.plan.final_fold_increases[0];
    assert_eq!(result.final_cell_distribution[0], first * 15_000_000.0);
}
