use crate::config::Inputs;
use crate::export;
use crate::plotting;
use anyhow::{Context, Result};
use std::path::Path;
use stemforge_core::{
    rates::FacilityRates, BioprocessBuilder, BioprocessResult, ComparisonStudy, ScenarioOutcome,
};

/// Runs one scenario and writes its tables and charts. A failed scenario
/// writes nothing.
pub fn run_simulation(inputs: &Inputs, scenario_name: &str, output_dir: &Path) -> Result<()> {
    println!("\n--- [Workflow] Simulating scenario '{}' ---", scenario_name);
    let scenario = inputs.scenario(scenario_name)?;

    let result = BioprocessBuilder::new()
        .with_reference(inputs.reference.clone())
        .with_scenario(scenario.clone())
        .with_settings(inputs.settings.simulation.clone())
        .with_allocation_policy(inputs.settings.allocation.clone())
        .with_process_settings(inputs.settings.process.clone())
        .build()
        .and_then(|engine| engine.execute())
        .with_context(|| format!("Scenario '{}' failed", scenario.name))?;

    print_result(&scenario.name, &result);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    export::write_result(output_dir, &result)?;
    plotting::generate_scenario_plots(output_dir, &result)?;
    Ok(())
}

/// Runs every scenario of a study. Returns whether any scenario finished,
/// in which case tables and a comparison chart were written.
pub fn run_comparison(inputs: &Inputs, study_name: &str, output_dir: &Path) -> Result<bool> {
    let study = inputs.study(study_name)?;
    println!("\n--- [Workflow] Comparison study '{}' ---", study.name);
    if let Some(description) = &study.description {
        println!("{}", description);
    }

    let outcomes = ComparisonStudy::new(study, inputs.reference.clone())
        .with_settings(inputs.settings.simulation.clone())
        .with_allocation_policy(inputs.settings.allocation.clone())
        .with_process_settings(inputs.settings.process.clone())
        .run();

    print_comparison(&outcomes);
    if outcomes.iter().all(|o| o.result.is_err()) {
        println!("\nNo scenario finished; nothing was written.");
        return Ok(false);
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    export::write_comparison(output_dir, &outcomes)?;
    for outcome in &outcomes {
        if let Ok(result) = &outcome.result {
            let dir = output_dir.join(slug(&outcome.name));
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
            export::write_result(&dir, result)?;
        }
    }
    plotting::plot_comparison(output_dir, &study.name, &outcomes)?;
    Ok(true)
}

pub fn print_catalog(inputs: &Inputs) {
    let reference = &inputs.reference;
    println!("\n--- Reference Catalog ---");

    println!("\nVessels:");
    for v in &reference.vessels {
        println!(
            "  {:<10} {:>6.0}-{:<6.0} mL  use {:>8.2}  acquisition {:>10.2}",
            v.kind.to_string(),
            v.min_working_volume_ml,
            v.max_working_volume_ml,
            v.use_cost,
            v.acquisition_cost
        );
    }

    println!("\nPlanar platforms:");
    for p in &reference.platforms {
        println!(
            "  {:<10} {:>3} surfaces  {:.2e} cells/surface  cost {:.2}",
            p.kind.to_string(),
            p.surfaces,
            p.surface_confluency,
            p.cost
        );
    }

    println!("\nExpansion profiles:");
    for e in &reference.expansion_profiles {
        println!(
            "  {:<28} fold {:>5.2} (SEM {:.2}, n={})  {:.0e} cells/mL  {} d",
            e.name,
            e.fold_expansion_average,
            e.fold_expansion_sem,
            e.sample_size,
            e.seeding_density,
            e.culture_days
        );
    }

    println!(
        "\n{} reagents, {} antibodies, {} QC assays, {} labor roles",
        reference.reagents.len(),
        reference.antibodies.len(),
        reference.qc_assays.len(),
        reference.labor.len()
    );

    match FacilityRates::from_reference(reference) {
        Ok(rates) => println!(
            "Facility: {:.2}/day facility, {:.2}/day labor, {:.2}/h bench wage, {} parallel processes",
            rates.daily_facility_cost, rates.daily_labor_cost, rates.hourly_wage, rates.parallel_processes
        ),
        Err(e) => println!("Facility rates unavailable: {}", e),
    }

    println!("\nScenarios: {}", names(inputs.scenarios.iter().map(|s| s.name.as_str())));
    println!("Studies:   {}", names(inputs.studies.iter().map(|s| s.name.as_str())));
}

fn print_result(name: &str, result: &BioprocessResult) {
    let plan = &result.plan;
    println!("\n--- Results: {} ---", name);
    println!(
        "Cycles: {}  optimal fold increase {:.3} (floor {:.3})  required total {:.1}",
        plan.cycle_count, plan.optimal_fold_increase, plan.minimum_fold_increase, plan.required_fold_increase
    );
    println!(
        "Planar: {} -> {} surfaces over {} passage(s), {:.0} d",
        result.planar.initial_surfaces, result.planar.final_surfaces, result.planar.passages, result.planar.duration_days
    );

    println!(
        "\n{:<6} {:>8} {:>10} {:>8} {:>14} {:>14} {:>12}",
        "Cycle", "Days", "Volume mL", "Vessels", "Avg cells", "Min cells", "Cost"
    );
    for cycle in &result.cycles {
        println!(
            "{:<6} {:>8.1} {:>10} {:>8} {:>14.3e} {:>14.3e} {:>12.2}",
            cycle.label,
            cycle.duration_days,
            cycle.working_volume_ml.map_or("-".to_string(), |v| format!("{:.0}", v)),
            cycle.allocation.as_ref().map_or("-".to_string(), |a| a.vessel_count().to_string()),
            cycle.average_cell_number,
            cycle.minimum_cell_number,
            cycle.total_cost()
        );
    }

    println!("\n{:<18} {:>14} {:>14}", "Category", "Before", "After failures");
    let before = export::category_rows(&result.totals.costs);
    let after = export::category_rows(&result.failure.costs);
    for ((item, b), (_, a)) in before.iter().zip(&after) {
        println!("{:<18} {:>14.2} {:>14.2}", item, b, a);
    }
    println!("\n{:<18} {:>14} {:>14}", "Stage", "Before", "After failures");
    let before = export::stage_rows(&result.totals.stages);
    let after = export::stage_rows(&result.failure.stages);
    for ((item, b), (_, a)) in before.iter().zip(&after) {
        println!("{:<18} {:>14.2} {:>14.2}", item, b, a);
    }

    println!(
        "\nDuration {:.0} d, worktime {:.0} h",
        result.totals.duration_days, result.totals.worktime_hours
    );
    println!(
        "Success probability {:.3}  failure cost {:.2}",
        result.success_probability, result.failure.failure_cost
    );
    println!(
        "Total cost {:.2}  ({:.2} per million cells)",
        result.total_cost(),
        result.cost_per_million_cells()
    );
}

fn print_comparison(outcomes: &[ScenarioOutcome]) {
    println!(
        "\n{:<24} {:>7} {:>9} {:>14} {:>14}",
        "Scenario", "Cycles", "Success", "Total cost", "Per 1e6 cells"
    );
    for outcome in outcomes {
        match &outcome.result {
            Ok(r) => println!(
                "{:<24} {:>7} {:>9.3} {:>14.2} {:>14.2}",
                outcome.name,
                r.cycle_count(),
                r.success_probability,
                r.total_cost(),
                r.cost_per_million_cells()
            ),
            Err(e) => println!("{:<24} failed: {}", outcome.name, e),
        }
    }
}

fn names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

pub fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
