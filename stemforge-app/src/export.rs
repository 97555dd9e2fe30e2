//! CSV and JSON tables written next to the charts of a run.

use anyhow::{Context, Result};
use csv::Writer;
use serde::Serialize;
use std::{fs, path::Path};
use stemforge_core::{analysis::StageColumns, stages::CostBreakdown, BioprocessResult, ScenarioOutcome};

#[derive(Debug, Serialize)]
struct CycleRow<'a> {
    cycle: &'a str,
    duration_days: f64,
    worktime_hours: f64,
    working_volume_ml: Option<f64>,
    vessels: Option<u32>,
    average_cell_number: f64,
    minimum_cell_number: f64,
    consumables: f64,
    reagents: f64,
    medium: f64,
    facility: f64,
    labor: f64,
    total: f64,
}

#[derive(Debug, Serialize)]
struct CostRow<'a> {
    item: &'a str,
    before_failures: f64,
    after_failures: f64,
}

#[derive(Debug, Serialize)]
struct AllocationRow<'a> {
    cycle: &'a str,
    vessel: String,
    count: u32,
    volume_per_vessel_ml: f64,
    use_cost: f64,
    acquisition_cost: f64,
}

#[derive(Debug, Serialize)]
struct ComparisonRow<'a> {
    scenario: &'a str,
    cycles: Option<usize>,
    success_probability: Option<f64>,
    total_cost: Option<f64>,
    cost_per_million_cells: Option<f64>,
    error: Option<String>,
}

/// Category rows with medium split out of reagents so the rows add up.
pub fn category_rows(costs: &CostBreakdown) -> [(&'static str, f64); 5] {
    [
        ("Consumables", costs.consumables),
        ("Reagents", costs.reagents - costs.medium),
        ("Medium", costs.medium),
        ("Facility", costs.facility),
        ("Labor", costs.labor),
    ]
}

pub fn stage_rows(stages: &StageColumns) -> [(&'static str, f64); 4] {
    [
        ("Pre-inoculation", stages.pre_inoculation),
        ("Expansion", stages.expansion),
        ("Quality control", stages.quality_control),
        ("Harvesting", stages.harvesting),
    ]
}

/// Writes every table of a finished scenario into `dir`.
pub fn write_result(dir: &Path, result: &BioprocessResult) -> Result<()> {
    write_rows(
        &dir.join("cycles.csv"),
        result.cycles.iter().map(|c| CycleRow {
            cycle: &c.label,
            duration_days: c.duration_days,
            worktime_hours: c.worktime_hours,
            working_volume_ml: c.working_volume_ml,
            vessels: c.allocation.as_ref().map(|a| a.vessel_count()),
            average_cell_number: c.average_cell_number,
            minimum_cell_number: c.minimum_cell_number,
            consumables: c.costs.consumables,
            reagents: c.costs.reagents,
            medium: c.costs.medium,
            facility: c.costs.facility,
            labor: c.costs.labor,
            total: c.total_cost(),
        }),
    )?;

    let before = category_rows(&result.totals.costs);
    let after = category_rows(&result.failure.costs);
    write_rows(
        &dir.join("cost_categories.csv"),
        before.iter().zip(&after).map(|(&(item, b), &(_, a))| CostRow {
            item,
            before_failures: b,
            after_failures: a,
        }),
    )?;

    let before = stage_rows(&result.totals.stages);
    let after = stage_rows(&result.failure.stages);
    write_rows(
        &dir.join("cost_stages.csv"),
        before.iter().zip(&after).map(|(&(item, b), &(_, a))| CostRow {
            item,
            before_failures: b,
            after_failures: a,
        }),
    )?;

    write_rows(
        &dir.join("vessel_allocation.csv"),
        result.cycles.iter().flat_map(|c| {
            c.allocation.iter().flat_map(|a| &a.lines).map(move |line| AllocationRow {
                cycle: &c.label,
                vessel: line.vessel.to_string(),
                count: line.count,
                volume_per_vessel_ml: line.volume_per_vessel_ml,
                use_cost: line.use_cost,
                acquisition_cost: line.acquisition_cost,
            })
        }),
    )?;

    let mut writer = Writer::from_path(dir.join("final_distribution.csv"))?;
    writer.write_record(["run", "cells"])?;
    for (run, cells) in result.final_cell_distribution.iter().enumerate() {
        writer.write_record([run.to_string(), format!("{:.0}", cells)])?;
    }
    writer.flush()?;

    let json = serde_json::to_string_pretty(result)?;
    fs::write(dir.join("result.json"), json)
        .with_context(|| format!("Failed to write result.json in {}", dir.display()))?;
    Ok(())
}

pub fn write_comparison(dir: &Path, outcomes: &[ScenarioOutcome]) -> Result<()> {
    write_rows(
        &dir.join("comparison.csv"),
        outcomes.iter().map(|o| match &o.result {
            Ok(r) => ComparisonRow {
                scenario: &o.name,
                cycles: Some(r.cycle_count()),
                success_probability: Some(r.success_probability),
                total_cost: Some(r.total_cost()),
                cost_per_million_cells: Some(r.cost_per_million_cells()),
                error: None,
            },
            Err(e) => ComparisonRow {
                scenario: &o.name,
                cycles: None,
                success_probability: None,
                total_cost: None,
                cost_per_million_cells: None,
                error: Some(e.to_string()),
            },
        }),
    )
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer =
        Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
