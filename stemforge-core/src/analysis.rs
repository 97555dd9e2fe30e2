//! Cycle aggregation and failure-cost redistribution.

use crate::{
    allocation::VesselAllocation,
    error::StemforgeError,
    optimizer::CyclePlan,
    planar::PlanarPlan,
    rates::FacilityRates,
    stages::{CostBreakdown, StageCostRecord},
};
use serde::Serialize;
use std::ops::Add;
use stemforge_schemas::culture::CultureConditions;

/// Cost by pipeline stage. Inoculation is reported under expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageColumns {
    pub pre_inoculation: f64,
    pub expansion: f64,
    pub quality_control: f64,
    pub harvesting: f64,
}

impl StageColumns {
    pub fn total(&self) -> f64 {
        self.pre_inoculation + self.expansion + self.quality_control + self.harvesting
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            pre_inoculation: self.pre_inoculation * factor,
            expansion: self.expansion * factor,
            quality_control: self.quality_control * factor,
            harvesting: self.harvesting * factor,
        }
    }
}

impl Add for StageColumns {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            pre_inoculation: self.pre_inoculation + rhs.pre_inoculation,
            expansion: self.expansion + rhs.expansion,
            quality_control: self.quality_control + rhs.quality_control,
            harvesting: self.harvesting + rhs.harvesting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    /// `2D` for the planar cycle, `C1`.. for bioreactor cycles.
    pub label: String,
    pub duration_days: f64,
    pub worktime_hours: f64,
    pub average_cell_number: f64,
    /// Cells reached by the threshold share of runs, from the sample minimums.
    pub minimum_cell_number: f64,
    pub working_volume_ml: Option<f64>,
    pub allocation: Option<VesselAllocation>,
    pub costs: CostBreakdown,
    pub stages: StageColumns,
    /// The stage records the cycle was folded from, nested stages already
    /// stripped of the indirect cost they bill themselves.
    pub records: Vec<StageCostRecord>,
}

impl CycleRecord {
    pub fn total_cost(&self) -> f64 {
        self.costs.total()
    }

    pub fn medium_cost(&self) -> f64 {
        self.costs.medium
    }

    /// Planar culture with the initial quality control nested inside it.
    pub fn planar(plan: &PlanarPlan, pre: StageCostRecord, initial_qc: StageCostRecord) -> Self {
        let pre = pre.without_indirect_of(&initial_qc);
        let stages = StageColumns {
            pre_inoculation: pre.total_cost(),
            quality_control: initial_qc.total_cost(),
            ..StageColumns::default()
        };
        let records = vec![pre, initial_qc];
        Self {
            label: "2D".to_string(),
            duration_days: records.iter().map(|r| r.duration_days).sum(),
            worktime_hours: records.iter().map(|r| r.worktime_hours).sum(),
            average_cell_number: plan.average_cell_number,
            minimum_cell_number: plan.required_cells,
            working_volume_ml: None,
            allocation: None,
            costs: records.iter().map(|r| r.costs).sum(),
            stages,
            records,
        }
    }
}

/// Inputs for folding one bioreactor cycle.
pub struct BioreactorCycle<'a> {
    pub index: usize,
    pub working_volume_ml: f64,
    pub allocation: &'a VesselAllocation,
    pub inoculation: StageCostRecord,
    pub expansion: StageCostRecord,
    /// Absent when the scenario runs no in-process check.
    pub intermediate_qc: Option<StageCostRecord>,
    /// Present on every cycle except the last.
    pub harvesting: Option<StageCostRecord>,
    /// Present on the last cycle only.
    pub final_qc: Option<StageCostRecord>,
    pub average_cell_number: f64,
    pub minimum_cell_number: f64,
}

impl CycleRecord {
    pub fn bioreactor(cycle: BioreactorCycle<'_>) -> Self {
        let mut expansion = cycle.expansion;
        for nested in [&cycle.intermediate_qc, &cycle.harvesting].into_iter().flatten() {
            expansion = expansion.without_indirect_of(nested);
        }

        let mut stages = StageColumns {
            expansion: cycle.inoculation.total_cost() + expansion.total_cost(),
            quality_control: cycle.intermediate_qc.as_ref().map_or(0.0, StageCostRecord::total_cost),
            harvesting: cycle.harvesting.as_ref().map_or(0.0, StageCostRecord::total_cost),
            ..StageColumns::default()
        };
        if let Some(final_qc) = &cycle.final_qc {
            stages.quality_control += final_qc.total_cost();
        }

        let records: Vec<StageCostRecord> = [Some(cycle.inoculation), Some(expansion), cycle.intermediate_qc]
            .into_iter()
            .chain([cycle.harvesting, cycle.final_qc])
            .flatten()
            .collect();

        Self {
            label: format!("C{}", cycle.index),
            duration_days: records.iter().map(|r| r.duration_days).sum(),
            worktime_hours: records.iter().map(|r| r.worktime_hours).sum(),
            average_cell_number: cycle.average_cell_number,
            minimum_cell_number: cycle.minimum_cell_number,
            working_volume_ml: Some(cycle.working_volume_ml),
            allocation: Some(cycle.allocation.clone()),
            costs: records.iter().map(|r| r.costs).sum(),
            stages,
            records,
        }
    }
}

/// Whole-process sums before any failure adjustment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessTotals {
    pub duration_days: f64,
    /// Summed worktime, rounded up to whole hours.
    pub worktime_hours: f64,
    pub costs: CostBreakdown,
    pub stages: StageColumns,
    pub direct_cost: f64,
    pub indirect_cost: f64,
    pub total_cost: f64,
}

pub fn aggregate_cycles(cycles: &[CycleRecord]) -> ProcessTotals {
    let costs: CostBreakdown = cycles.iter().map(|c| c.costs).sum();
    let stages = cycles
        .iter()
        .map(|c| c.stages)
        .fold(StageColumns::default(), Add::add);
    ProcessTotals {
        duration_days: cycles.iter().map(|c| c.duration_days).sum(),
        worktime_hours: cycles.iter().map(|c| c.worktime_hours).sum::<f64>().ceil(),
        direct_cost: costs.direct(),
        indirect_cost: costs.indirect(),
        total_cost: costs.direct() + costs.indirect(),
        costs,
        stages,
    }
}

/// Probability that a failure is caught at each checkpoint.
///
/// Failures originate at any of the `checkpoints` with equal probability and
/// each checkpoint catches a failure reaching it with `detection_probability`.
/// The last checkpoint takes whatever was not caught earlier, so the result
/// always sums to `failure_probability`.
pub fn failure_detection_probabilities(
    checkpoints: usize,
    failure_probability: f64,
    detection_probability: f64,
) -> Vec<f64> {
    if checkpoints == 0 {
        return Vec::new();
    }
    let occurrence = failure_probability / checkpoints as f64;
    let mut probabilities: Vec<f64> = (0..checkpoints - 1)
        .map(|index| {
            let reaching: f64 = (0..=index)
                .map(|k| occurrence * (1.0 - detection_probability).powi(k as i32))
                .sum();
            reaching * detection_probability
        })
        .collect();
    let caught: f64 = probabilities.iter().sum();
    probabilities.push(failure_probability - caught);
    probabilities
}

/// Totals per successful process once failed processes are paid for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureAdjustment {
    pub detection_probabilities: Vec<f64>,
    pub costs: CostBreakdown,
    pub stages: StageColumns,
    /// Cost added by failures and by runs missing the target cell number.
    pub failure_cost: f64,
    pub total_cost: f64,
}

/// Spreads the cost of failed processes over the successful ones.
///
/// A failure caught at checkpoint `i` wastes everything spent up to cycle `i`.
/// Expected waste is added per category and stage, then every figure is
/// divided by `success_probability` to also carry runs that miss the target.
pub fn apply_failure_model(
    cycles: &[CycleRecord],
    totals: &ProcessTotals,
    failure_probability: f64,
    detection_probability: f64,
    success_probability: f64,
) -> Result<FailureAdjustment, StemforgeError> {
    if !(success_probability > 0.0 && success_probability <= 1.0) {
        return Err(StemforgeError::Convergence(format!(
            "success probability {} leaves no successful process to carry failures",
            success_probability
        )));
    }
    if !(0.0..1.0).contains(&failure_probability) {
        return Err(StemforgeError::Configuration(format!(
            "failure probability must be in [0, 1), got {}",
            failure_probability
        )));
    }

    let detection_probabilities =
        failure_detection_probabilities(cycles.len(), failure_probability, detection_probability);

    let mut costs = totals.costs;
    let mut stages = totals.stages;
    let mut cumulative_costs = CostBreakdown::default();
    let mut cumulative_stages = StageColumns::default();
    for (cycle, probability) in cycles.iter().zip(&detection_probabilities) {
        cumulative_costs += cycle.costs;
        cumulative_stages = cumulative_stages + cycle.stages;
        let weight = probability / (1.0 - failure_probability);
        costs += cumulative_costs.scaled(weight);
        stages = stages + cumulative_stages.scaled(weight);
    }
    let costs = costs.scaled(1.0 / success_probability);
    let stages = stages.scaled(1.0 / success_probability);

    let failure_cost = costs.total() - totals.total_cost;
    Ok(FailureAdjustment {
        detection_probabilities,
        costs,
        stages,
        failure_cost,
        total_cost: totals.total_cost + failure_cost,
    })
}

/// Everything a finished pipeline produced for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BioprocessResult {
    pub conditions: CultureConditions,
    pub rates: FacilityRates,
    pub planar: PlanarPlan,
    pub plan: CyclePlan,
    pub cycles: Vec<CycleRecord>,
    pub totals: ProcessTotals,
    pub failure: FailureAdjustment,
    pub success_probability: f64,
    /// Cells at the end of the last cycle, one entry per simulated run.
    #[serde(skip)]
    pub final_cell_distribution: Vec<f64>,
}

impl BioprocessResult {
    pub fn cycle_count(&self) -> usize {
        self.plan.cycle_count
    }

    /// Expected cost per successful process.
    pub fn total_cost(&self) -> f64 {
        self.failure.total_cost
    }

    pub fn final_cell_number(&self) -> f64 {
        self.cycles.last().map_or(0.0, |c| c.average_cell_number)
    }

    pub fn cost_per_million_cells(&self) -> f64 {
        let cells = self.conditions.target_cell_number as f64;
        if cells > 0.0 {
            self.total_cost() / (cells / 1e6)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageKind;

    fn record(stage: StageKind, days: f64, hours: f64, costs: CostBreakdown) -> StageCostRecord {
        StageCostRecord {
            stage,
            duration_days: days,
            worktime_hours: hours,
            costs,
        }
    }

    fn flat(value: f64) -> CostBreakdown {
        CostBreakdown {
            consumables: value,
            reagents: value,
            medium: value / 2.0,
            facility: value,
            labor: value,
        }
    }

    fn cycle(label: &str, total: f64) -> CycleRecord {
        let costs = flat(total / 4.0);
        CycleRecord {
            label: label.to_string(),
            duration_days: 1.0,
            worktime_hours: 1.0,
            average_cell_number: 0.0,
            minimum_cell_number: 0.0,
            working_volume_ml: None,
            allocation: None,
            costs,
            stages: StageColumns {
                expansion: total,
                ..StageColumns::default()
            },
            records: Vec::new(),
        }
    }

    #[test]
    fn detection_probabilities_sum_to_failure_probability() {
        let probabilities = failure_detection_probabilities(5, 0.1, 0.2);
        assert_eq!(probabilities.len(), 5);
        assert!((probabilities.iter().sum::<f64>() - 0.1).abs() < 1e-15);
        // 0.2 * 0.02 for the first checkpoint
        assert!((probabilities[0] - 0.004).abs() < 1e-15);
        assert!((probabilities[1] - 0.2 * (0.02 + 0.02 * 0.8)).abs() < 1e-15);
    }

    #[test]
    fn blind_quality_control_defers_all_failures_to_the_end() {
        let probabilities = failure_detection_probabilities(4, 0.1, 0.0);
        assert_eq!(&probabilities[..3], &[0.0, 0.0, 0.0]);
        assert_eq!(probabilities[3], 0.1);
    }

    #[test]
    fn planar_cycle_strips_nested_indirect_cost() {
        let plan = PlanarPlan {
            initial_surfaces: 1,
            final_surfaces: 6,
            passages: 1,
            workflow: vec![1, 6],
            duration_days: 8.0,
            required_cells: 5e6,
            average_cell_number: 7.2e6,
        };
        let pre = record(StageKind::PreInoculation, 8.0, 4.0, flat(100.0));
        let qc = record(StageKind::InitialQualityControl, 0.0, 6.0, flat(10.0));
        let cycle = CycleRecord::planar(&plan, pre, qc);
        assert_eq!(cycle.costs.facility, 100.0);
        assert_eq!(cycle.costs.labor, 100.0);
        assert_eq!(cycle.stages.quality_control, 40.0);
        assert_eq!(cycle.stages.pre_inoculation, 380.0);
        assert!((cycle.stages.total() - cycle.total_cost()).abs() < 1e-9);
        assert_eq!(cycle.worktime_hours, 10.0);
    }

    #[test]
    fn failure_free_process_is_only_scaled_by_success() {
        let cycles = vec![cycle("2D", 100.0), cycle("C1", 200.0)];
        let totals = aggregate_cycles(&cycles);
        assert_eq!(totals.total_cost, 300.0);
        let adjusted = apply_failure_model(&cycles, &totals, 0.0, 0.2, 0.5).unwrap();
        assert!((adjusted.total_cost - 600.0).abs() < 1e-9);
        assert!((adjusted.failure_cost - 300.0).abs() < 1e-9);
    }

    #[test]
    fn undetected_failures_cost_the_whole_process() {
        let cycles = vec![cycle("2D", 100.0), cycle("C1", 200.0), cycle("C2", 300.0)];
        let totals = aggregate_cycles(&cycles);
        let adjusted = apply_failure_model(&cycles, &totals, 0.1, 0.0, 1.0).unwrap();
        // All failures surface at the end, wasting the full 600 each time.
        let expected = 600.0 + 600.0 * 0.1 / 0.9;
        assert!((adjusted.total_cost - expected).abs() < 1e-9);
        assert!((adjusted.stages.total() - adjusted.costs.total()).abs() < 1e-9);
    }

    #[test]
    fn zero_success_probability_is_a_convergence_error() {
        let cycles = vec![cycle("2D", 100.0)];
        let totals = aggregate_cycles(&cycles);
        let err = apply_failure_model(&cycles, &totals, 0.1, 0.2, 0.0).unwrap_err();
        assert!(matches!(err, StemforgeError::Convergence(_)));
    }
}
