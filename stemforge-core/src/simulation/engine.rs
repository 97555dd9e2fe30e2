use super::state::{PipelineData, PipelineState};
use crate::{
    allocation::{VesselAllocation, VesselAllocator},
    analysis::{
        aggregate_cycles, apply_failure_model, BioprocessResult, BioreactorCycle, CycleRecord,
    },
    error::StemforgeError,
    optimizer::{reconcile_volumes, WorkflowOptimizer},
    planar::PlanarPlan,
    rates::{FacilityRates, Prices},
    sampling::{CycleFactorSource, DistributionSampler},
    stages::StageCostEngine,
};
use rand::rngs::StdRng;
use std::sync::Arc;
use stemforge_schemas::{
    culture::CultureConditions,
    reference::ReferenceData,
    settings::{ProcessSettings, SimulationSettings},
};
use tracing::{debug, info};

/// Runs one scenario through sampling, optimization, allocation and costing.
pub struct BioprocessEngine {
    pub(super) label: String,
    pub(super) state: PipelineState,
    pub(super) reference: Arc<ReferenceData>,
    pub(super) conditions: CultureConditions,
    pub(super) settings: SimulationSettings,
    pub(super) process: ProcessSettings,
    pub(super) allocator: VesselAllocator,
    pub(super) rates: FacilityRates,
    pub(super) sampler: DistributionSampler,
    pub(super) injected_samples: bool,
    pub(super) rng: StdRng,
    pub(super) data: PipelineData,
}

impl BioprocessEngine {
    pub fn run(&mut self) -> Result<(), StemforgeError> {
        info!(scenario = %self.label, "starting bioprocess pipeline");
        while self.advance()? {}
        info!(scenario = %self.label, "bioprocess pipeline complete");
        Ok(())
    }

    /// Runs to completion and hands back the result.
    pub fn execute(mut self) -> Result<BioprocessResult, StemforgeError> {
        self.run()?;
        self.data.result.take().ok_or_else(|| {
            StemforgeError::Configuration("pipeline finished without a result".to_string())
        })
    }

    /// Runs the step leading out of the current state. Returns `false` once
    /// the pipeline is final. A failed step leaves the state unchanged.
    pub fn advance(&mut self) -> Result<bool, StemforgeError> {
        let Some(next) = self.state.next() else {
            return Ok(false);
        };
        match next {
            PipelineState::DistributionsSampled => self.sample_distributions()?,
            PipelineState::WorkflowOptimized => self.optimize_workflow()?,
            PipelineState::VesselsAllocated => self.allocate_vessels()?,
            PipelineState::StageCostsComputed => self.compute_stage_costs()?,
            PipelineState::Aggregated => self.aggregate()?,
            PipelineState::FailureAdjusted => self.adjust_for_failures()?,
            PipelineState::Final => self.finalize()?,
            PipelineState::Configured => {}
        }
        info!(scenario = %self.label, from = %self.state, to = %next, "pipeline transition");
        self.state = next;
        Ok(true)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn conditions(&self) -> &CultureConditions {
        &self.conditions
    }

    pub fn result(&self) -> Option<&BioprocessResult> {
        self.data.result.as_ref()
    }

    fn sample_distributions(&mut self) -> Result<(), StemforgeError> {
        if self.data.samples.is_none() {
            let samples = self.sampler.sample_set(&mut self.rng, self.settings.simulation_runs);
            self.data.samples = Some(samples);
        }
        if let Some(samples) = &self.data.samples {
            debug!(
                runs = samples.len(),
                mean_fold_expansion = samples.mean_fold_expansion(),
                mean_recovery = samples.mean_recovery_efficiency(),
                "distribution samples ready"
            );
        }
        Ok(())
    }

    fn optimize_workflow(&mut self) -> Result<(), StemforgeError> {
        let samples = self
            .data
            .samples
            .as_ref()
            .ok_or_else(|| missing_step(PipelineState::DistributionsSampled))?;
        let source: &dyn CycleFactorSource = if self.injected_samples {
            samples
        } else {
            &self.sampler
        };
        let optimizer = WorkflowOptimizer::new(
            source,
            &self.settings,
            self.conditions.threshold,
            self.conditions.required_fold_increase(),
            self.conditions.initial_volume_ml,
        )?;
        let plan = optimizer.optimize(&mut self.rng)?;
        info!(
            cycles = plan.cycle_count,
            optimal_fold_increase = plan.optimal_fold_increase,
            success_probability = plan.success_probability,
            "workflow optimized"
        );
        self.data.plan = Some(plan);
        Ok(())
    }

    fn allocate_vessels(&mut self) -> Result<(), StemforgeError> {
        let plan = self
            .data
            .plan
            .as_mut()
            .ok_or_else(|| missing_step(PipelineState::WorkflowOptimized))?;
        let allocations = reconcile_volumes(
            &mut plan.volumes_ml,
            &self.allocator,
            self.settings.max_allocation_passes,
        )?;
        for (cycle, allocation) in allocations.iter().enumerate() {
            debug!(
                cycle = cycle + 1,
                volume_ml = plan.volumes_ml[cycle],
                vessels = allocation.vessel_count(),
                "cycle allocated"
            );
        }
        self.data.allocations = allocations;
        Ok(())
    }

    fn compute_stage_costs(&mut self) -> Result<(), StemforgeError> {
        let plan = self
            .data
            .plan
            .as_ref()
            .ok_or_else(|| missing_step(PipelineState::WorkflowOptimized))?;
        let samples = self
            .data
            .samples
            .as_ref()
            .ok_or_else(|| missing_step(PipelineState::DistributionsSampled))?;
        let allocations = &self.data.allocations;
        let inoculation_cells = self.conditions.inoculation_cell_number();

        let prices = Prices::new(&self.reference);
        let platform = prices.platform(self.process.planar_platform)?;
        let planar = PlanarPlan::new(
            inoculation_cells,
            self.conditions.initial_cell_number,
            platform,
            &self.process,
        )?;
        let stages = StageCostEngine::new(prices, &self.rates, &self.process, &self.conditions);

        let mut cycles = Vec::with_capacity(allocations.len() + 1);
        cycles.push(CycleRecord::planar(
            &planar,
            stages.pre_inoculation(&planar)?,
            stages.initial_quality_control()?,
        ));

        let threshold = self.conditions.threshold;
        let min_fold_expansion = samples.min_fold_expansion(threshold);
        let min_cycle_factor = samples.min_cycle_factor(threshold);
        let last = allocations.len().saturating_sub(1);

        for (index, allocation) in allocations.iter().enumerate() {
            let volume = plan.volumes_ml[index];
            let final_cycle = index == last;
            let inoculation = if index == 0 {
                stages.primary_inoculation(&planar, volume, allocation)?
            } else {
                stages.secondary_inoculation(volume, allocation)?
            };
            let harvesting = if final_cycle {
                None
            } else {
                Some(stages.harvesting(allocation)?)
            };
            let intermediate_qc = if stages.runs_intermediate_qc() {
                Some(stages.intermediate_quality_control(allocation)?)
            } else {
                None
            };
            let final_qc = if final_cycle {
                Some(stages.final_quality_control(allocation)?)
            } else {
                None
            };
            let factor = if final_cycle { min_fold_expansion } else { min_cycle_factor };
            let average = plan
                .mean_cycle_fold_increases
                .get(index)
                .map_or(0.0, |fold| fold * inoculation_cells);

            cycles.push(CycleRecord::bioreactor(BioreactorCycle {
                index: index + 1,
                working_volume_ml: volume,
                allocation,
                inoculation,
                expansion: stages.expansion(volume, allocation)?,
                intermediate_qc,
                harvesting,
                final_qc,
                average_cell_number: average,
                minimum_cell_number: minimum_cells(allocation, self.conditions.seeding_density, factor),
            }));
        }

        self.data.inoculation_cells = inoculation_cells;
        self.data.planar = Some(planar);
        self.data.cycles = cycles;
        Ok(())
    }

    fn aggregate(&mut self) -> Result<(), StemforgeError> {
        let totals = aggregate_cycles(&self.data.cycles);
        debug!(total_cost = totals.total_cost, duration_days = totals.duration_days, "cycles aggregated");
        self.data.totals = Some(totals);
        Ok(())
    }

    fn adjust_for_failures(&mut self) -> Result<(), StemforgeError> {
        let totals = self
            .data
            .totals
            .as_ref()
            .ok_or_else(|| missing_step(PipelineState::Aggregated))?;
        let plan = self
            .data
            .plan
            .as_ref()
            .ok_or_else(|| missing_step(PipelineState::WorkflowOptimized))?;
        let failure = apply_failure_model(
            &self.data.cycles,
            totals,
            self.conditions.failure_probability,
            self.conditions.qc_detection_probability,
            plan.success_probability,
        )?;
        debug!(failure_cost = failure.failure_cost, "failure costs redistributed");
        self.data.failure = Some(failure);
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StemforgeError> {
        let data = &mut self.data;
        let plan = data
            .plan
            .take()
            .ok_or_else(|| missing_step(PipelineState::WorkflowOptimized))?;
        let planar = data
            .planar
            .take()
            .ok_or_else(|| missing_step(PipelineState::StageCostsComputed))?;
        let totals = data
            .totals
            .take()
            .ok_or_else(|| missing_step(PipelineState::Aggregated))?;
        let failure = data
            .failure
            .take()
            .ok_or_else(|| missing_step(PipelineState::FailureAdjusted))?;

        let cells = data.inoculation_cells;
        let final_cell_distribution = plan.final_fold_increases.iter().map(|f| f * cells).collect();
        data.result = Some(BioprocessResult {
            conditions: self.conditions.clone(),
            rates: self.rates.clone(),
            success_probability: plan.success_probability,
            planar,
            plan,
            cycles: std::mem::take(&mut data.cycles),
            totals,
            failure,
            final_cell_distribution,
        });
        Ok(())
    }
}

fn missing_step(state: PipelineState) -> StemforgeError {
    StemforgeError::Configuration(format!("pipeline step '{}' has not run", state))
}

/// Cells the threshold share of runs reaches, counted per vessel.
fn minimum_cells(allocation: &VesselAllocation, seeding_density: f64, factor: f64) -> f64 {
    allocation
        .lines
        .iter()
        .map(|line| line.count as f64 * (seeding_density * line.volume_per_vessel_ml * factor).ceil())
        .sum()
}
