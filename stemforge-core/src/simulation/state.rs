use crate::{
    allocation::VesselAllocation,
    analysis::{BioprocessResult, CycleRecord, FailureAdjustment, ProcessTotals},
    optimizer::CyclePlan,
    planar::PlanarPlan,
    sampling::SampleSet,
};
use serde::Serialize;
use std::fmt;

/// Steps of one scenario's pipeline, in the only order they can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Configured,
    DistributionsSampled,
    WorkflowOptimized,
    VesselsAllocated,
    StageCostsComputed,
    Aggregated,
    FailureAdjusted,
    Final,
}

impl PipelineState {
    pub fn next(self) -> Option<Self> {
        use PipelineState::*;
        match self {
            Configured => Some(DistributionsSampled),
            DistributionsSampled => Some(WorkflowOptimized),
            WorkflowOptimized => Some(VesselsAllocated),
            VesselsAllocated => Some(StageCostsComputed),
            StageCostsComputed => Some(Aggregated),
            Aggregated => Some(FailureAdjusted),
            FailureAdjusted => Some(Final),
            Final => None,
        }
    }

    pub fn is_final(self) -> bool {
        self == PipelineState::Final
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Configured => "configured",
            PipelineState::DistributionsSampled => "distributions sampled",
            PipelineState::WorkflowOptimized => "workflow optimized",
            PipelineState::VesselsAllocated => "vessels allocated",
            PipelineState::StageCostsComputed => "stage costs computed",
            PipelineState::Aggregated => "aggregated",
            PipelineState::FailureAdjusted => "failure adjusted",
            PipelineState::Final => "final",
        };
        f.write_str(name)
    }
}

/// Products of the steps run so far.
#[derive(Debug, Default)]
pub struct PipelineData {
    pub samples: Option<SampleSet>,
    pub plan: Option<CyclePlan>,
    pub allocations: Vec<VesselAllocation>,
    pub inoculation_cells: f64,
    pub planar: Option<PlanarPlan>,
    pub cycles: Vec<CycleRecord>,
    pub totals: Option<ProcessTotals>,
    pub failure: Option<FailureAdjustment>,
    pub result: Option<BioprocessResult>,
}
