//! Tunable model constants.
//!
//! Several of these are empirical calibrations rather than physical laws
//! (the recovery std divisor, the final-volume floor, the harvest fraction).
//! They are kept here so a catalog or study can override them without code
//! changes.

use crate::kinds::{PlatformKind, ReagentKind, VesselKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Monte Carlo runs per simulated round.
    pub simulation_runs: usize,
    /// Runs per parallel batch. Batches are seeded independently.
    pub batch_size: usize,
    /// Fixes every random draw of a pipeline when set.
    pub seed: Option<u64>,
    pub max_cycles: usize,
    pub max_optimization_steps: usize,
    /// Factor applied to the per-cycle fold increase at each volume-minimization step.
    pub decrease_ratio: f64,
    /// Smallest acceptable working volume of the final cycle.
    pub min_final_volume_ml: f64,
    /// Down-scaling applied to the SEM-derived recovery std before the beta fit.
    pub recovery_std_divisor: f64,
    /// Rounds of vessel allocation allowed before the volume plan must settle.
    pub max_allocation_passes: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            simulation_runs: 100_000,
            batch_size: 8_192,
            seed: None,
            max_cycles: 30,
            max_optimization_steps: 2_000,
            decrease_ratio: 0.99,
            min_final_volume_ml: 1_800.0,
            recovery_std_divisor: 3.0,
            max_allocation_passes: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    /// Volumes below this are rounded up before allocation. Defaults to the
    /// smallest minimum working volume in the catalog.
    pub min_usable_volume_ml: Option<f64>,
    /// Per-vessel working volumes are rounded up to a multiple of this.
    pub volume_increment_ml: f64,
    /// Whether the last cycle may trade a large vessel for smaller ones.
    pub substitute_final_cycle: bool,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            min_usable_volume_ml: None,
            volume_increment_ml: 1.0,
            substitute_final_cycle: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSettings {
    pub planar_platform: PlatformKind,
    /// Platform used for the trilineage differentiation assay.
    pub differentiation_platform: PlatformKind,
    pub differentiation_surfaces: u32,
    pub coating_substrate: ReagentKind,
    pub dissociation_enzyme: ReagentKind,
    pub rock_inhibitor: ReagentKind,
    pub wash_buffer: ReagentKind,
    pub passage_buffer: ReagentKind,
    pub vessels: Vec<VesselKind>,
    pub passage_duration_days: u32,
    pub max_passage_ratio: u32,
    pub min_passage_ratio: u32,
    /// Standard deviations subtracted from confluency when sizing passages.
    pub confluency_z_score: f64,
    pub initial_qc_cells: f64,
    pub cells_per_thawed_surface: f64,
    pub recovery_medium_ml_per_surface: f64,
    pub passage_washes: u32,
    /// Fraction of each vessel's maximum volume used as dissociation reagent.
    pub harvest_fraction: f64,
    pub final_qc_duration_days: u32,
    /// Drops intermediate quality control from scenarios whose detection
    /// probability is zero, since it could never catch a failure.
    pub skip_undetectable_qc: bool,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            planar_platform: PlatformKind::SixWell,
            differentiation_platform: PlatformKind::TwelveWell,
            differentiation_surfaces: 6,
            coating_substrate: ReagentKind::Matrigel,
            dissociation_enzyme: ReagentKind::Accutase,
            rock_inhibitor: ReagentKind::Y27632,
            wash_buffer: ReagentKind::Dpbs,
            passage_buffer: ReagentKind::Edta,
            vessels: vec![VesselKind::Pbs0p1Mag, VesselKind::Pbs0p5Mag, VesselKind::Pbs3Mag],
            passage_duration_days: 4,
            max_passage_ratio: 6,
            min_passage_ratio: 3,
            confluency_z_score: 3.0,
            initial_qc_cells: 4e6,
            cells_per_thawed_surface: 1e6,
            recovery_medium_ml_per_surface: 10.0,
            passage_washes: 3,
            harvest_fraction: 0.2,
            final_qc_duration_days: 3,
            skip_undetectable_qc: true,
        }
    }
}
