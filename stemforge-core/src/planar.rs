use crate::error::StemforgeError;
use serde::Serialize;
use stemforge_schemas::{reference::PlanarPlatform, settings::ProcessSettings};

/// Surface counts for the planar culture that produces the inoculum.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanarPlan {
    pub initial_surfaces: u32,
    pub final_surfaces: u32,
    pub passages: u32,
    /// Surfaces in culture at each passage, thawed surfaces first.
    pub workflow: Vec<u32>,
    pub duration_days: f64,
    pub required_cells: f64,
    pub average_cell_number: f64,
}

impl PlanarPlan {
    pub fn total_surfaces(&self) -> u32 {
        self.workflow.iter().sum()
    }

    /// Surfaces dissociated and split onto fresh surfaces along the way.
    pub fn passaged_surfaces(&self) -> u32 {
        match self.workflow.split_last() {
            Some((_, earlier)) if self.passages > 0 => earlier.iter().sum(),
            _ => 0,
        }
    }

    /// Planar culture sized to deliver `inoculation_cells` plus the cells
    /// reserved for initial quality control.
    pub fn new(
        inoculation_cells: f64,
        initial_cell_number: u64,
        platform: &PlanarPlatform,
        process: &ProcessSettings,
    ) -> Result<Self, StemforgeError> {
        let usable = platform.surface_confluency - process.confluency_z_score * platform.confluency_std;
        if !(usable > 0.0) {
            return Err(StemforgeError::Configuration(format!(
                "{} surfaces yield no usable cells at z = {}",
                platform.kind, process.confluency_z_score
            )));
        }
        if process.max_passage_ratio < 2 || process.min_passage_ratio == 0 {
            return Err(StemforgeError::Configuration(format!(
                "passage ratios must be at least 2 (max) and 1 (min), got {} and {}",
                process.max_passage_ratio, process.min_passage_ratio
            )));
        }
        if !(process.cells_per_thawed_surface > 0.0) {
            return Err(StemforgeError::Configuration(
                "cells per thawed surface must be positive".to_string(),
            ));
        }

        let required_cells = inoculation_cells + process.initial_qc_cells;
        let initial = ((initial_cell_number as f64 / process.cells_per_thawed_surface).ceil() as u32).max(1);
        let needed = ((required_cells / usable).ceil() as u32).max(initial);

        let max_ratio = process.max_passage_ratio as u64;
        let mut passages = 0u32;
        let mut reach = initial as u64;
        while reach < needed as u64 {
            reach *= max_ratio;
            passages += 1;
        }

        let floor = initial * process.min_passage_ratio;
        let mut workflow = vec![needed];
        let mut surfaces = needed;
        for _ in 1..passages {
            surfaces = surfaces.div_ceil(process.max_passage_ratio).max(floor);
            workflow.push(surfaces);
        }
        if passages > 0 {
            workflow.push(initial);
        }
        workflow.reverse();

        Ok(Self {
            initial_surfaces: initial,
            final_surfaces: needed,
            passages,
            duration_days: (workflow.len() as u32 * process.passage_duration_days) as f64,
            workflow,
            required_cells,
            average_cell_number: needed as f64 * platform.surface_confluency,
        })
    }
}
