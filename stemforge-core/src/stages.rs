//! Per-stage duration, worktime and cost.
//!
//! Every stage is a pure function of the plan it works on and returns a fresh
//! [`StageCostRecord`]. Worktimes are tallied in minutes and billed in
//! half-hour slots. Reagent volumes are in mL against prices per litre.
//!
//! Sub-day stages (quality control, harvesting, inoculation hand-offs) are
//! billed at hourly facility and wage rates. Multi-day stages take their share
//! of the facility's daily costs. Stages nested inside a multi-day stage have
//! their hourly facility and labor subtracted from it when cycles are
//! aggregated, see [`StageCostRecord::without_indirect_of`].

use crate::{
    allocation::VesselAllocation,
    error::StemforgeError,
    planar::PlanarPlan,
    rates::{FacilityRates, Prices},
};
use serde::Serialize;
use std::{
    fmt,
    ops::{Add, AddAssign},
};
use stemforge_schemas::{
    culture::CultureConditions,
    kinds::{AntibodyKind, QcAssayKind},
    settings::ProcessSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    PreInoculation,
    InitialQualityControl,
    PrimaryInoculation,
    SecondaryInoculation,
    Expansion,
    IntermediateQualityControl,
    Harvesting,
    FinalQualityControl,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::PreInoculation => "Pre-Inoculation",
            StageKind::InitialQualityControl => "Initial Quality Control",
            StageKind::PrimaryInoculation => "Primary Inoculation",
            StageKind::SecondaryInoculation => "Secondary Inoculation",
            StageKind::Expansion => "Expansion",
            StageKind::IntermediateQualityControl => "Intermediate Quality Control",
            StageKind::Harvesting => "Harvesting",
            StageKind::FinalQualityControl => "Final Quality Control",
        };
        f.write_str(name)
    }
}

/// Cost by category. `medium` is the share of `reagents` spent on culture
/// medium and is not added again in [`CostBreakdown::total`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub consumables: f64,
    pub reagents: f64,
    pub medium: f64,
    pub facility: f64,
    pub labor: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.consumables + self.reagents + self.facility + self.labor
    }

    pub fn non_medium(&self) -> f64 {
        self.total() - self.medium
    }

    pub fn direct(&self) -> f64 {
        self.consumables + self.reagents
    }

    pub fn indirect(&self) -> f64 {
        self.facility + self.labor
    }

    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            consumables: self.consumables * factor,
            reagents: self.reagents * factor,
            medium: self.medium * factor,
            facility: self.facility * factor,
            labor: self.labor * factor,
        }
    }

    fn reagent(cost: f64) -> Self {
        Self {
            reagents: cost,
            ..Self::default()
        }
    }

    fn medium(cost: f64) -> Self {
        Self {
            reagents: cost,
            medium: cost,
            ..Self::default()
        }
    }

    fn consumable(cost: f64) -> Self {
        Self {
            consumables: cost,
            ..Self::default()
        }
    }
}

impl Add for CostBreakdown {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            consumables: self.consumables + rhs.consumables,
            reagents: self.reagents + rhs.reagents,
            medium: self.medium + rhs.medium,
            facility: self.facility + rhs.facility,
            labor: self.labor + rhs.labor,
        }
    }
}

impl AddAssign for CostBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for CostBreakdown {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCostRecord {
    pub stage: StageKind,
    pub duration_days: f64,
    pub worktime_hours: f64,
    pub costs: CostBreakdown,
}

impl StageCostRecord {
    pub fn total_cost(&self) -> f64 {
        self.costs.total()
    }

    pub fn medium_cost(&self) -> f64 {
        self.costs.medium
    }

    pub fn non_medium_cost(&self) -> f64 {
        self.costs.non_medium()
    }

    /// Removes the facility and labor a nested stage already bills itself.
    pub fn without_indirect_of(mut self, nested: &StageCostRecord) -> Self {
        self.costs.facility -= nested.costs.facility;
        self.costs.labor -= nested.costs.labor;
        self
    }
}

/// Minutes of bench work, billed in half-hour slots, as hours.
pub fn worktime_hours(minutes: f64) -> f64 {
    (minutes / 30.0).ceil() * 30.0 / 60.0
}

pub struct StageCostEngine<'a> {
    prices: Prices<'a>,
    rates: &'a FacilityRates,
    process: &'a ProcessSettings,
    conditions: &'a CultureConditions,
}

impl<'a> StageCostEngine<'a> {
    pub fn new(
        prices: Prices<'a>,
        rates: &'a FacilityRates,
        process: &'a ProcessSettings,
        conditions: &'a CultureConditions,
    ) -> Self {
        Self {
            prices,
            rates,
            process,
            conditions,
        }
    }

    fn medium_cost(&self, volume_ml: f64) -> Result<f64, StemforgeError> {
        self.prices.reagent(self.conditions.culture_medium.reagent(), volume_ml)
    }

    fn supplements_cost(&self, volume_ml: f64) -> Result<f64, StemforgeError> {
        self.conditions
            .supplements
            .iter()
            .map(|&s| self.prices.reagent(s, volume_ml))
            .sum()
    }

    fn sub_day(&self, stage: StageKind, minutes: f64, costs: CostBreakdown) -> StageCostRecord {
        let hours = worktime_hours(minutes);
        StageCostRecord {
            stage,
            duration_days: 0.0,
            worktime_hours: hours,
            costs: CostBreakdown {
                facility: self.rates.facility_for_hours(hours),
                labor: self.rates.labor_for_hours(hours),
                ..costs
            },
        }
    }

    fn multi_day(&self, stage: StageKind, days: f64, minutes: f64, costs: CostBreakdown) -> StageCostRecord {
        StageCostRecord {
            stage,
            duration_days: days,
            worktime_hours: worktime_hours(minutes),
            costs: CostBreakdown {
                facility: costs.facility + self.rates.facility_for_days(days),
                labor: self.rates.labor_for_days(days),
                ..costs
            },
        }
    }

    /// Thawing, planar culture and passaging up to the final surface count.
    pub fn pre_inoculation(&self, plan: &PlanarPlan) -> Result<StageCostRecord, StemforgeError> {
        let platform = self.prices.platform(self.process.planar_platform)?;
        let total = plan.total_surfaces() as f64;
        let passaged = plan.passaged_surfaces() as f64;
        let initial = plan.initial_surfaces as f64;
        let passage_days = self.process.passage_duration_days as f64;
        let per_plate = platform.surfaces.max(1) as f64;

        let plates = (total / per_plate).ceil() * platform.cost;
        let coating = self
            .prices
            .reagent(self.process.coating_substrate, platform.coating_volume_ml * total)?;
        let passage_buffer = self.prices.reagent(
            self.process.passage_buffer,
            platform.washing_volume_ml * passaged * self.process.passage_washes as f64,
        )?;
        let medium = self.medium_cost(
            platform.culture_volume_ml * total * passage_days
                + self.process.recovery_medium_ml_per_surface * initial,
        )?;

        let passages = plan.passages as f64;
        let minutes = 10.0
            + 5.0 * (total / per_plate).ceil()
            + 20.0
            + 20.0 * initial
            + (5.0 * (passages + 1.0) + total) * passage_days
            + 20.0 * passages
            + 3.0 * passaged;

        let costs = CostBreakdown::consumable(plates)
            + CostBreakdown::reagent(coating + passage_buffer)
            + CostBreakdown::medium(medium);
        Ok(self.multi_day(StageKind::PreInoculation, plan.duration_days, minutes, costs))
    }

    /// Pluripotency check of the thawed line before it is expanded.
    pub fn initial_quality_control(&self) -> Result<StageCostRecord, StemforgeError> {
        let costs = CostBreakdown::reagent(self.flow_cytometry_panel()?) + self.trilineage_panel()?;
        let minutes = 150.0 + self.differentiation_minutes();
        Ok(self.sub_day(StageKind::InitialQualityControl, minutes, costs))
    }

    /// Dissociates the planar culture and seeds the first bioreactor cycle.
    /// Its facility and labor time is covered by the expansion it starts.
    pub fn primary_inoculation(
        &self,
        plan: &PlanarPlan,
        working_volume_ml: f64,
        allocation: &VesselAllocation,
    ) -> Result<StageCostRecord, StemforgeError> {
        let platform = self.prices.platform(self.process.planar_platform)?;
        let final_surfaces = plan.final_surfaces as f64;
        let wash_volume = platform.washing_volume_ml * final_surfaces;

        let reagents = self.prices.reagent(self.process.rock_inhibitor, working_volume_ml)?
            + self.supplements_cost(working_volume_ml)?
            + self.prices.reagent(self.process.dissociation_enzyme, wash_volume)?
            + self.prices.reagent(self.process.wash_buffer, wash_volume)?;
        let costs = CostBreakdown::consumable(allocation.use_cost())
            + CostBreakdown::reagent(reagents)
            + CostBreakdown::medium(self.medium_cost(working_volume_ml)?);

        let minutes = 25.0 + 3.0 * final_surfaces + 60.0 + 10.0 * allocation.vessel_count() as f64;
        Ok(StageCostRecord {
            stage: StageKind::PrimaryInoculation,
            duration_days: 0.0,
            worktime_hours: worktime_hours(minutes),
            costs,
        })
    }

    /// Seeds a bioreactor cycle with cells harvested from the previous one.
    pub fn secondary_inoculation(
        &self,
        working_volume_ml: f64,
        allocation: &VesselAllocation,
    ) -> Result<StageCostRecord, StemforgeError> {
        let reagents = self.prices.reagent(self.process.rock_inhibitor, working_volume_ml)?
            + self.supplements_cost(working_volume_ml)?;
        let costs = CostBreakdown::consumable(allocation.use_cost())
            + CostBreakdown::reagent(reagents)
            + CostBreakdown::medium(self.medium_cost(working_volume_ml)?);

        let minutes = 60.0 + 10.0 * allocation.vessel_count() as f64;
        Ok(StageCostRecord {
            stage: StageKind::SecondaryInoculation,
            duration_days: 0.0,
            worktime_hours: worktime_hours(minutes),
            costs,
        })
    }

    /// One bioreactor growth period with its scheduled medium exchanges.
    pub fn expansion(
        &self,
        working_volume_ml: f64,
        allocation: &VesselAllocation,
    ) -> Result<StageCostRecord, StemforgeError> {
        let exchanges = self.conditions.medium_exchanges as f64;
        let feed = working_volume_ml * exchanges * self.conditions.exchange_fraction;
        let days = self.conditions.culture_days as f64;

        let vessel_energy = allocation.energy_kwh_per_day() * days * self.rates.energy_cost_per_kwh;
        let vessel_depreciation = allocation.acquisition_cost() / self.rates.equipment_lifespan_days * days;

        let costs = CostBreakdown {
            facility: vessel_energy + vessel_depreciation,
            ..(CostBreakdown::medium(self.medium_cost(feed)?)
                + CostBreakdown::reagent(self.supplements_cost(feed)?))
        };
        let minutes = (5.0 + 10.0 * allocation.vessel_count() as f64) * exchanges;
        Ok(self.multi_day(StageKind::Expansion, days, minutes, costs))
    }

    /// Whether bioreactor cycles carry an in-process check. A check that can
    /// never detect a failure is dropped when the process settings allow it.
    pub fn runs_intermediate_qc(&self) -> bool {
        !(self.process.skip_undetectable_qc && self.conditions.qc_detection_probability <= 0.0)
    }

    /// In-process pluripotency check, one sample per vessel.
    pub fn intermediate_quality_control(
        &self,
        allocation: &VesselAllocation,
    ) -> Result<StageCostRecord, StemforgeError> {
        let vessels = allocation.vessel_count() as f64;
        let costs = CostBreakdown::reagent(self.flow_cytometry_panel()? * vessels);
        let minutes = 150.0 + 60.0 * (vessels - 1.0).max(0.0);
        Ok(self.sub_day(StageKind::IntermediateQualityControl, minutes, costs))
    }

    /// Dissociates aggregates at the end of a cycle that feeds another one.
    pub fn harvesting(&self, allocation: &VesselAllocation) -> Result<StageCostRecord, StemforgeError> {
        let volume = allocation.max_volume_ml() * self.process.harvest_fraction;
        let reagents = self.prices.reagent(self.process.dissociation_enzyme, volume)?
            + self.prices.reagent(self.process.rock_inhibitor, volume)?;
        let minutes = 25.0 + 15.0 * allocation.vessel_count() as f64;
        Ok(self.sub_day(StageKind::Harvesting, minutes, CostBreakdown::reagent(reagents)))
    }

    /// Release testing of the final product.
    pub fn final_quality_control(
        &self,
        allocation: &VesselAllocation,
    ) -> Result<StageCostRecord, StemforgeError> {
        let vessels = allocation.vessel_count() as f64;
        let reagents = (self.flow_cytometry_panel()? + self.immunocytochemistry_panel()?) * vessels
            + self.prices.assay(QcAssayKind::Karyotyping)? * vessels
            + self.prices.assay(QcAssayKind::RtPcr)?
            + self.prices.assay(QcAssayKind::PcrGenomicScreening)?;
        let costs = CostBreakdown::reagent(reagents) + self.trilineage_panel()?;

        let minutes = 90.0 * vessels
            + (150.0 + 60.0 * (vessels - 1.0).max(0.0))
            + (120.0 + 30.0 * vessels)
            + (140.0 + 60.0 * vessels)
            + self.differentiation_minutes();
        let days = self.process.final_qc_duration_days as f64;
        Ok(self.multi_day(StageKind::FinalQualityControl, days, minutes, costs))
    }

    fn flow_cytometry_panel(&self) -> Result<f64, StemforgeError> {
        let mut cost = self.prices.assay(QcAssayKind::IntracellularFlowCytometry)? * 3.0
            + self.prices.assay(QcAssayKind::SurfaceFlowCytometry)? * 3.0;
        for antibody in [
            AntibodyKind::Oct4,
            AntibodyKind::Sox2,
            AntibodyKind::Tra160Pe,
            AntibodyKind::Ssea4Pe,
            AntibodyKind::Secondary,
        ] {
            cost += self.prices.antibody(antibody)?;
        }
        Ok(cost)
    }

    fn immunocytochemistry_panel(&self) -> Result<f64, StemforgeError> {
        let mut cost = self.prices.assay(QcAssayKind::IntracellularImmunocytochemistry)? * 3.0
            + self.prices.assay(QcAssayKind::SurfaceImmunocytochemistry)? * 3.0;
        for antibody in [
            AntibodyKind::Oct4,
            AntibodyKind::Sox2,
            AntibodyKind::Tra160,
            AntibodyKind::Ssea4,
            AntibodyKind::Secondary,
        ] {
            cost += self.prices.antibody(antibody)?;
        }
        Ok(cost)
    }

    /// Directed differentiation into the three germ layers on a small plate,
    /// with RT-PCR readout.
    fn trilineage_panel(&self) -> Result<CostBreakdown, StemforgeError> {
        let platform = self.prices.platform(self.process.differentiation_platform)?;
        let surfaces = self.process.differentiation_surfaces as f64;
        let culture_volume = platform.culture_volume_ml * surfaces;
        let plates = (surfaces / platform.surfaces.max(1) as f64).ceil() * platform.cost;

        let reagents = self
            .prices
            .reagent(self.process.coating_substrate, platform.coating_volume_ml * surfaces)?
            + self.prices.reagent(self.process.rock_inhibitor, culture_volume)?
            + self.prices.assay(QcAssayKind::TrilineageDifferentiation)?
            + self.prices.assay(QcAssayKind::RtPcr)?;
        let medium =
            self.medium_cost(culture_volume * self.process.passage_duration_days as f64)?;

        Ok(CostBreakdown::consumable(plates)
            + CostBreakdown::reagent(reagents)
            + CostBreakdown::medium(medium))
    }

    fn differentiation_minutes(&self) -> f64 {
        let surfaces = self.process.differentiation_surfaces as f64;
        5.0 + surfaces * self.process.passage_duration_days as f64 + 10.0 + 5.0 + 150.0
    }
}
