use crate::kinds::{
    AntibodyKind, PlatformKind, QcAssayKind, ReagentKind, SimulationSource, VesselKind,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReagentPrice {
    pub reagent: ReagentKind,
    /// Price in currency units per litre.
    pub cost_per_l: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntibodyPrice {
    pub antibody: AntibodyKind,
    pub cost_per_use: f64,
}

/// Cost of the reagents exclusive to one assay run. Shared reagents such as
/// medium or coating are priced separately when the assay is costed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcAssayPrice {
    pub assay: QcAssayKind,
    pub cost_per_run: f64,
}

/// A multi-well plate used for planar (2D) culture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanarPlatform {
    pub kind: PlatformKind,
    /// Culture surfaces (wells) per plate.
    pub surfaces: u32,
    pub coating_volume_ml: f64,
    pub washing_volume_ml: f64,
    pub culture_volume_ml: f64,
    /// Cells per surface at confluency.
    pub surface_confluency: f64,
    pub confluency_std: f64,
    /// Price of one plate.
    pub cost: f64,
}

/// A bioreactor vessel size that working volumes can be allocated to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselType {
    pub kind: VesselKind,
    pub min_working_volume_ml: f64,
    pub max_working_volume_ml: f64,
    /// One-off purchase price of the vessel's base unit.
    pub acquisition_cost: f64,
    /// Single-use cost charged every time a vessel is inoculated.
    pub use_cost: f64,
    pub energy_kwh_per_day: f64,
    /// Base units installed in the facility. `None` means unconstrained.
    #[serde(default)]
    pub max_units: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub name: String,
    pub amount: u32,
    pub acquisition_cost: f64,
    pub energy_kwh_per_day: f64,
    /// Fraction of the day the equipment is switched on.
    pub use_factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionArea {
    pub name: String,
    pub area_m2: f64,
    pub cost_per_m2: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingCost {
    pub name: String,
    pub yearly_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaborRole {
    pub name: String,
    pub headcount: u32,
    pub yearly_salary: f64,
    /// Whether the role performs bench work billed at the hourly wage.
    #[serde(default)]
    pub hands_on: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilitySpecs {
    pub energy_cost_per_kwh: f64,
    pub equipment_lifespan_years: f64,
    pub facility_lifespan_years: f64,
    /// Bioprocesses the facility runs side by side, sharing its daily costs.
    pub parallel_processes: u32,
    pub working_hours_per_year: f64,
}

/// Fold-expansion measurements for one published expansion protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionProfile {
    pub name: String,
    pub source: SimulationSource,
    #[serde(default)]
    pub supplements: Vec<ReagentKind>,
    /// Cells per mL at inoculation.
    pub seeding_density: f64,
    pub fold_expansion_average: f64,
    pub fold_expansion_sem: f64,
    pub sample_size: u32,
    pub culture_days: u32,
    pub medium_exchanges: u32,
    /// Fraction of the working volume replaced at every exchange.
    pub exchange_fraction: f64,
    /// Name of the recovery profile measured alongside this protocol.
    pub recovery_profile: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryProfile {
    pub name: String,
    pub recovery_efficiency_average: f64,
    pub recovery_efficiency_sem: f64,
    pub sample_size: u32,
}

/// The immutable price and parameter catalog every costing step reads from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub reagents: Vec<ReagentPrice>,
    pub antibodies: Vec<AntibodyPrice>,
    pub qc_assays: Vec<QcAssayPrice>,
    pub platforms: Vec<PlanarPlatform>,
    pub vessels: Vec<VesselType>,
    pub equipment: Vec<EquipmentItem>,
    pub construction: Vec<ConstructionArea>,
    pub operating_costs: Vec<OperatingCost>,
    pub labor: Vec<LaborRole>,
    pub facility: FacilitySpecs,
    pub expansion_profiles: Vec<ExpansionProfile>,
    pub recovery_profiles: Vec<RecoveryProfile>,
}

impl ReferenceData {
    pub fn reagent_price(&self, reagent: ReagentKind) -> Option<f64> {
        self.reagents
            .iter()
            .find(|r| r.reagent == reagent)
            .map(|r| r.cost_per_l)
    }

    pub fn antibody_price(&self, antibody: AntibodyKind) -> Option<f64> {
        self.antibodies
            .iter()
            .find(|a| a.antibody == antibody)
            .map(|a| a.cost_per_use)
    }

    pub fn qc_assay_price(&self, assay: QcAssayKind) -> Option<f64> {
        self.qc_assays
            .iter()
            .find(|q| q.assay == assay)
            .map(|q| q.cost_per_run)
    }

    pub fn platform(&self, kind: PlatformKind) -> Option<&PlanarPlatform> {
        self.platforms.iter().find(|p| p.kind == kind)
    }

    pub fn vessel(&self, kind: VesselKind) -> Option<&VesselType> {
        self.vessels.iter().find(|v| v.kind == kind)
    }

    /// Finds the expansion profile for a source, picking the supplemented
    /// variant when `supplemented` is set.
    pub fn expansion_profile(
        &self,
        source: SimulationSource,
        supplemented: bool,
    ) -> Option<&ExpansionProfile> {
        self.expansion_profiles
            .iter()
            .find(|p| p.source == source && p.supplements.is_empty() != supplemented)
    }

    pub fn recovery_profile(&self, name: &str) -> Option<&RecoveryProfile> {
        self.recovery_profiles.iter().find(|r| r.name == name)
    }
}
