//! Typed keys for every table in the reference catalog.
//!
//! Each enum serialises to the human-readable name used in catalog files,
//! so a YAML table row reads `reagent: mTeSR1` rather than an internal code.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReagentKind {
    Accutase,
    B8,
    #[serde(rename = "DMEM/F-12")]
    DmemF12,
    #[serde(rename = "DPBS")]
    Dpbs,
    #[serde(rename = "Dextran Sulfate")]
    DextranSulfate,
    E8,
    #[serde(rename = "EDTA")]
    Edta,
    Matrigel,
    #[serde(rename = "mTeSR1")]
    MTeSR1,
    #[serde(rename = "Y-27632")]
    Y27632,
}

impl fmt::Display for ReagentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReagentKind::Accutase => "Accutase",
            ReagentKind::B8 => "B8",
            ReagentKind::DmemF12 => "DMEM/F-12",
            ReagentKind::Dpbs => "DPBS",
            ReagentKind::DextranSulfate => "Dextran Sulfate",
            ReagentKind::E8 => "E8",
            ReagentKind::Edta => "EDTA",
            ReagentKind::Matrigel => "Matrigel",
            ReagentKind::MTeSR1 => "mTeSR1",
            ReagentKind::Y27632 => "Y-27632",
        };
        f.write_str(name)
    }
}

/// hiPSC maintenance media a scenario can be cultured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CultureMedium {
    #[serde(rename = "mTeSR1")]
    MTeSR1,
    E8,
    B8,
}

impl CultureMedium {
    /// The reagent row that prices this medium.
    pub fn reagent(self) -> ReagentKind {
        match self {
            CultureMedium::MTeSR1 => ReagentKind::MTeSR1,
            CultureMedium::E8 => ReagentKind::E8,
            CultureMedium::B8 => ReagentKind::B8,
        }
    }
}

impl fmt::Display for CultureMedium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reagent().fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VesselKind {
    #[serde(rename = "PBS 0.1MAG")]
    Pbs0p1Mag,
    #[serde(rename = "PBS 0.5MAG")]
    Pbs0p5Mag,
    #[serde(rename = "PBS 3MAG")]
    Pbs3Mag,
}

impl fmt::Display for VesselKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VesselKind::Pbs0p1Mag => "PBS 0.1MAG",
            VesselKind::Pbs0p5Mag => "PBS 0.5MAG",
            VesselKind::Pbs3Mag => "PBS 3MAG",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformKind {
    #[serde(rename = "12-well")]
    TwelveWell,
    #[serde(rename = "6-well")]
    SixWell,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::TwelveWell => f.write_str("12-well"),
            PlatformKind::SixWell => f.write_str("6-well"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QcAssayKind {
    #[serde(rename = "Trilineage Differentiation")]
    TrilineageDifferentiation,
    #[serde(rename = "PCR Genomic Screening")]
    PcrGenomicScreening,
    #[serde(rename = "Intracellular FC")]
    IntracellularFlowCytometry,
    #[serde(rename = "Intracellular Immunocytochemistry")]
    IntracellularImmunocytochemistry,
    Karyotyping,
    #[serde(rename = "RT-PCR")]
    RtPcr,
    #[serde(rename = "Surface FC")]
    SurfaceFlowCytometry,
    #[serde(rename = "Surface Immunocytochemistry")]
    SurfaceImmunocytochemistry,
}

impl fmt::Display for QcAssayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QcAssayKind::TrilineageDifferentiation => "Trilineage Differentiation",
            QcAssayKind::PcrGenomicScreening => "PCR Genomic Screening",
            QcAssayKind::IntracellularFlowCytometry => "Intracellular FC",
            QcAssayKind::IntracellularImmunocytochemistry => "Intracellular Immunocytochemistry",
            QcAssayKind::Karyotyping => "Karyotyping",
            QcAssayKind::RtPcr => "RT-PCR",
            QcAssayKind::SurfaceFlowCytometry => "Surface FC",
            QcAssayKind::SurfaceImmunocytochemistry => "Surface Immunocytochemistry",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AntibodyKind {
    #[serde(rename = "OCT4")]
    Oct4,
    #[serde(rename = "Secondary Antibody")]
    Secondary,
    #[serde(rename = "SSEA-4")]
    Ssea4,
    #[serde(rename = "SSEA-4-PE")]
    Ssea4Pe,
    #[serde(rename = "SOX2")]
    Sox2,
    #[serde(rename = "TRA-1-60")]
    Tra160,
    #[serde(rename = "TRA-1-60-PE")]
    Tra160Pe,
}

impl fmt::Display for AntibodyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AntibodyKind::Oct4 => "OCT4",
            AntibodyKind::Secondary => "Secondary Antibody",
            AntibodyKind::Ssea4 => "SSEA-4",
            AntibodyKind::Ssea4Pe => "SSEA-4-PE",
            AntibodyKind::Sox2 => "SOX2",
            AntibodyKind::Tra160 => "TRA-1-60",
            AntibodyKind::Tra160Pe => "TRA-1-60-PE",
        };
        f.write_str(name)
    }
}

/// Published expansion datasets the fold-expansion distributions are fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimulationSource {
    Nogueira2019,
    Borys2021,
}

impl fmt::Display for SimulationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationSource::Nogueira2019 => f.write_str("Nogueira2019"),
            SimulationSource::Borys2021 => f.write_str("Borys2021"),
        }
    }
}
