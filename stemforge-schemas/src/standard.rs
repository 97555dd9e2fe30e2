//! The built-in catalog: European list prices for a mid-size GMP facility
//! running magnetically stirred vertical-wheel bioreactors, and the
//! scenarios and studies that are evaluated against it.

use crate::{
    culture::{ScenarioConfig, StudyConfig},
    kinds::{
        AntibodyKind, CultureMedium, PlatformKind, QcAssayKind, ReagentKind, SimulationSource,
        VesselKind,
    },
    reference::{
        AntibodyPrice, ConstructionArea, EquipmentItem, ExpansionProfile, FacilitySpecs,
        LaborRole, OperatingCost, PlanarPlatform, QcAssayPrice, ReagentPrice, RecoveryProfile,
        ReferenceData, VesselType,
    },
};

const BORYS_RECOVERY: &str = "Borys2021";

/// Grid of the quality-control study. Zero detection stands for a process
/// without intermediate checks.
const QC_FAILURE_RATES: [f64; 3] = [0.2, 0.3, 0.4];
const QC_DETECTION_RATES: [f64; 5] = [0.0, 0.1, 0.2, 0.3, 0.4];

impl ReferenceData {
    /// The standard catalog used when no catalog file is supplied.
    pub fn standard() -> Self {
        Self {
            reagents: vec![
                reagent(ReagentKind::Accutase, 468.00),
                reagent(ReagentKind::B8, 9.63),
                reagent(ReagentKind::DmemF12, 54.18),
                reagent(ReagentKind::Dpbs, 40.13),
                reagent(ReagentKind::DextranSulfate, 2.79),
                reagent(ReagentKind::E8, 584.00),
                reagent(ReagentKind::Edta, 40.46),
                reagent(ReagentKind::Matrigel, 708.94),
                reagent(ReagentKind::MTeSR1, 654.00),
                reagent(ReagentKind::Y27632, 139.01),
            ],
            antibodies: vec![
                antibody(AntibodyKind::Oct4, 3.85),
                antibody(AntibodyKind::Secondary, 0.58),
                antibody(AntibodyKind::Ssea4, 0.79),
                antibody(AntibodyKind::Ssea4Pe, 0.58),
                antibody(AntibodyKind::Sox2, 3.74),
                antibody(AntibodyKind::Tra160, 0.90),
                antibody(AntibodyKind::Tra160Pe, 0.58),
            ],
            qc_assays: vec![
                assay(QcAssayKind::TrilineageDifferentiation, 85.00),
                assay(QcAssayKind::PcrGenomicScreening, 30.00),
                assay(QcAssayKind::IntracellularFlowCytometry, 1.50),
                assay(QcAssayKind::IntracellularImmunocytochemistry, 1.10),
                assay(QcAssayKind::Karyotyping, 7.00),
                assay(QcAssayKind::RtPcr, 22.50),
                assay(QcAssayKind::SurfaceFlowCytometry, 0.10),
                assay(QcAssayKind::SurfaceImmunocytochemistry, 0.20),
            ],
            platforms: vec![
                PlanarPlatform {
                    kind: PlatformKind::TwelveWell,
                    surfaces: 12,
                    coating_volume_ml: 0.5,
                    washing_volume_ml: 0.5,
                    culture_volume_ml: 1.0,
                    surface_confluency: 400_000.0,
                    confluency_std: 33_333.0,
                    cost: 2.51,
                },
                PlanarPlatform {
                    kind: PlatformKind::SixWell,
                    surfaces: 6,
                    coating_volume_ml: 1.0,
                    washing_volume_ml: 1.0,
                    culture_volume_ml: 2.0,
                    surface_confluency: 1_200_000.0,
                    confluency_std: 100_000.0,
                    cost: 2.40,
                },
            ],
            vessels: vec![
                VesselType {
                    kind: VesselKind::Pbs0p1Mag,
                    min_working_volume_ml: 60.0,
                    max_working_volume_ml: 100.0,
                    acquisition_cost: 2_473.0,
                    use_cost: 261.75,
                    energy_kwh_per_day: 0.07,
                    max_units: None,
                },
                VesselType {
                    kind: VesselKind::Pbs0p5Mag,
                    min_working_volume_ml: 300.0,
                    max_working_volume_ml: 500.0,
                    acquisition_cost: 2_473.0,
                    use_cost: 327.75,
                    energy_kwh_per_day: 0.07,
                    max_units: None,
                },
                VesselType {
                    kind: VesselKind::Pbs3Mag,
                    min_working_volume_ml: 1_800.0,
                    max_working_volume_ml: 3_000.0,
                    acquisition_cost: 65_550.0,
                    use_cost: 1_248.0,
                    energy_kwh_per_day: 8.64,
                    max_units: None,
                },
            ],
            equipment: vec![
                equipment("Autoclave", 2, 18_330.00, 240.00, 0.50),
                equipment("Biosafety Cabinet", 6, 10_865.00, 8.16, 0.50),
                equipment("Centrifuge", 6, 11_995.00, 40.80, 0.10),
                equipment("Cryo Freezer", 1, 33_491.00, 64.80, 0.05),
                equipment("Flow Cytometer", 1, 94_700.00, 3.60, 0.20),
                equipment("Fluorescence Microscope", 1, 12_245.00, 2.40, 0.10),
                equipment("Freezer (-20 °C)", 2, 9_075.00, 82.80, 0.33),
                equipment("Freezer (-80 °C)", 1, 16_760.00, 33.67, 0.33),
                equipment("Fridge", 4, 6_500.00, 82.80, 0.33),
                equipment("Incubator", 12, 9_604.00, 13.92, 0.50),
                equipment("Microscope", 6, 2_471.00, 0.72, 0.10),
                equipment("RT-PCR System", 1, 20_560.00, 10.61, 0.10),
                equipment("Spectrophotometer", 1, 10_169.39, 0.06, 0.10),
            ],
            construction: vec![
                ConstructionArea {
                    name: "Standard Rooms".to_string(),
                    area_m2: 268.0,
                    cost_per_m2: 3_692.0,
                },
                ConstructionArea {
                    name: "Clean Rooms".to_string(),
                    area_m2: 132.0,
                    cost_per_m2: 6_329.0,
                },
            ],
            operating_costs: vec![
                operating("Additional Supplies", 7_900.00),
                operating("Cleaning", 28_000.00),
                operating("Energy", 54_461.00),
                operating("Garments", 2_000.00),
                operating("Gases", 21_600.00),
                operating("Maintenance", 52_800.00),
                operating("Requalification", 65_400.00),
            ],
            labor: vec![
                LaborRole {
                    name: "Lab Technician".to_string(),
                    headcount: 6,
                    yearly_salary: 30_000.0,
                    hands_on: true,
                },
                LaborRole {
                    name: "Supervisor".to_string(),
                    headcount: 3,
                    yearly_salary: 50_000.0,
                    hands_on: false,
                },
            ],
            facility: FacilitySpecs {
                energy_cost_per_kwh: 0.12266,
                equipment_lifespan_years: 5.0,
                facility_lifespan_years: 15.0,
                parallel_processes: 6,
                working_hours_per_year: 1_920.0,
            },
            expansion_profiles: vec![
                ExpansionProfile {
                    name: "Nogueira2019".to_string(),
                    source: SimulationSource::Nogueira2019,
                    supplements: Vec::new(),
                    seeding_density: 250_000.0,
                    fold_expansion_average: 4.8,
                    fold_expansion_sem: 0.5,
                    sample_size: 3,
                    culture_days: 7,
                    medium_exchanges: 5,
                    exchange_fraction: 0.8,
                    recovery_profile: BORYS_RECOVERY.to_string(),
                },
                ExpansionProfile {
                    name: "Nogueira2019+DS".to_string(),
                    source: SimulationSource::Nogueira2019,
                    supplements: vec![ReagentKind::DextranSulfate],
                    seeding_density: 250_000.0,
                    fold_expansion_average: 9.3,
                    fold_expansion_sem: 0.6,
                    sample_size: 3,
                    culture_days: 5,
                    medium_exchanges: 3,
                    exchange_fraction: 0.8,
                    recovery_profile: BORYS_RECOVERY.to_string(),
                },
                ExpansionProfile {
                    name: "Borys2021".to_string(),
                    source: SimulationSource::Borys2021,
                    supplements: Vec::new(),
                    seeding_density: 20_000.0,
                    fold_expansion_average: 32.3,
                    fold_expansion_sem: 3.2,
                    sample_size: 4,
                    culture_days: 6,
                    medium_exchanges: 1,
                    exchange_fraction: 0.5,
                    recovery_profile: BORYS_RECOVERY.to_string(),
                },
            ],
            recovery_profiles: vec![RecoveryProfile {
                name: BORYS_RECOVERY.to_string(),
                recovery_efficiency_average: 0.952,
                recovery_efficiency_sem: 0.040,
                sample_size: 4,
            }],
        }
    }
}

impl ScenarioConfig {
    /// Default expansion: 1e6 thawed cells to 2e9 in mTeSR1.
    pub fn standard(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initial_cell_number: 1_000_000,
            target_cell_number: 2_000_000_000,
            culture_medium: CultureMedium::MTeSR1,
            initial_volume_ml: 60.0,
            simulation_source: SimulationSource::Nogueira2019,
            ds_supplementation: false,
            minimum_threshold: 0.95,
            failure_probability: 0.1,
            qc_detection_probability: 0.2,
            efficacy: None,
            culture_days: None,
            medium_exchanges: None,
        }
    }
}

/// Named scenarios shipped with the catalog.
pub fn standard_scenarios() -> Vec<ScenarioConfig> {
    let mut scenarios = vec![
        ScenarioConfig::standard("Default"),
        ScenarioConfig {
            ds_supplementation: true,
            ..ScenarioConfig::standard("DS Supplementation")
        },
        ScenarioConfig {
            simulation_source: SimulationSource::Borys2021,
            ..ScenarioConfig::standard("Low-Density Inoculation")
        },
    ];
    scenarios.extend(b8_scenarios());
    scenarios
}

fn b8_scenarios() -> Vec<ScenarioConfig> {
    [("0.75x", 0.75, 8, 6), ("1x", 1.0, 7, 5), ("1.5x", 1.5, 6, 4), ("2x", 2.0, 5, 3)]
        .into_iter()
        .map(|(label, efficacy, days, exchanges)| ScenarioConfig {
            culture_medium: CultureMedium::B8,
            efficacy: Some(efficacy),
            culture_days: Some(days),
            medium_exchanges: Some(exchanges),
            ..ScenarioConfig::standard(&format!("B8-{}", label))
        })
        .collect()
}

/// Comparison studies shipped with the catalog.
pub fn standard_studies() -> Vec<StudyConfig> {
    let default = ScenarioConfig::standard("Default");
    let scenarios = standard_scenarios();
    let named = |name: &str| scenarios.iter().find(|s| s.name == name).cloned();

    vec![
        StudyConfig {
            name: "ds".to_string(),
            description: Some("Dextran sulfate supplementation".to_string()),
            scenarios: [named("Default"), named("DS Supplementation")]
                .into_iter()
                .flatten()
                .collect(),
        },
        StudyConfig {
            name: "density".to_string(),
            description: Some("Seeding density at inoculation".to_string()),
            scenarios: [named("Default"), named("Low-Density Inoculation")]
                .into_iter()
                .flatten()
                .collect(),
        },
        StudyConfig {
            name: "b8".to_string(),
            description: Some("B8 medium growth-factor concentration".to_string()),
            scenarios: b8_scenarios(),
        },
        StudyConfig {
            name: "qual".to_string(),
            description: Some(
                "Failure rate against quality-control detection probability".to_string(),
            ),
            scenarios: QC_FAILURE_RATES
                .into_iter()
                .flat_map(|failure| {
                    QC_DETECTION_RATES.into_iter().map(move |detection| (failure, detection))
                })
                .map(|(failure, detection)| ScenarioConfig {
                    name: format!("Failure {:.0}% QC {:.0}%", failure * 100.0, detection * 100.0),
                    failure_probability: failure,
                    qc_detection_probability: detection,
                    ..default.clone()
                })
                .collect(),
        },
    ]
}

fn reagent(reagent: ReagentKind, cost_per_l: f64) -> ReagentPrice {
    ReagentPrice { reagent, cost_per_l }
}

fn antibody(antibody: AntibodyKind, cost_per_use: f64) -> AntibodyPrice {
    AntibodyPrice { antibody, cost_per_use }
}

fn assay(assay: QcAssayKind, cost_per_run: f64) -> QcAssayPrice {
    QcAssayPrice { assay, cost_per_run }
}

fn equipment(
    name: &str,
    amount: u32,
    acquisition_cost: f64,
    energy_kwh_per_day: f64,
    use_factor: f64,
) -> EquipmentItem {
    EquipmentItem {
        name: name.to_string(),
        amount,
        acquisition_cost,
        energy_kwh_per_day,
        use_factor,
    }
}

fn operating(name: &str, yearly_cost: f64) -> OperatingCost {
    OperatingCost {
        name: name.to_string(),
        yearly_cost,
    }
}
