//! Facility and labor rates, and typed price lookups into the catalog.

use crate::error::StemforgeError;
use serde::Serialize;
use stemforge_schemas::{
    kinds::{AntibodyKind, PlatformKind, QcAssayKind, ReagentKind, VesselKind},
    reference::{PlanarPlatform, ReferenceData, VesselType},
};

pub const DAYS_PER_YEAR: f64 = 365.25;

/// Price lookups that fail with `UnknownReference` instead of returning `None`.
#[derive(Debug, Clone, Copy)]
pub struct Prices<'a> {
    reference: &'a ReferenceData,
}

impl<'a> Prices<'a> {
    pub fn new(reference: &'a ReferenceData) -> Self {
        Self { reference }
    }

    /// Cost of `volume_ml` of a reagent priced per litre.
    pub fn reagent(&self, reagent: ReagentKind, volume_ml: f64) -> Result<f64, StemforgeError> {
        self.reference
            .reagent_price(reagent)
            .map(|per_l| per_l * volume_ml * 1e-3)
            .ok_or_else(|| StemforgeError::unknown("reagent", reagent))
    }

    pub fn antibody(&self, antibody: AntibodyKind) -> Result<f64, StemforgeError> {
        self.reference
            .antibody_price(antibody)
            .ok_or_else(|| StemforgeError::unknown("antibody", antibody))
    }

    pub fn assay(&self, assay: QcAssayKind) -> Result<f64, StemforgeError> {
        self.reference
            .qc_assay_price(assay)
            .ok_or_else(|| StemforgeError::unknown("QC assay", assay))
    }

    pub fn platform(&self, kind: PlatformKind) -> Result<&'a PlanarPlatform, StemforgeError> {
        self.reference
            .platform(kind)
            .ok_or_else(|| StemforgeError::unknown("planar platform", kind))
    }

    pub fn vessel(&self, kind: VesselKind) -> Result<&'a VesselType, StemforgeError> {
        self.reference
            .vessel(kind)
            .ok_or_else(|| StemforgeError::unknown("vessel", kind))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityRates {
    /// Whole-facility cost per day: depreciation, operating costs and equipment energy.
    pub daily_facility_cost: f64,
    pub daily_labor_cost: f64,
    pub hourly_facility_cost: f64,
    pub hourly_wage: f64,
    pub parallel_processes: f64,
    pub energy_cost_per_kwh: f64,
    pub equipment_lifespan_days: f64,
}

impl FacilityRates {
    pub fn from_reference(reference: &ReferenceData) -> Result<Self, StemforgeError> {
        let facility = &reference.facility;
        if facility.parallel_processes == 0 {
            return Err(StemforgeError::Configuration(
                "the facility must run at least one process".to_string(),
            ));
        }
        if !(facility.facility_lifespan_years > 0.0
            && facility.equipment_lifespan_years > 0.0
            && facility.working_hours_per_year > 0.0)
        {
            return Err(StemforgeError::Configuration(
                "facility lifespans and working hours must be positive".to_string(),
            ));
        }

        let construction: f64 = reference
            .construction
            .iter()
            .map(|c| c.area_m2 * c.cost_per_m2)
            .sum::<f64>()
            / (facility.facility_lifespan_years * DAYS_PER_YEAR);
        let equipment: f64 = reference
            .equipment
            .iter()
            .map(|e| e.amount as f64 * e.acquisition_cost)
            .sum::<f64>()
            / (facility.equipment_lifespan_years * DAYS_PER_YEAR);
        let operating: f64 = reference.operating_costs.iter().map(|o| o.yearly_cost).sum::<f64>() / DAYS_PER_YEAR;
        let energy: f64 = reference
            .equipment
            .iter()
            .map(|e| e.amount as f64 * e.energy_kwh_per_day * e.use_factor * facility.energy_cost_per_kwh)
            .sum();
        let daily_facility_cost = construction + equipment + operating + energy;

        let daily_labor_cost = reference
            .labor
            .iter()
            .map(|r| r.headcount as f64 * r.yearly_salary)
            .sum::<f64>()
            / DAYS_PER_YEAR;

        let (hands_on_salaries, hands_on_headcount) = reference
            .labor
            .iter()
            .filter(|r| r.hands_on)
            .fold((0.0, 0u32), |(salaries, heads), r| {
                (salaries + r.headcount as f64 * r.yearly_salary, heads + r.headcount)
            });
        if hands_on_headcount == 0 {
            return Err(StemforgeError::Configuration(
                "the labor table has no hands-on role to bill bench work to".to_string(),
            ));
        }
        let hourly_wage = hands_on_salaries / hands_on_headcount as f64 / facility.working_hours_per_year;

        Ok(Self {
            daily_facility_cost,
            daily_labor_cost,
            hourly_facility_cost: daily_facility_cost / 24.0,
            hourly_wage,
            parallel_processes: facility.parallel_processes as f64,
            energy_cost_per_kwh: facility.energy_cost_per_kwh,
            equipment_lifespan_days: facility.equipment_lifespan_years * DAYS_PER_YEAR,
        })
    }

    /// Facility share of a process occupying `days`, split across parallel processes.
    pub fn facility_for_days(&self, days: f64) -> f64 {
        self.daily_facility_cost * days / self.parallel_processes
    }

    pub fn labor_for_days(&self, days: f64) -> f64 {
        self.daily_labor_cost * days / self.parallel_processes
    }

    pub fn facility_for_hours(&self, hours: f64) -> f64 {
        self.hourly_facility_cost * hours
    }

    pub fn labor_for_hours(&self, hours: f64) -> f64 {
        self.hourly_wage * hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_rates() {
        let reference = ReferenceData::standard();
        let rates = FacilityRates::from_reference(&reference).unwrap();

        let labor = (6.0 * 30_000.0 + 3.0 * 50_000.0) / DAYS_PER_YEAR;
        assert!((rates.daily_labor_cost - labor).abs() < 1e-9);
        assert!((rates.hourly_wage - 30_000.0 / 1_920.0).abs() < 1e-12);
        assert!((rates.hourly_facility_cost * 24.0 - rates.daily_facility_cost).abs() < 1e-9);

        let construction = (268.0 * 3_692.0 + 132.0 * 6_329.0) / (15.0 * DAYS_PER_YEAR);
        assert!(rates.daily_facility_cost > construction);
        assert!((rates.facility_for_days(6.0) - rates.daily_facility_cost).abs() < 1e-9);
    }

    #[test]
    fn facility_without_bench_staff_is_rejected() {
        let mut reference = ReferenceData::standard();
        reference.labor.retain(|r| !r.hands_on);
        assert!(FacilityRates::from_reference(&reference).unwrap_err().is_configuration());
    }

    #[test]
    fn missing_prices_name_the_key() {
        let mut reference = ReferenceData::standard();
        reference.reagents.retain(|r| r.reagent != ReagentKind::Accutase);
        let prices = Prices::new(&reference);
        let err = prices.reagent(ReagentKind::Accutase, 10.0).unwrap_err();
        assert_eq!(err.to_string(), "Unknown reagent 'Accutase' in reference data");
        assert!((prices.reagent(ReagentKind::Dpbs, 500.0).unwrap() - 40.13 * 0.5).abs() < 1e-9);
    }
}
