//! Mapping continuous working volumes onto discrete bioreactor vessels.

use crate::error::StemforgeError;
use serde::Serialize;
use stemforge_schemas::{
    kinds::VesselKind,
    reference::{ReferenceData, VesselType},
    settings::AllocationPolicy,
};
use tracing::debug;

/// Relative slack when comparing volumes that went through rounding.
const VOLUME_TOLERANCE: f64 = 1e-9;

/// Vessels of one type used in a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationLine {
    pub vessel: VesselKind,
    pub count: u32,
    pub volume_per_vessel_ml: f64,
    pub min_working_volume_ml: f64,
    pub max_working_volume_ml: f64,
    /// Single-use cost of all vessels on the line.
    pub use_cost: f64,
    pub acquisition_cost: f64,
    pub energy_kwh_per_day: f64,
}

impl AllocationLine {
    pub fn volume_ml(&self) -> f64 {
        self.count as f64 * self.volume_per_vessel_ml
    }

    pub fn max_volume_ml(&self) -> f64 {
        self.count as f64 * self.max_working_volume_ml
    }

    pub fn total_cost(&self) -> f64 {
        self.use_cost + self.acquisition_cost
    }
}

/// The vessels chosen for one expansion cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VesselAllocation {
    pub requested_volume_ml: f64,
    /// Smallest volume the chosen vessels can be run at. Exceeds the request
    /// when the vessels cannot be filled to their minimum with it.
    pub required_volume_ml: f64,
    pub lines: Vec<AllocationLine>,
}

impl VesselAllocation {
    pub fn vessel_count(&self) -> u32 {
        self.lines.iter().map(|l| l.count).sum()
    }

    /// Working volume actually inoculated across all vessels.
    pub fn volume_ml(&self) -> f64 {
        self.lines.iter().map(AllocationLine::volume_ml).sum()
    }

    pub fn max_volume_ml(&self) -> f64 {
        self.lines.iter().map(AllocationLine::max_volume_ml).sum()
    }

    pub fn use_cost(&self) -> f64 {
        self.lines.iter().map(|l| l.use_cost).sum()
    }

    pub fn acquisition_cost(&self) -> f64 {
        self.lines.iter().map(|l| l.acquisition_cost).sum()
    }

    pub fn energy_kwh_per_day(&self) -> f64 {
        self.lines.iter().map(|l| l.energy_kwh_per_day).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.use_cost() + self.acquisition_cost()
    }

    pub fn needs_more_volume(&self) -> bool {
        self.required_volume_ml > self.requested_volume_ml * (1.0 + VOLUME_TOLERANCE)
    }
}

/// Chooses vessel combinations from a fixed catalog.
#[derive(Debug, Clone)]
pub struct VesselAllocator {
    /// Ascending by maximum working volume.
    catalog: Vec<VesselType>,
    min_usable_volume_ml: f64,
    volume_increment_ml: f64,
    substitute_final_cycle: bool,
}

impl VesselAllocator {
    /// Builds an allocator over the `in_use` subset of the reference vessels.
    ///
    /// # Errors
    ///
    /// Returns `StemforgeError::UnknownReference` for a vessel missing from the
    /// catalog and `StemforgeError::Configuration` for an empty selection,
    /// inconsistent vessel ranges, or a policy that undercuts the smallest vessel.
    pub fn new(
        reference: &ReferenceData,
        in_use: &[VesselKind],
        policy: &AllocationPolicy,
    ) -> Result<Self, StemforgeError> {
        let catalog = in_use
            .iter()
            .map(|&kind| {
                reference
                    .vessel(kind)
                    .cloned()
                    .ok_or_else(|| StemforgeError::unknown("vessel", kind))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_catalog(catalog, policy)
    }

    pub fn from_catalog(
        mut catalog: Vec<VesselType>,
        policy: &AllocationPolicy,
    ) -> Result<Self, StemforgeError> {
        if catalog.is_empty() {
            return Err(StemforgeError::Configuration(
                "at least one vessel type must be in use".to_string(),
            ));
        }
        for vessel in &catalog {
            if !(vessel.min_working_volume_ml > 0.0
                && vessel.max_working_volume_ml >= vessel.min_working_volume_ml)
            {
                return Err(StemforgeError::Configuration(format!(
                    "{} has an invalid working volume range {}-{} mL",
                    vessel.kind, vessel.min_working_volume_ml, vessel.max_working_volume_ml
                )));
            }
        }
        if !(policy.volume_increment_ml > 0.0) {
            return Err(StemforgeError::Configuration(format!(
                "volume increment must be positive, got {}",
                policy.volume_increment_ml
            )));
        }
        catalog.sort_by(|a, b| a.max_working_volume_ml.total_cmp(&b.max_working_volume_ml));
        catalog.dedup_by_key(|v| v.kind);

        let smallest_min = catalog
            .iter()
            .map(|v| v.min_working_volume_ml)
            .fold(f64::INFINITY, f64::min);
        let min_usable_volume_ml = policy.min_usable_volume_ml.unwrap_or(smallest_min);
        if min_usable_volume_ml < smallest_min {
            return Err(StemforgeError::Configuration(format!(
                "minimum usable volume {} mL is below the smallest vessel minimum {} mL",
                min_usable_volume_ml, smallest_min
            )));
        }

        Ok(Self {
            catalog,
            min_usable_volume_ml,
            volume_increment_ml: policy.volume_increment_ml,
            substitute_final_cycle: policy.substitute_final_cycle,
        })
    }

    pub fn catalog(&self) -> &[VesselType] {
        &self.catalog
    }

    pub fn min_usable_volume_ml(&self) -> f64 {
        self.min_usable_volume_ml
    }

    /// Maximum working volume of the largest vessel type.
    pub fn largest_vessel_ml(&self) -> f64 {
        self.catalog
            .iter()
            .map(|v| v.max_working_volume_ml)
            .fold(0.0, f64::max)
    }

    /// Largest working volume the catalog can hold, if unit counts are capped.
    pub fn max_capacity_ml(&self) -> Option<f64> {
        self.catalog
            .iter()
            .map(|v| v.max_units.map(|units| units as f64 * v.max_working_volume_ml))
            .sum()
    }

    /// Allocates vessels for one cycle's working volume.
    ///
    /// The vessel type needing the fewest vessels wins. When that takes two or
    /// more vessels, dropping one of them and covering the residual with smaller
    /// vessels is tried, and kept if its single-use cost is lower.
    pub fn allocate(
        &self,
        volume_ml: f64,
        final_cycle: bool,
    ) -> Result<VesselAllocation, StemforgeError> {
        if !(volume_ml > 0.0 && volume_ml.is_finite()) {
            return Err(StemforgeError::Configuration(format!(
                "working volume must be positive, got {}",
                volume_ml
            )));
        }
        let allow_substitution = !final_cycle || self.substitute_final_cycle;
        let mut allocation = self.allocate_within(volume_ml, &self.catalog, allow_substitution)?;
        allocation.requested_volume_ml = volume_ml;
        Ok(allocation)
    }

    fn allocate_within(
        &self,
        volume_ml: f64,
        catalog: &[VesselType],
        allow_substitution: bool,
    ) -> Result<VesselAllocation, StemforgeError> {
        let volume = volume_ml.max(self.min_usable_volume_ml);
        let (index, count) = select_vessel(volume, catalog).ok_or_else(|| {
            StemforgeError::Allocation(format!(
                "no vessel type can hold {:.1} mL within its working range and unit limit",
                volume
            ))
        })?;
        let primary = &catalog[index];
        let single = self.uniform_allocation(volume_ml, volume, primary, count);

        if !allow_substitution || count < 2 {
            return Ok(single);
        }
        let smaller: Vec<VesselType> = catalog[..index]
            .iter()
            .filter(|v| v.max_working_volume_ml < primary.max_working_volume_ml)
            .cloned()
            .collect();
        if smaller.is_empty() {
            return Ok(single);
        }

        let kept = count - 1;
        let residual = volume - kept as f64 * primary.max_working_volume_ml;
        let residual_allocation = match self.allocate_within(residual, &smaller, true) {
            Ok(allocation) => allocation,
            Err(StemforgeError::Allocation(_)) => return Ok(single),
            Err(e) => return Err(e),
        };

        let substitute_cost = kept as f64 * primary.use_cost + residual_allocation.use_cost();
        if substitute_cost < single.use_cost() {
            debug!(
                volume_ml = volume,
                vessel = %primary.kind,
                residual_ml = residual,
                saving = single.use_cost() - substitute_cost,
                "substituting smaller vessels for one {}",
                primary.kind
            );
            let mut lines = vec![line(primary, kept, primary.max_working_volume_ml)];
            lines.extend(residual_allocation.lines);
            let required = kept as f64 * primary.max_working_volume_ml
                + residual_allocation.required_volume_ml;
            return Ok(VesselAllocation {
                requested_volume_ml: volume_ml,
                required_volume_ml: required.max(volume),
                lines,
            });
        }
        Ok(single)
    }

    /// `count` vessels of one type sharing the volume evenly.
    fn uniform_allocation(
        &self,
        requested_ml: f64,
        volume_ml: f64,
        vessel: &VesselType,
        count: u32,
    ) -> VesselAllocation {
        let share = volume_ml / count as f64;
        let rounded = (share / self.volume_increment_ml).ceil() * self.volume_increment_ml;
        let per_vessel = rounded
            .max(vessel.min_working_volume_ml)
            .min(vessel.max_working_volume_ml);
        let filled = vessel.min_working_volume_ml * count as f64;
        VesselAllocation {
            requested_volume_ml: requested_ml,
            required_volume_ml: volume_ml.max(filled),
            lines: vec![line(vessel, count, per_vessel)],
        }
    }
}

/// Index of the vessel type needing the fewest vessels for `volume_ml`, with
/// that count. Types that cannot fill a single vessel to its minimum, or whose
/// unit limit is exceeded, are skipped. Ties go to the cheaper combination.
fn select_vessel(volume_ml: f64, catalog: &[VesselType]) -> Option<(usize, u32)> {
    catalog
        .iter()
        .enumerate()
        .filter_map(|(index, vessel)| {
            let fillable = (volume_ml / vessel.min_working_volume_ml + VOLUME_TOLERANCE).floor();
            let needed = (volume_ml / vessel.max_working_volume_ml - VOLUME_TOLERANCE).ceil().max(1.0);
            if fillable < 1.0 {
                return None;
            }
            let needed = needed as u32;
            if vessel.max_units.map_or(false, |units| needed > units) {
                return None;
            }
            Some((index, needed, needed as f64 * vessel.use_cost))
        })
        .min_by(|a, b| a.1.cmp(&b.1).then(a.2.total_cmp(&b.2)))
        .map(|(index, needed, _)| (index, needed))
}

fn line(vessel: &VesselType, count: u32, volume_per_vessel_ml: f64) -> AllocationLine {
    AllocationLine {
        vessel: vessel.kind,
        count,
        volume_per_vessel_ml,
        min_working_volume_ml: vessel.min_working_volume_ml,
        max_working_volume_ml: vessel.max_working_volume_ml,
        use_cost: count as f64 * vessel.use_cost,
        acquisition_cost: count as f64 * vessel.acquisition_cost,
        energy_kwh_per_day: count as f64 * vessel.energy_kwh_per_day,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemforge_schemas::settings::ProcessSettings;

    fn allocator() -> VesselAllocator {
        VesselAllocator::new(
            &ReferenceData::standard(),
            &ProcessSettings::default().vessels,
            &AllocationPolicy::default(),
        )
        .unwrap()
    }

    fn kinds(allocation: &VesselAllocation) -> Vec<(VesselKind, u32)> {
        allocation.lines.iter().map(|l| (l.vessel, l.count)).collect()
    }

    #[test]
    fn small_volume_uses_one_small_vessel() {
        let allocation = allocator().allocate(60.0, false).unwrap();
        assert_eq!(kinds(&allocation), vec![(VesselKind::Pbs0p1Mag, 1)]);
        assert_eq!(allocation.lines[0].volume_per_vessel_ml, 60.0);
        assert!(!allocation.needs_more_volume());
    }

    #[test]
    fn volume_below_minimum_is_rounded_up() {
        let allocation = allocator().allocate(40.0, false).unwrap();
        assert_eq!(allocation.required_volume_ml, 60.0);
        assert!(allocation.needs_more_volume());
        assert_eq!(allocation.lines[0].volume_per_vessel_ml, 60.0);
    }

    #[test]
    fn fewest_vessels_wins() {
        let allocation = allocator().allocate(2_400.0, true).unwrap();
        assert_eq!(kinds(&allocation), vec![(VesselKind::Pbs3Mag, 1)]);
    }

    #[test]
    fn cheaper_smaller_vessels_replace_an_extra_large_one() {
        // 2 x 3MAG would cost 2496; 1 x 3MAG + 1 x 0.1MAG costs 1509.75
        let allocation = allocator().allocate(3_100.0, false).unwrap();
        assert_eq!(
            kinds(&allocation),
            vec![(VesselKind::Pbs3Mag, 1), (VesselKind::Pbs0p1Mag, 1)]
        );
        assert!(allocation.volume_ml() >= 3_100.0);
        assert!(!allocation.needs_more_volume());
    }

    #[test]
    fn final_cycle_keeps_large_vessels_and_fills_them() {
        let allocation = allocator().allocate(3_100.0, true).unwrap();
        assert_eq!(kinds(&allocation), vec![(VesselKind::Pbs3Mag, 2)]);
        assert_eq!(allocation.required_volume_ml, 3_600.0);
        assert_eq!(allocation.lines[0].volume_per_vessel_ml, 1_800.0);
        assert!(allocation.needs_more_volume());
    }

    #[test]
    fn even_split_rounds_up_to_increment() {
        let policy = AllocationPolicy {
            volume_increment_ml: 10.0,
            ..AllocationPolicy::default()
        };
        let allocator =
            VesselAllocator::new(&ReferenceData::standard(), &ProcessSettings::default().vessels, &policy)
                .unwrap();
        let allocation = allocator.allocate(1_234.0, true).unwrap();
        assert_eq!(kinds(&allocation), vec![(VesselKind::Pbs0p5Mag, 3)]);
        assert_eq!(allocation.lines[0].volume_per_vessel_ml, 420.0);
    }

    #[test]
    fn unit_limits_surface_as_allocation_errors() {
        let mut reference = ReferenceData::standard();
        for vessel in &mut reference.vessels {
            vessel.max_units = Some(2);
        }
        let allocator = VesselAllocator::new(
            &reference,
            &ProcessSettings::default().vessels,
            &AllocationPolicy::default(),
        )
        .unwrap();
        assert_eq!(allocator.max_capacity_ml(), Some(7_200.0));
        assert_eq!(allocator.largest_vessel_ml(), 3_000.0);
        let err = allocator.allocate(9_000.0, true).unwrap_err();
        assert!(matches!(err, StemforgeError::Allocation(_)));
    }

    #[test]
    fn policy_below_smallest_vessel_is_rejected() {
        let policy = AllocationPolicy {
            min_usable_volume_ml: Some(30.0),
            ..AllocationPolicy::default()
        };
        let err = VesselAllocator::new(
            &ReferenceData::standard(),
            &ProcessSettings::default().vessels,
            &policy,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
