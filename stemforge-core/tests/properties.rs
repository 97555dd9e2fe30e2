use proptest::prelude::*;
use stemforge_core::{
    allocation::VesselAllocator,
    analysis::{aggregate_cycles, apply_failure_model, failure_detection_probabilities, CycleRecord, StageColumns},
    optimizer::reconcile_volumes,
    stages::CostBreakdown,
};
use stemforge_schemas::{
    kinds::VesselKind,
    reference::{ReferenceData, VesselType},
    settings::{AllocationPolicy, ProcessSettings},
};

fn allocator() -> VesselAllocator {
    VesselAllocator::new(
        &ReferenceData::standard(),
        &ProcessSettings::default().vessels,
        &AllocationPolicy::default(),
    )
    .unwrap()
}

fn vessel_type(kind: VesselKind) -> impl Strategy<Value = VesselType> {
    (10.0..2_000.0f64, 1.0..4.0f64, 10.0..2_000.0f64).prop_map(move |(min, span, use_cost)| {
        VesselType {
            kind,
            min_working_volume_ml: min,
            max_working_volume_ml: min * span,
            acquisition_cost: use_cost * 10.0,
            use_cost,
            energy_kwh_per_day: 0.1,
            max_units: None,
        }
    })
}

fn vessel_catalog() -> impl Strategy<Value = Vec<VesselType>> {
    (
        vessel_type(VesselKind::Pbs0p1Mag),
        vessel_type(VesselKind::Pbs0p5Mag),
        vessel_type(VesselKind::Pbs3Mag),
        1usize..=3,
    )
        .prop_map(|(a, b, c, len)| {
            let mut catalog = vec![a, b, c];
            catalog.truncate(len);
            catalog
        })
}

/// A policy valid for `catalog`: the usable floor never undercuts its smallest vessel.
fn policy_for(catalog: Vec<VesselType>) -> impl Strategy<Value = (Vec<VesselType>, AllocationPolicy)> {
    let smallest = catalog
        .iter()
        .map(|v| v.min_working_volume_ml)
        .fold(f64::INFINITY, f64::min);
    (
        prop::option::of(0.0..500.0f64),
        prop_oneof![Just(1.0), Just(5.0), Just(10.0), 0.1..50.0f64],
        any::<bool>(),
    )
        .prop_map(move |(extra, volume_increment_ml, substitute_final_cycle)| {
            let policy = AllocationPolicy {
                min_usable_volume_ml: extra.map(|extra| smallest + extra),
                volume_increment_ml,
                substitute_final_cycle,
            };
            (catalog.clone(), policy)
        })
}

fn cycle(index: usize, costs: CostBreakdown) -> CycleRecord {
    CycleRecord {
        label: format!("C{}", index),
        duration_days: 5.0,
        worktime_hours: 2.0,
        average_cell_number: 0.0,
        minimum_cell_number: 0.0,
        working_volume_ml: None,
        allocation: None,
        costs,
        stages: StageColumns {
            expansion: costs.total(),
            ..StageColumns::default()
        },
        records: Vec::new(),
    }
}

fn cost_breakdown() -> impl Strategy<Value = CostBreakdown> {
    (0.0..1e4f64, 0.0..1e4f64, 0.0..1.0f64, 0.0..1e4f64, 0.0..1e4f64).prop_map(
        |(consumables, reagents, medium_share, facility, labor)| CostBreakdown {
            consumables,
            reagents,
            medium: reagents * medium_share,
            facility,
            labor,
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn allocation_holds_the_volume_and_fills_every_vessel(volume in 1.0..50_000.0f64, last in any::<bool>()) {
        let allocation = allocator().allocate(volume, last).unwrap();
        prop_assert!(allocation.volume_ml() >= volume.max(60.0) * (1.0 - 1e-9));
        prop_assert!(allocation.vessel_count() >= 1);
        for line in &allocation.lines {
            prop_assert!(line.count >= 1);
            prop_assert!(line.volume_per_vessel_ml >= line.min_working_volume_ml - 1e-9);
            prop_assert!(line.volume_per_vessel_ml <= line.max_working_volume_ml + 1e-9);
        }
    }

    #[test]
    fn any_catalog_and_policy_allocation_holds_the_volume(
        (catalog, policy) in vessel_catalog().prop_flat_map(policy_for),
        volume in 1.0..100_000.0f64,
        last in any::<bool>(),
    ) {
        let allocator = VesselAllocator::from_catalog(catalog, &policy).unwrap();
        let allocation = allocator.allocate(volume, last).unwrap();
        let floor = volume.max(allocator.min_usable_volume_ml());

        prop_assert!(allocation.volume_ml() >= floor * (1.0 - 1e-9));
        prop_assert!(allocation.required_volume_ml >= floor * (1.0 - 1e-9));
        prop_assert!(allocation.vessel_count() >= 1);
        for line in &allocation.lines {
            prop_assert!(line.count >= 1);
            prop_assert!(line.volume_per_vessel_ml >= line.min_working_volume_ml - 1e-9);
            prop_assert!(line.volume_per_vessel_ml <= line.max_working_volume_ml + 1e-9);
        }
    }

    #[test]
    fn detection_probabilities_sum_to_failure_probability(
        checkpoints in 1usize..12,
        failure in 0.0..0.99f64,
        detection in 0.0..=1.0f64,
    ) {
        let probabilities = failure_detection_probabilities(checkpoints, failure, detection);
        prop_assert_eq!(probabilities.len(), checkpoints);
        prop_assert!(probabilities.iter().all(|&p| p >= -1e-12));
        let total: f64 = probabilities.iter().sum();
        prop_assert!((total - failure).abs() < 1e-9);
    }

    #[test]
    fn aggregation_conserves_cost(costs in prop::collection::vec(cost_breakdown(), 1..8)) {
        let cycles: Vec<CycleRecord> = costs.iter().enumerate().map(|(i, &c)| cycle(i, c)).collect();
        let totals = aggregate_cycles(&cycles);
        let summed: f64 = cycles.iter().map(CycleRecord::total_cost).sum();
        prop_assert!((totals.total_cost - summed).abs() <= 1e-9 * summed.max(1.0));
        prop_assert!((totals.direct_cost + totals.indirect_cost - totals.total_cost).abs() <= 1e-9 * summed.max(1.0));
        prop_assert!((totals.stages.total() - totals.total_cost).abs() <= 1e-9 * summed.max(1.0));
    }

    #[test]
    fn failure_adjustment_only_adds_cost(
        costs in prop::collection::vec(cost_breakdown(), 1..8),
        failure in 0.0..0.9f64,
        detection in 0.0..=1.0f64,
        success in 0.05..=1.0f64,
    ) {
        let cycles: Vec<CycleRecord> = costs.iter().enumerate().map(|(i, &c)| cycle(i, c)).collect();
        let totals = aggregate_cycles(&cycles);
        let adjusted = apply_failure_model(&cycles, &totals, failure, detection, success).unwrap();
        let scale = totals.total_cost.max(1.0);
        prop_assert!(adjusted.failure_cost >= -1e-9 * scale);
        prop_assert!((adjusted.total_cost - adjusted.costs.total()).abs() <= 1e-9 * adjusted.total_cost.max(1.0));
        prop_assert!((adjusted.stages.total() - adjusted.total_cost).abs() <= 1e-9 * adjusted.total_cost.max(1.0));
    }

    #[test]
    fn certain_success_without_failures_is_free(costs in prop::collection::vec(cost_breakdown(), 1..8)) {
        let cycles: Vec<CycleRecord> = costs.iter().enumerate().map(|(i, &c)| cycle(i, c)).collect();
        let totals = aggregate_cycles(&cycles);
        let adjusted = apply_failure_model(&cycles, &totals, 0.0, 0.5, 1.0).unwrap();
        prop_assert!(adjusted.failure_cost.abs() <= 1e-9 * totals.total_cost.max(1.0));
    }

    #[test]
    fn reconciled_volumes_never_shrink(fold in 1.2..8.0f64, cycles in 1usize..6) {
        let mut volumes: Vec<f64> = (0..cycles).map(|i| 60.0 * fold.powi(i as i32)).collect();
        let planned = volumes.clone();
        let allocations = reconcile_volumes(&mut volumes, &allocator(), 32).unwrap();

        prop_assert_eq!(allocations.len(), cycles);
        prop_assert!(volumes.windows(2).all(|w| w[1] >= w[0] * (1.0 - 1e-12)));
        for ((volume, before), allocation) in volumes.iter().zip(&planned).zip(&allocations) {
            prop_assert!(*volume >= before * (1.0 - 1e-12));
            prop_assert!(allocation.volume_ml() >= volume * (1.0 - 1e-9));
        }
    }
}
