//! Property-based tests for the shipment state machine and coordinate checks.
//!
//! These run the pure transition table against arbitrary action sequences,
//! so they need no database.

use pharmaflow_tracking::{
    commands::shipments::{normalize_coordinate, validate_coordinates},
    models::{ShipmentAction, ShipmentStatus},
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn action_strategy() -> impl Strategy<Value = ShipmentAction> {
    prop_oneof![
        Just(ShipmentAction::Accept),
        Just(ShipmentAction::Reject),
        Just(ShipmentAction::AssignDriver),
        Just(ShipmentAction::ConfirmDelivery),
        Just(ShipmentAction::RouteToStore),
        Just(ShipmentAction::ReportLocation),
    ]
}

/// Millionths of a degree, wide enough to land on both sides of every bound.
fn degrees_strategy(limit: i64) -> impl Strategy<Value = Decimal> {
    (-(limit + 10) * 1_000_000..=(limit + 10) * 1_000_000).prop_map(|n| Decimal::new(n, 6))
}

/// Replays `actions` from a fresh shipment, skipping refused ones.
fn replay(actions: &[ShipmentAction]) -> Vec<(ShipmentStatus, Option<bool>)> {
    let mut state = (ShipmentStatus::Pending, None);
    let mut trail = vec![state];
    for action in actions {
        if let Ok(t) = state.0.apply(state.1, *action) {
            state = (t.status, t.acceptance);
        }
        trail.push(state);
    }
    trail
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn terminal_states_are_never_left(actions in prop::collection::vec(action_strategy(), 0..40)) {
        let trail = replay(&actions);
        let first_terminal = trail.iter().position(|(s, _)| s.is_terminal());
        if let Some(at) = first_terminal {
            let terminal = trail[at];
            prop_assert!(trail[at..].iter().all(|s| *s == terminal));
        }
    }

    #[test]
    fn delivery_implies_acceptance(actions in prop::collection::vec(action_strategy(), 0..40)) {
        for (status, acceptance) in replay(&actions) {
            match status {
                ShipmentStatus::Delivered | ShipmentStatus::InTransit => {
                    prop_assert_eq!(acceptance, Some(true))
                }
                ShipmentStatus::Rejected => prop_assert_eq!(acceptance, Some(false)),
                ShipmentStatus::Pending => prop_assert_eq!(acceptance, None),
            }
        }
    }

    #[test]
    fn terminal_states_refuse_every_mutation(
        terminal in prop_oneof![Just(ShipmentStatus::Delivered), Just(ShipmentStatus::Rejected)],
        action in action_strategy(),
    ) {
        let acceptance = Some(terminal == ShipmentStatus::Delivered);
        let result = terminal.apply(acceptance, action);
        if action == ShipmentAction::ReportLocation {
            let t = result.expect("location reports never change status");
            prop_assert_eq!(t.status, terminal);
        } else {
            prop_assert!(result.is_err());
        }
    }

    #[test]
    fn reporting_a_location_never_changes_status(
        actions in prop::collection::vec(action_strategy(), 0..20),
    ) {
        let (status, acceptance) = *replay(&actions).last().expect("non-empty trail");
        let t = status
            .apply(acceptance, ShipmentAction::ReportLocation)
            .expect("always permitted");
        prop_assert_eq!(t.status, status);
        prop_assert_eq!(t.acceptance, acceptance);
    }

    #[test]
    fn coordinates_are_accepted_exactly_within_bounds(
        lat in degrees_strategy(90),
        lon in degrees_strategy(180),
    ) {
        let in_range = lat.abs() <= Decimal::from(90) && lon.abs() <= Decimal::from(180);
        prop_assert_eq!(validate_coordinates(lat, lon).is_ok(), in_range);
    }

    #[test]
    fn normalization_is_idempotent(n in any::<i64>(), scale in 0u32..=20) {
        let value = Decimal::new(n, scale);
        let once = normalize_coordinate(value);
        prop_assert!(once.scale() <= 9);
        prop_assert_eq!(normalize_coordinate(once), once);
    }
}
