//! Shipment lifecycle commands.
//!
//! Each command runs in one transaction: load, check the transition table,
//! write with a status guard, record side effects in a savepoint, commit, then
//! emit a domain event. Only the guarded write can fail the command.

use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::shipment::{self, ShipmentAction, Transition};
use crate::realtime::{RealtimeEvent, Topic};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, UpdateMany,
};
use tracing::{info, warn};

pub mod accept_shipment_command;
pub mod assign_driver_command;
pub mod confirm_delivery_command;
pub mod create_shipment_command;
pub mod reject_shipment_command;
pub mod report_location_command;
pub mod trip_signal_command;
pub mod update_shipment_location_command;

pub use accept_shipment_command::AcceptShipmentCommand;
pub use assign_driver_command::AssignDriverCommand;
pub use confirm_delivery_command::ConfirmDeliveryCommand;
pub use create_shipment_command::CreateShipmentCommand;
pub use reject_shipment_command::RejectShipmentCommand;
pub use report_location_command::ReportLocationCommand;
pub use trip_signal_command::{TripPhase, TripSignalCommand};
pub use update_shipment_location_command::UpdateShipmentLocationCommand;

pub const MIN_LATITUDE: Decimal = dec!(-90);
pub const MAX_LATITUDE: Decimal = dec!(90);
pub const MIN_LONGITUDE: Decimal = dec!(-180);
pub const MAX_LONGITUDE: Decimal = dec!(180);

/// Latitude in [-90, 90], longitude in [-180, 180], both inclusive.
pub fn validate_coordinates(latitude: Decimal, longitude: Decimal) -> Result<(), ServiceError> {
    let mut problems = Vec::new();
    if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&latitude) {
        problems.push(format!("latitude {} is outside [-90, 90]", latitude));
    }
    if !(MIN_LONGITUDE..=MAX_LONGITUDE).contains(&longitude) {
        problems.push(format!("longitude {} is outside [-180, 180]", longitude));
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(problems.join("; ")))
    }
}

/// Ledger precision.
pub fn normalize_coordinate(value: Decimal) -> Decimal {
    value.round_dp(9)
}

/// Applies `transition` only while the row still has the status it was read
/// with. Zero affected rows means another transition won the race.
pub(crate) async fn write_guarded<C: ConnectionTrait>(
    db: &C,
    current: &shipment::Model,
    action: ShipmentAction,
    transition: Transition,
    update: UpdateMany<shipment::Entity>,
) -> Result<shipment::Model, ServiceError> {
    let result = update
        .col_expr(shipment::Column::Status, Expr::value(transition.status))
        .col_expr(
            shipment::Column::IsAcceptedByDistributor,
            Expr::value(transition.acceptance),
        )
        .col_expr(shipment::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(shipment::Column::Id.eq(current.id))
        .filter(shipment::Column::Status.eq(current.status))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        warn!(shipment_id = current.id, %action, "lost transition race");
        return Err(ServiceError::InvalidState(format!(
            "cannot {} shipment {}: it is no longer {}",
            action, current.id, current.status
        )));
    }

    counter!(
        "pharmaflow.shipments.transition",
        1,
        "action" => action.to_string(),
        "to" => transition.status.to_string()
    );
    info!(
        shipment_id = current.id,
        %action,
        from = %current.status,
        to = %transition.status,
        "shipment transition applied"
    );

    shipment::Entity::find_by_id(current.id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::shipment_not_found(current.id))
}

/// Status push for everyone watching the shipment.
pub(crate) fn status_changed(shipment: &shipment::Model) -> crate::events::outbox::SideEffect {
    crate::events::outbox::SideEffect::broadcast(
        Topic::Shipment(shipment.id),
        RealtimeEvent::StatusChanged {
            shipment_id: shipment.id,
            status: shipment.status,
        },
    )
}

/// Domain events are informational; a closed channel is logged, not returned.
pub(crate) async fn emit(event_sender: &EventSender, event: Event) {
    if let Err(e) = event_sender.send(event).await {
        warn!(error = %e, "domain event dropped");
    }
}
