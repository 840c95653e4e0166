use crate::{
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::{
        outbox::{record_side_effects, SideEffect},
        Event, EventSender,
    },
    models::{
        shipment::{self, ShipmentAction},
        vehicle_location,
    },
    realtime::{RealtimeEvent, Topic},
    scoping,
    services::locations,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use super::{emit, validate_coordinates};

/// A GPS fix from the driver assigned to the shipment. Never changes status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportLocationCommand {
    pub shipment_id: i32,
    pub driver_user_id: String,
    pub latitude: Decimal,
    pub longitude: Decimal,
}

#[async_trait]
impl Command for ReportLocationCommand {
    type Result = vehicle_location::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(shipment_id = self.shipment_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        validate_coordinates(self.latitude, self.longitude)?;

        let txn = db_pool.begin().await?;

        let shipment = assigned_shipment(&txn, self.shipment_id, &self.driver_user_id).await?;
        shipment
            .status
            .apply(shipment.is_accepted_by_distributor, ShipmentAction::ReportLocation)?;

        let fix = locations::append(
            &txn,
            shipment.id,
            self.latitude,
            self.longitude,
            Utc::now(),
        )
        .await?;

        let effects = [SideEffect::broadcast(
            Topic::Shipment(shipment.id),
            RealtimeEvent::LocationUpdated {
                shipment_id: shipment.id,
                latitude: fix.latitude,
                longitude: fix.longitude,
                status: shipment.status,
            },
        )];
        record_side_effects(&txn, &effects).await;

        txn.commit().await?;

        emit(
            &event_sender,
            Event::LocationReported {
                shipment_id: shipment.id,
                location_id: fix.id,
                recorded_at: fix.timestamp,
            },
        )
        .await;
        Ok(fix)
    }
}

/// Loads a shipment for its assigned driver. A shipment without a driver, or
/// with somebody else, is `Forbidden`.
pub(crate) async fn assigned_shipment<C: ConnectionTrait>(
    db: &C,
    shipment_id: i32,
    driver_user_id: &str,
) -> Result<shipment::Model, ServiceError> {
    let shipment = shipment::Entity::find_by_id(shipment_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::shipment_not_found(shipment_id))?;

    let caller = scoping::driver_for_user(db, driver_user_id).await?;
    match (shipment.driver_id, caller) {
        (Some(assigned), Some(driver)) if assigned == driver.id => Ok(shipment),
        _ => Err(ServiceError::Forbidden(format!(
            "caller is not the driver assigned to shipment {}",
            shipment_id
        ))),
    }
}
