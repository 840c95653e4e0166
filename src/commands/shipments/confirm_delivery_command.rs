use crate::{
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::{
        outbox::{record_side_effects, SideEffect},
        Event, EventSender,
    },
    models::{
        driver,
        shipment::{self, ShipmentAction},
    },
    scoping,
};
use async_trait::async_trait;
use sea_orm::{EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{emit, status_changed, write_guarded};

/// Terminal transition; only an accepted, in-transit shipment can be delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmDeliveryCommand {
    pub shipment_id: i32,
    pub distributor_id: String,
}

#[async_trait]
impl Command for ConfirmDeliveryCommand {
    type Result = shipment::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(shipment_id = self.shipment_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let txn = db_pool.begin().await?;

        let current =
            scoping::find_for_distributor(&txn, self.shipment_id, &self.distributor_id).await?;
        let transition = current
            .status
            .apply(current.is_accepted_by_distributor, ShipmentAction::ConfirmDelivery)?;
        let updated = write_guarded(
            &txn,
            &current,
            ShipmentAction::ConfirmDelivery,
            transition,
            shipment::Entity::update_many(),
        )
        .await?;

        let mut effects = vec![status_changed(&updated)];
        let assigned = match updated.driver_id {
            Some(driver_id) => driver::Entity::find_by_id(driver_id).one(&txn).await?,
            None => None,
        };
        if let Some(driver) = assigned {
            effects.push(SideEffect::notify(
                driver.user_id,
                updated.id,
                format!("Shipment {} delivery confirmed.", updated.id),
            ));
        }
        record_side_effects(&txn, &effects).await;

        txn.commit().await?;

        info!(shipment_id = updated.id, "delivery confirmed");
        emit(&event_sender, Event::ShipmentDelivered(updated.id)).await;
        Ok(updated)
    }
}
