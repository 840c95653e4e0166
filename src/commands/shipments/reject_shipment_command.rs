use crate::{
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::{
        outbox::{record_side_effects, SideEffect},
        Event, EventSender,
    },
    models::shipment::{self, ShipmentAction},
    scoping,
};
use async_trait::async_trait;
use sea_orm::{EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use super::{emit, status_changed, write_guarded};

/// Distributor refuses a pending shipment. Terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectShipmentCommand {
    pub shipment_id: i32,
    pub distributor_id: String,
}

#[async_trait]
impl Command for RejectShipmentCommand {
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
            .apply(current.is_accepted_by_distributor, ShipmentAction::Reject)?;
        let updated = write_guarded(
            &txn,
            &current,
            ShipmentAction::Reject,
            transition,
            shipment::Entity::update_many(),
        )
        .await?;

        let effects = [
            SideEffect::notify(
                updated.company_id.clone(),
                updated.id,
                format!("Shipment {} was rejected by the distributor.", updated.id),
            ),
            status_changed(&updated),
        ];
        record_side_effects(&txn, &effects).await;

        txn.commit().await?;

        emit(&event_sender, Event::ShipmentRejected(updated.id)).await;
        Ok(updated)
    }
}
