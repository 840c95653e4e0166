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
use sea_orm::{sea_query::Expr, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use super::{emit, write_guarded};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignDriverCommand {
    pub shipment_id: i32,
    pub driver_id: i32,
    pub distributor_id: String,
}

#[async_trait]
impl Command for AssignDriverCommand {
    type Result = shipment::Model;

    #[instrument(
        skip(self, db_pool, event_sender),
        fields(shipment_id = self.shipment_id, driver_id = self.driver_id)
    )]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let txn = db_pool.begin().await?;

        let current =
            scoping::find_for_distributor(&txn, self.shipment_id, &self.distributor_id).await?;

        // Drivers of other distributors are reported exactly like unknown ones
        let driver = driver::Entity::find_by_id(self.driver_id)
            .one(&txn)
            .await?
            .filter(|d| d.distributor_id == self.distributor_id)
            .ok_or_else(|| {
                ServiceError::ReferenceError(format!(
                    "driver {} does not belong to this distributor",
                    self.driver_id
                ))
            })?;

        let transition = current
            .status
            .apply(current.is_accepted_by_distributor, ShipmentAction::AssignDriver)?;
        let updated = write_guarded(
            &txn,
            &current,
            ShipmentAction::AssignDriver,
            transition,
            shipment::Entity::update_many()
                .col_expr(shipment::Column::DriverId, Expr::value(Some(driver.id))),
        )
        .await?;

        let effects = [SideEffect::notify(
            driver.user_id.clone(),
            updated.id,
            format!("You have been assigned to shipment {}.", updated.id),
        )];
        record_side_effects(&txn, &effects).await;

        txn.commit().await?;

        emit(
            &event_sender,
            Event::DriverAssigned {
                shipment_id: updated.id,
                driver_id: driver.id,
            },
        )
        .await;
        Ok(updated)
    }
}
