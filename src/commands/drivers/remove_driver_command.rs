use crate::{
    commands::{shipments::emit, Command},
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{driver, shipment, ShipmentStatus},
};
use async_trait::async_trait;
use sea_orm::{
    sea_query::{Expr, Query, SelectStatement},
    ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Deletes a driver, refused while any non-terminal shipment references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveDriverCommand {
    pub driver_id: i32,
    pub distributor_id: String,
}

#[async_trait]
impl Command for RemoveDriverCommand {
    type Result = ();

    #[instrument(skip(self, db_pool, event_sender), fields(driver_id = self.driver_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let txn = db_pool.begin().await?;

        // Row lock on Postgres; the FK check of a concurrent assignment waits on it
        let found = driver::Entity::find_by_id(self.driver_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Driver {} not found", self.driver_id)))?;
        if found.distributor_id != self.distributor_id {
            return Err(ServiceError::Forbidden(format!(
                "driver {} belongs to another distributor",
                self.driver_id
            )));
        }

        let deleted = driver::Entity::delete_many()
            .filter(driver::Column::Id.eq(found.id))
            .filter(Expr::exists(active_shipments_of(found.id)).not())
            .exec(&txn)
            .await?;
        if deleted.rows_affected == 0 {
            let active = shipment::Entity::find()
                .filter(shipment::Column::DriverId.eq(found.id))
                .filter(shipment::Column::Status.is_in(ACTIVE))
                .count(&txn)
                .await?;
            return Err(ServiceError::InvalidState(format!(
                "driver {} is assigned to {} active shipment(s)",
                found.id, active
            )));
        }

        txn.commit().await?;

        info!(driver_id = self.driver_id, "driver removed");
        emit(&event_sender, Event::DriverRemoved(self.driver_id)).await;
        Ok(())
    }
}

const ACTIVE: [ShipmentStatus; 2] = [ShipmentStatus::Pending, ShipmentStatus::InTransit];

/// `SELECT 1 FROM shipments WHERE driver_id = ? AND status IN (active)`
fn active_shipments_of(driver_id: i32) -> SelectStatement {
    Query::select()
        .expr(Expr::value(1))
        .from(shipment::Entity)
        .and_where(shipment::Column::DriverId.eq(driver_id))
        .and_where(shipment::Column::Status.is_in(ACTIVE))
        .to_owned()
}
