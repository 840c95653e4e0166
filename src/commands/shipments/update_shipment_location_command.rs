use crate::{
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::{outbox::record_side_effects, Event, EventSender},
    models::{
        shipment::{self, ShipmentAction},
        store,
    },
    scoping,
};
use async_trait::async_trait;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ConnectionTrait, EntityTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use validator::Validate;

use super::{emit, status_changed, write_guarded};

/// Distributor routes a shipment to a store address by hand. A pending
/// shipment is implicitly accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateShipmentLocationCommand {
    pub shipment_id: i32,
    pub distributor_id: String,
    #[validate(length(min = 1, max = 200))]
    pub address: String,
}

#[async_trait]
impl Command for UpdateShipmentLocationCommand {
    type Result = shipment::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(shipment_id = self.shipment_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        let address = self.address.trim();
        if address.is_empty() {
            return Err(ServiceError::ValidationError(
                "address must not be blank".to_string(),
            ));
        }

        let txn = db_pool.begin().await?;

        let current =
            scoping::find_for_distributor(&txn, self.shipment_id, &self.distributor_id).await?;
        let transition = current
            .status
            .apply(current.is_accepted_by_distributor, ShipmentAction::RouteToStore)?;

        let store = self.upsert_store(&txn, &current, address).await?;
        let updated = write_guarded(
            &txn,
            &current,
            ShipmentAction::RouteToStore,
            transition,
            shipment::Entity::update_many()
                .col_expr(shipment::Column::StoreId, Expr::value(Some(store.id))),
        )
        .await?;

        record_side_effects(&txn, &[status_changed(&updated)]).await;

        txn.commit().await?;

        emit(
            &event_sender,
            Event::ShipmentRouted {
                shipment_id: updated.id,
                store_id: store.id,
            },
        )
        .await;
        Ok(updated)
    }
}

impl UpdateShipmentLocationCommand {
    /// Rewrites the address of the shipment's own store, or opens one.
    async fn upsert_store<C: ConnectionTrait>(
        &self,
        db: &C,
        current: &shipment::Model,
        address: &str,
    ) -> Result<store::Model, ServiceError> {
        let existing = match current.store_id {
            Some(store_id) => store::Entity::find_by_id(store_id)
                .one(db)
                .await?
                .filter(|s| s.distributor_id == self.distributor_id),
            None => None,
        };

        match existing {
            Some(found) => {
                debug!(store_id = found.id, "updating store address");
                let mut active: store::ActiveModel = found.into();
                active.address = Set(address.to_string());
                Ok(active.update(db).await?)
            }
            None => Ok(store::ActiveModel {
                name: Set(format!("Shipment {} Location", current.id)),
                address: Set(address.to_string()),
                distributor_id: Set(self.distributor_id.clone()),
                latitude: Set(None),
                longitude: Set(None),
                ..Default::default()
            }
            .insert(db)
            .await?),
        }
    }
}
