use crate::{
    commands::{
        shipments::{emit, normalize_coordinate, validate_coordinates},
        Command,
    },
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    models::store,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Registers a store under the calling distributor.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddStoreCommand {
    pub distributor_id: String,
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(min = 2, max = 200))]
    pub address: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}

#[async_trait]
impl Command for AddStoreCommand {
    type Result = store::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(distributor_id = %self.distributor_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        let (latitude, longitude) = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => {
                validate_coordinates(lat, lon)?;
                (Some(normalize_coordinate(lat)), Some(normalize_coordinate(lon)))
            }
            (None, None) => (None, None),
            _ => {
                return Err(ServiceError::ValidationError(
                    "store latitude and longitude must be given together".to_string(),
                ))
            }
        };

        let created = store::ActiveModel {
            name: Set(self.name.trim().to_string()),
            address: Set(self.address.trim().to_string()),
            distributor_id: Set(self.distributor_id.clone()),
            latitude: Set(latitude),
            longitude: Set(longitude),
            ..Default::default()
        }
        .insert(db_pool.as_ref())
        .await?;

        info!(store_id = created.id, "store added");
        emit(&event_sender, Event::StoreAdded(created.id)).await;
        Ok(created)
    }
}
