use crate::{
    commands::{shipments::emit, Command},
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    models::driver,
};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::add_driver_command::unique_violation;

/// Replaces a driver's contact and identity details. The linked account and
/// the employing distributor never change.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateDriverCommand {
    pub driver_id: i32,
    pub distributor_id: String,
    #[validate(length(min = 2, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub contact_number: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub license_number: String,
    #[validate(length(min = 3, max = 50))]
    pub national_id: String,
}

#[async_trait]
impl Command for UpdateDriverCommand {
    type Result = driver::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(driver_id = self.driver_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;

        let txn = db_pool.begin().await?;

        let found = driver::Entity::find_by_id(self.driver_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Driver {} not found", self.driver_id)))?;
        if found.distributor_id != self.distributor_id {
            return Err(ServiceError::Forbidden(format!(
                "driver {} belongs to another distributor",
                self.driver_id
            )));
        }
        self.check_unique(&txn).await?;

        let mut active: driver::ActiveModel = found.into();
        active.full_name = Set(self.full_name.trim().to_string());
        active.contact_number = Set(self.contact_number.clone());
        active.license_number = Set(self.license_number.trim().to_string());
        active.national_id = Set(self.national_id.trim().to_string());
        let updated = active.update(&txn).await.map_err(unique_violation)?;

        txn.commit().await.map_err(unique_violation)?;

        info!(driver_id = updated.id, "driver updated");
        emit(&event_sender, Event::DriverUpdated(updated.id)).await;
        Ok(updated)
    }
}

impl UpdateDriverCommand {
    /// Licence and national id stay unique across every roster.
    async fn check_unique<C: ConnectionTrait>(&self, db: &C) -> Result<(), ServiceError> {
        let clash = driver::Entity::find()
            .filter(driver::Column::Id.ne(self.driver_id))
            .filter(
                Condition::any()
                    .add(driver::Column::LicenseNumber.eq(self.license_number.trim()))
                    .add(driver::Column::NationalId.eq(self.national_id.trim())),
            )
            .one(db)
            .await?;

        match clash {
            None => Ok(()),
            Some(existing) => {
                let field = if existing.license_number == self.license_number.trim() {
                    "license number"
                } else {
                    "national id"
                };
                Err(ServiceError::ValidationError(format!(
                    "another driver already has this {}",
                    field
                )))
            }
        }
    }
}
