use crate::{
    auth::Role,
    commands::{shipments::emit, Command},
    db::DbPool,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{driver, user_account},
};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddDriverCommand {
    pub distributor_id: String,
    /// Account the driver signs in with; must hold the driver role
    #[validate(length(min = 1))]
    pub user_id: String,
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
impl Command for AddDriverCommand {
    type Result = driver::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(distributor_id = %self.distributor_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;

        let txn = db_pool.begin().await?;

        match user_account::Entity::find_by_id(self.user_id.clone())
            .one(&txn)
            .await?
        {
            Some(account) if account.role == Role::Driver => {}
            _ => {
                return Err(ServiceError::ReferenceError(format!(
                    "user {} is not a driver account",
                    self.user_id
                )))
            }
        }
        self.check_unique(&txn).await?;

        let created = driver::ActiveModel {
            user_id: Set(self.user_id.clone()),
            full_name: Set(self.full_name.trim().to_string()),
            contact_number: Set(self.contact_number.clone()),
            license_number: Set(self.license_number.trim().to_string()),
            national_id: Set(self.national_id.trim().to_string()),
            distributor_id: Set(self.distributor_id.clone()),
            date_hired: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(unique_violation)?;

        txn.commit().await.map_err(unique_violation)?;

        info!(driver_id = created.id, "driver added");
        emit(&event_sender, Event::DriverAdded(created.id)).await;
        Ok(created)
    }
}

impl AddDriverCommand {
    async fn check_unique<C: ConnectionTrait>(&self, db: &C) -> Result<(), ServiceError> {
        let clash = driver::Entity::find()
            .filter(
                Condition::any()
                    .add(driver::Column::LicenseNumber.eq(self.license_number.trim()))
                    .add(driver::Column::NationalId.eq(self.national_id.trim()))
                    .add(driver::Column::UserId.eq(self.user_id.as_str())),
            )
            .one(db)
            .await?;

        let Some(existing) = clash else {
            return Ok(());
        };
        let field = if existing.license_number == self.license_number.trim() {
            "license number"
        } else if existing.national_id == self.national_id.trim() {
            "national id"
        } else {
            "user account"
        };
        Err(ServiceError::ValidationError(format!(
            "a driver with this {} already exists",
            field
        )))
    }
}

/// Concurrent inserts can still trip the unique indexes.
pub(super) fn unique_violation(err: DbErr) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(detail)) => {
            ServiceError::ValidationError(format!("driver already exists: {}", detail))
        }
        _ => ServiceError::DatabaseError(err),
    }
}
