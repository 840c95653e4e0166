use crate::{
    auth::Role,
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::{
        outbox::{record_side_effects, SideEffect},
        Event, EventSender,
    },
    models::{driver, product, shipment, store, user_account, ShipmentStatus},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

use super::{emit, normalize_coordinate, validate_coordinates};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateShipmentCommand {
    pub company_id: String,
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(length(min = 2, max = 100))]
    pub destination: String,
    pub distributor_id: Option<String>,
    /// `Some(0)` means no store, as sent by forms with an empty picker
    pub store_id: Option<i32>,
    pub driver_id: Option<i32>,
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    pub destination_latitude: Option<Decimal>,
    pub destination_longitude: Option<Decimal>,
}

#[async_trait]
impl Command for CreateShipmentCommand {
    type Result = shipment::Model;

    #[instrument(skip(self, db_pool, event_sender), fields(company_id = %self.company_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.validate()?;
        let (latitude, longitude) = self.destination_point()?;
        let store_id = self.store_id.filter(|id| *id != 0);
        let distributor_id = self
            .distributor_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let txn = db_pool.begin().await?;

        self.check_product(&txn).await?;
        if let Some(distributor_id) = distributor_id.as_deref() {
            check_distributor(&txn, distributor_id).await?;
        }
        let assigned_driver = match self.driver_id {
            Some(driver_id) => Some(
                check_driver_employed_by(&txn, driver_id, distributor_id.as_deref()).await?,
            ),
            None => None,
        };
        if let Some(store_id) = store_id {
            check_store_owned_by(&txn, store_id, distributor_id.as_deref()).await?;
        }

        let now = Utc::now();
        let created = shipment::ActiveModel {
            product_id: Set(self.product_id),
            destination: Set(self.destination.trim().to_string()),
            status: Set(ShipmentStatus::Pending),
            company_id: Set(self.company_id.clone()),
            distributor_id: Set(distributor_id.clone()),
            store_id: Set(store_id),
            driver_id: Set(self.driver_id),
            quantity: Set(self.quantity),
            is_accepted_by_distributor: Set(None),
            destination_latitude: Set(latitude),
            destination_longitude: Set(longitude),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let message = format!("New shipment #{} assigned to you.", created.id);
        let mut effects = Vec::new();
        if let Some(distributor_id) = distributor_id {
            effects.push(SideEffect::notify(distributor_id, created.id, message.clone()));
        }
        if let Some(driver) = assigned_driver {
            effects.push(SideEffect::notify(driver.user_id, created.id, message));
        }
        record_side_effects(&txn, &effects).await;

        txn.commit().await?;

        info!(shipment_id = created.id, "shipment created");
        emit(&event_sender, Event::ShipmentCreated(created.id)).await;
        Ok(created)
    }
}

impl CreateShipmentCommand {
    fn destination_point(&self) -> Result<(Option<Decimal>, Option<Decimal>), ServiceError> {
        match (self.destination_latitude, self.destination_longitude) {
            (Some(lat), Some(lon)) => {
                validate_coordinates(lat, lon)?;
                Ok((Some(normalize_coordinate(lat)), Some(normalize_coordinate(lon))))
            }
            (None, None) => Ok((None, None)),
            _ => Err(ServiceError::ValidationError(
                "destination latitude and longitude must be given together".to_string(),
            )),
        }
    }

    async fn check_product<C: ConnectionTrait>(&self, db: &C) -> Result<(), ServiceError> {
        match product::Entity::find_by_id(self.product_id).one(db).await? {
            Some(p) if p.company_id == self.company_id => Ok(()),
            _ => Err(ServiceError::ValidationError(format!(
                "product {} does not belong to this company",
                self.product_id
            ))),
        }
    }
}

/// A distributor reference must name an existing account holding that role.
pub(crate) async fn check_distributor<C: ConnectionTrait>(
    db: &C,
    distributor_id: &str,
) -> Result<(), ServiceError> {
    match user_account::Entity::find_by_id(distributor_id.to_string())
        .one(db)
        .await?
    {
        Some(account) if account.role == Role::Distributor => Ok(()),
        _ => Err(ServiceError::ReferenceError(format!(
            "distributor {} does not exist",
            distributor_id
        ))),
    }
}

/// A pre-assigned driver must work for the shipment's distributor.
pub(crate) async fn check_driver_employed_by<C: ConnectionTrait>(
    db: &C,
    driver_id: i32,
    distributor_id: Option<&str>,
) -> Result<driver::Model, ServiceError> {
    let driver = driver::Entity::find_by_id(driver_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::ReferenceError(format!("driver {} does not exist", driver_id)))?;
    match distributor_id {
        Some(distributor_id) if driver.distributor_id == distributor_id => Ok(driver),
        Some(_) => Err(ServiceError::ReferenceError(format!(
            "driver {} does not work for this distributor",
            driver_id
        ))),
        None => Err(ServiceError::ReferenceError(
            "a driver can only be assigned together with their distributor".to_string(),
        )),
    }
}

/// A destination store must be registered by the shipment's distributor.
pub(crate) async fn check_store_owned_by<C: ConnectionTrait>(
    db: &C,
    store_id: i32,
    distributor_id: Option<&str>,
) -> Result<store::Model, ServiceError> {
    let store = store::Entity::find_by_id(store_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::ReferenceError(format!("store {} does not exist", store_id)))?;
    match distributor_id {
        Some(distributor_id) if store.distributor_id == distributor_id => Ok(store),
        Some(_) => Err(ServiceError::ReferenceError(format!(
            "store {} does not belong to this distributor",
            store_id
        ))),
        None => Err(ServiceError::ReferenceError(
            "a store can only be chosen together with its distributor".to_string(),
        )),
    }
}
