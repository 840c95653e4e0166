use crate::{
    auth::{RequestContext, Role},
    commands::{
        drivers::{AddDriverCommand, RemoveDriverCommand, UpdateDriverCommand},
        Command,
    },
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    models::driver,
    scoping,
};
use sea_orm::QueryOrder;
use std::sync::Arc;
use tracing::instrument;

/// Driver roster of a distributor.
#[derive(Clone)]
pub struct DriverService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl DriverService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, ctx, command), fields(user_id = %ctx.user_id))]
    pub async fn add(
        &self,
        ctx: &RequestContext,
        mut command: AddDriverCommand,
    ) -> Result<driver::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        command.distributor_id = ctx.user_id.clone();
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<driver::Model>, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.roster_of(&ctx.user_id).await
    }

    /// Drivers a company may pre-assign when it names `distributor_id`.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn for_distributor(
        &self,
        ctx: &RequestContext,
        distributor_id: &str,
    ) -> Result<Vec<driver::Model>, ServiceError> {
        ctx.require(Role::Company)?;
        scoping::require_distributor(&*self.db_pool, distributor_id).await?;
        self.roster_of(distributor_id).await
    }

    #[instrument(skip(self, ctx, command), fields(user_id = %ctx.user_id))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        mut command: UpdateDriverCommand,
    ) -> Result<driver::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        command.distributor_id = ctx.user_id.clone();
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn remove(&self, ctx: &RequestContext, driver_id: i32) -> Result<(), ServiceError> {
        ctx.require(Role::Distributor)?;
        RemoveDriverCommand {
            driver_id,
            distributor_id: ctx.user_id.clone(),
        }
        .execute(self.db_pool.clone(), self.event_sender.clone())
        .await
    }

    async fn roster_of(&self, distributor_id: &str) -> Result<Vec<driver::Model>, ServiceError> {
        Ok(scoping::scoped_drivers(distributor_id)
            .order_by_asc(driver::Column::FullName)
            .order_by_asc(driver::Column::Id)
            .all(&*self.db_pool)
            .await?)
    }
}
