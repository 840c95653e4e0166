use crate::{
    auth::{RequestContext, Role},
    commands::{stores::AddStoreCommand, Command},
    db::DbPool,
    errors::ServiceError,
    events::EventSender,
    models::store,
    scoping,
};
use sea_orm::QueryOrder;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct StoreService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl StoreService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Stores owned by the calling distributor, by name.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<store::Model>, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.stores_of(&ctx.user_id).await
    }

    #[instrument(skip(self, ctx, command), fields(user_id = %ctx.user_id))]
    pub async fn add(
        &self,
        ctx: &RequestContext,
        mut command: AddStoreCommand,
    ) -> Result<store::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        command.distributor_id = ctx.user_id.clone();
        command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await
    }

    /// Stores a company may route a new shipment to when it names `distributor_id`.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn for_distributor(
        &self,
        ctx: &RequestContext,
        distributor_id: &str,
    ) -> Result<Vec<store::Model>, ServiceError> {
        ctx.require(Role::Company)?;
        scoping::require_distributor(&*self.db_pool, distributor_id).await?;
        self.stores_of(distributor_id).await
    }

    async fn stores_of(&self, distributor_id: &str) -> Result<Vec<store::Model>, ServiceError> {
        Ok(scoping::scoped_stores(distributor_id)
            .order_by_asc(store::Column::Name)
            .order_by_asc(store::Column::Id)
            .all(&*self.db_pool)
            .await?)
    }
}
