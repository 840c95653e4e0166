use crate::{
    auth::{RequestContext, Role},
    commands::{
        shipments::{
            AcceptShipmentCommand, AssignDriverCommand, ConfirmDeliveryCommand,
            CreateShipmentCommand, RejectShipmentCommand, UpdateShipmentLocationCommand,
        },
        Command,
    },
    db::DbPool,
    errors::ServiceError,
    events::{outbox::OutboxDispatcher, EventSender},
    models::{shipment, ShipmentStatus},
    scoping,
    services::notifications::NotificationService,
};
use sea_orm::{QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

/// Shipment counts for the caller's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ShipmentSummary {
    pub pending: u64,
    pub in_transit: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub total: u64,
    /// Sum of `quantity` over delivered shipments
    pub delivered_quantity: i64,
}

impl ShipmentSummary {
    fn record(&mut self, status: ShipmentStatus, quantity: Option<i32>) {
        self.total += 1;
        match status {
            ShipmentStatus::Pending => self.pending += 1,
            ShipmentStatus::InTransit => self.in_transit += 1,
            ShipmentStatus::Delivered => {
                self.delivered += 1;
                self.delivered_quantity += i64::from(quantity.unwrap_or(0));
            }
            ShipmentStatus::Rejected => self.rejected += 1,
        }
    }
}

/// Service for the shipment lifecycle
#[derive(Clone)]
pub struct ShipmentService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    outbox: Arc<OutboxDispatcher>,
    notifications: NotificationService,
}

impl ShipmentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        outbox: Arc<OutboxDispatcher>,
    ) -> Self {
        let notifications = NotificationService::new(db_pool.clone());
        Self {
            db_pool,
            event_sender,
            outbox,
            notifications,
        }
    }

    async fn run<C>(&self, command: C) -> Result<C::Result, ServiceError>
    where
        C: Command,
    {
        let result = command
            .execute(self.db_pool.clone(), self.event_sender.clone())
            .await?;
        self.outbox.nudge();
        Ok(result)
    }

    /// Creates a shipment owned by the calling company
    #[instrument(skip(self, ctx, command), fields(user_id = %ctx.user_id))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        mut command: CreateShipmentCommand,
    ) -> Result<shipment::Model, ServiceError> {
        ctx.require(Role::Company)?;
        command.company_id = ctx.user_id.clone();
        let created = self.run(command).await?;
        info!(shipment_id = created.id, "shipment created");
        Ok(created)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn accept(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
    ) -> Result<shipment::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.run(AcceptShipmentCommand {
            shipment_id,
            distributor_id: ctx.user_id.clone(),
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn reject(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
    ) -> Result<shipment::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.run(RejectShipmentCommand {
            shipment_id,
            distributor_id: ctx.user_id.clone(),
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn assign_driver(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
        driver_id: i32,
    ) -> Result<shipment::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.run(AssignDriverCommand {
            shipment_id,
            driver_id,
            distributor_id: ctx.user_id.clone(),
        })
        .await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn confirm_delivery(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
    ) -> Result<shipment::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.run(ConfirmDeliveryCommand {
            shipment_id,
            distributor_id: ctx.user_id.clone(),
        })
        .await
    }

    /// Routes the shipment to a store at `address`
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn update_location(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
        address: String,
    ) -> Result<shipment::Model, ServiceError> {
        ctx.require(Role::Distributor)?;
        self.run(UpdateShipmentLocationCommand {
            shipment_id,
            distributor_id: ctx.user_id.clone(),
            address,
        })
        .await
    }

    /// Shipments in the caller's scope, newest first. Fetching the list
    /// counts as reading for drivers, so their notifications are cleared.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<shipment::Model>, ServiceError> {
        let shipments = scoping::scoped_shipments(ctx)
            .order_by_desc(shipment::Column::CreatedAt)
            .order_by_desc(shipment::Column::Id)
            .all(&*self.db_pool)
            .await?;

        if ctx.role == Role::Driver {
            let cleared = self.notifications.mark_all_read(&ctx.user_id).await?;
            info!(cleared, "driver notifications marked read");
        }
        Ok(shipments)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
    ) -> Result<shipment::Model, ServiceError> {
        scoping::find_visible_shipment(&*self.db_pool, ctx, shipment_id).await
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn summary(&self, ctx: &RequestContext) -> Result<ShipmentSummary, ServiceError> {
        let rows: Vec<(ShipmentStatus, Option<i32>)> = scoping::scoped_shipments(ctx)
            .select_only()
            .column(shipment::Column::Status)
            .column(shipment::Column::Quantity)
            .into_tuple()
            .all(&*self.db_pool)
            .await?;

        let mut summary = ShipmentSummary::default();
        for (status, quantity) in rows {
            summary.record(status, quantity);
        }
        Ok(summary)
    }
}
