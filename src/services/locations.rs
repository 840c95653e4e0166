//! Append-only ledger of GPS fixes per shipment.

use crate::{
    auth::{RequestContext, Role},
    commands::{
        shipments::{
            normalize_coordinate, validate_coordinates, ReportLocationCommand, TripPhase,
            TripSignalCommand,
        },
        Command,
    },
    db::DbPool,
    errors::ServiceError,
    events::{outbox::OutboxDispatcher, EventSender},
    models::{shipment, vehicle_location},
    realtime::RealtimeEvent,
    scoping,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};

pub const DEFAULT_HISTORY_PAGE_SIZE: u64 = 100;

/// Appends one fix. The shipment must exist; coordinates are stored with nine
/// fractional digits.
pub async fn append<C: ConnectionTrait>(
    db: &C,
    shipment_id: i32,
    latitude: Decimal,
    longitude: Decimal,
    timestamp: DateTime<Utc>,
) -> Result<vehicle_location::Model, ServiceError> {
    validate_coordinates(latitude, longitude)?;

    shipment::Entity::find_by_id(shipment_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::shipment_not_found(shipment_id))?;

    let fix = vehicle_location::ActiveModel {
        shipment_id: Set(shipment_id),
        latitude: Set(normalize_coordinate(latitude)),
        longitude: Set(normalize_coordinate(longitude)),
        timestamp: Set(timestamp),
        ..Default::default()
    }
    .insert(db)
    .await?;

    debug!(shipment_id, location_id = fix.id, "location appended");
    Ok(fix)
}

/// Most recent fix by timestamp; equal timestamps resolve to the higher id.
pub async fn latest_for<C: ConnectionTrait>(
    db: &C,
    shipment_id: i32,
) -> Result<Option<vehicle_location::Model>, ServiceError> {
    Ok(vehicle_location::Entity::find()
        .filter(vehicle_location::Column::ShipmentId.eq(shipment_id))
        .order_by_desc(vehicle_location::Column::Timestamp)
        .order_by_desc(vehicle_location::Column::Id)
        .one(db)
        .await?)
}

/// Lazy, restartable view over a shipment's fixes in recording order.
///
/// Each call to [`LocationHistory::stream`] starts a new paged query, so the
/// history can be walked any number of times.
#[derive(Clone)]
pub struct LocationHistory {
    db: Arc<DbPool>,
    shipment_id: i32,
    page_size: u64,
}

impl LocationHistory {
    pub fn new(db: Arc<DbPool>, shipment_id: i32, page_size: u64) -> Self {
        Self {
            db,
            shipment_id,
            page_size: page_size.max(1),
        }
    }

    pub fn shipment_id(&self) -> i32 {
        self.shipment_id
    }

    pub fn stream(&self) -> BoxStream<'_, Result<vehicle_location::Model, ServiceError>> {
        let pages = vehicle_location::Entity::find()
            .filter(vehicle_location::Column::ShipmentId.eq(self.shipment_id))
            .order_by_asc(vehicle_location::Column::Timestamp)
            .order_by_asc(vehicle_location::Column::Id)
            .paginate(self.db.as_ref(), self.page_size);

        stream::try_unfold((pages, 0u64), |(pages, page)| async move {
            let rows = pages.fetch_page(page).await?;
            if rows.is_empty() {
                return Ok::<_, ServiceError>(None);
            }
            let batch = stream::iter(rows.into_iter().map(Ok::<_, ServiceError>));
            Ok(Some((batch, (pages, page + 1))))
        })
        .try_flatten()
        .boxed()
    }

    pub async fn collect(&self) -> Result<Vec<vehicle_location::Model>, ServiceError> {
        self.stream().try_collect().await
    }
}

/// Location reporting and reads, scoped to the caller.
#[derive(Clone)]
pub struct LocationService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    outbox: Arc<OutboxDispatcher>,
}

impl LocationService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        outbox: Arc<OutboxDispatcher>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            outbox,
        }
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn report_location(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
        latitude: Decimal,
        longitude: Decimal,
    ) -> Result<vehicle_location::Model, ServiceError> {
        ctx.require(Role::Driver)?;
        let fix = ReportLocationCommand {
            shipment_id,
            driver_user_id: ctx.user_id.clone(),
            latitude,
            longitude,
        }
        .execute(self.db_pool.clone(), self.event_sender.clone())
        .await?;
        self.outbox.nudge();
        Ok(fix)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn signal_trip(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
        phase: TripPhase,
    ) -> Result<RealtimeEvent, ServiceError> {
        ctx.require(Role::Driver)?;
        let event = TripSignalCommand {
            shipment_id,
            driver_user_id: ctx.user_id.clone(),
            phase,
        }
        .execute(self.db_pool.clone(), self.event_sender.clone())
        .await?;
        self.outbox.nudge();
        Ok(event)
    }

    pub async fn latest_for(
        &self,
        shipment_id: i32,
    ) -> Result<Option<vehicle_location::Model>, ServiceError> {
        latest_for(&*self.db_pool, shipment_id).await
    }

    /// Latest fix of a shipment the caller can see; otherwise `NotFound`.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn latest_visible(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
    ) -> Result<Option<vehicle_location::Model>, ServiceError> {
        scoping::find_visible_shipment(&*self.db_pool, ctx, shipment_id).await?;
        self.latest_for(shipment_id).await
    }

    pub fn history_for(&self, shipment_id: i32) -> LocationHistory {
        LocationHistory::new(self.db_pool.clone(), shipment_id, DEFAULT_HISTORY_PAGE_SIZE)
    }

    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn history_visible(
        &self,
        ctx: &RequestContext,
        shipment_id: i32,
    ) -> Result<LocationHistory, ServiceError> {
        scoping::find_visible_shipment(&*self.db_pool, ctx, shipment_id).await?;
        Ok(self.history_for(shipment_id))
    }
}
