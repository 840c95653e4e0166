use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::outbox;
use crate::models::notification;
use crate::realtime::{RealtimeEvent, Topic};
use crate::scoping;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Stores a notification for `user_id` and queues its realtime push on
/// `user:{id}`. Both rows go through `db`, usually a command's savepoint.
pub async fn enqueue<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    shipment_id: Option<i32>,
    message: &str,
) -> Result<notification::Model, ServiceError> {
    let stored = notification::ActiveModel {
        user_id: Set(user_id.to_string()),
        shipment_id: Set(shipment_id),
        message: Set(message.to_string()),
        is_read: Set(false),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    outbox::enqueue(
        db,
        "notification",
        Some(stored.id.to_string()),
        &Topic::User(user_id.to_string()),
        &RealtimeEvent::NotificationReceived {
            message: stored.message.clone(),
            shipment_id,
        },
    )
    .await?;

    debug!(notification_id = stored.id, user_id, "notification enqueued");
    Ok(stored)
}

/// Read side of the notification outbox.
#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Unread notifications of `user_id`, newest first.
    #[instrument(skip(self))]
    pub async fn unread_for(&self, user_id: &str) -> Result<Vec<notification::Model>, ServiceError> {
        let rows = scoping::scoped_notifications(user_id)
            .filter(notification::Column::IsRead.eq(false))
            .order_by_desc(notification::Column::CreatedAt)
            .order_by_desc(notification::Column::Id)
            .all(&*self.db_pool)
            .await?;
        Ok(rows)
    }

    /// Marks the given notifications read. Ids owned by someone else, or
    /// already read, are ignored; returns how many rows changed.
    #[instrument(skip(self))]
    pub async fn mark_read(&self, user_id: &str, ids: &[i32]) -> Result<u64, ServiceError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::Id.is_in(ids.iter().copied()))
            .filter(notification::Column::IsRead.eq(false))
            .exec(&*self.db_pool)
            .await?;
        Ok(result.rows_affected)
    }

    #[instrument(skip(self))]
    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, ServiceError> {
        let result = notification::Entity::update_many()
            .col_expr(notification::Column::IsRead, Expr::value(true))
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .exec(&*self.db_pool)
            .await?;
        Ok(result.rows_affected)
    }
}
