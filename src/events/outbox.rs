//! Durable side-effect queue.
//!
//! Commands record notifications and broadcasts as rows in `outbox_events`
//! inside their own transaction (nested in a savepoint so a failing side effect
//! cannot undo the state change). [`OutboxDispatcher`] drains the table and
//! publishes each row on the realtime hub, retrying with exponential backoff.

use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::models::outbox_event::{self, OutboxStatus};
use crate::realtime::{RealtimeEvent, RealtimePublisher, Topic};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use rand::Rng;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2; // exponential backoff base
/// How long a claimed row stays invisible to other passes.
pub const PROCESSING_LEASE_SECS: i64 = 60;

/// A consequence of a state transition that must not block or undo it.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Durable notification for a user, pushed to `user:{id}` as well.
    Notify {
        user_id: String,
        shipment_id: Option<i32>,
        message: String,
    },
    /// Push-only event; nothing is kept once it is dispatched.
    Broadcast { topic: Topic, event: RealtimeEvent },
}

impl SideEffect {
    pub fn notify(user_id: impl Into<String>, shipment_id: i32, message: impl Into<String>) -> Self {
        SideEffect::Notify {
            user_id: user_id.into(),
            shipment_id: Some(shipment_id),
            message: message.into(),
        }
    }

    pub fn broadcast(topic: Topic, event: RealtimeEvent) -> Self {
        SideEffect::Broadcast { topic, event }
    }

    async fn record<C: ConnectionTrait>(&self, db: &C) -> Result<(), ServiceError> {
        match self {
            SideEffect::Notify {
                user_id,
                shipment_id,
                message,
            } => {
                crate::services::notifications::enqueue(db, user_id, *shipment_id, message)
                    .await?;
            }
            SideEffect::Broadcast { topic, event } => {
                let aggregate_id = match topic {
                    Topic::Shipment(id) => Some(id.to_string()),
                    Topic::User(_) => None,
                };
                enqueue(db, "shipment", aggregate_id, topic, event).await?;
            }
        }
        Ok(())
    }
}

/// Writes one realtime event into the outbox using the caller's connection,
/// so it commits or rolls back together with the caller's work.
pub async fn enqueue<C: ConnectionTrait>(
    db: &C,
    aggregate_type: &str,
    aggregate_id: Option<String>,
    topic: &Topic,
    event: &RealtimeEvent,
) -> Result<outbox_event::Model, ServiceError> {
    let now = Utc::now();
    let row = outbox_event::ActiveModel {
        aggregate_type: Set(aggregate_type.to_string()),
        aggregate_id: Set(aggregate_id),
        event_type: Set(event.name().to_string()),
        topic: Set(topic.to_string()),
        payload: Set(serde_json::to_string(event)?),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        created_at: Set(now),
        processed_at: Set(None),
        error_message: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    debug!(
        outbox_id = row.id,
        event_type = %row.event_type,
        topic = %row.topic,
        "enqueued outbox event"
    );
    Ok(row)
}

/// Records `effects` inside a savepoint of `txn`.
///
/// Returns `false` when recording failed; the savepoint is rolled back, the
/// failure is logged as a dependency failure and `txn` stays usable.
pub async fn record_side_effects(txn: &DatabaseTransaction, effects: &[SideEffect]) -> bool {
    if effects.is_empty() {
        return true;
    }

    let savepoint = match txn.begin().await {
        Ok(savepoint) => savepoint,
        Err(e) => {
            let failure = ServiceError::DependencyFailure(format!("savepoint: {}", e));
            error!(error = %failure, "side effects skipped");
            return false;
        }
    };

    for effect in effects {
        if let Err(e) = effect.record(&savepoint).await {
            let failure = ServiceError::DependencyFailure(e.to_string());
            error!(error = %failure, effect = ?effect, "side effect not recorded");
            counter!("pharmaflow.outbox.record_failed", 1);
            if let Err(rollback) = savepoint.rollback().await {
                warn!(error = %rollback, "failed rolling back side effect savepoint");
            }
            return false;
        }
    }

    match savepoint.commit().await {
        Ok(()) => true,
        Err(e) => {
            let failure = ServiceError::DependencyFailure(format!("release savepoint: {}", e));
            error!(error = %failure, "side effects not recorded");
            false
        }
    }
}

/// Outcome of one [`OutboxDispatcher::drain_once`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
    /// Rows claimed but not settled; they are picked up again once their
    /// lease expires.
    pub unsettled: usize,
}

pub struct OutboxDispatcher {
    db: Arc<DbPool>,
    publisher: Arc<dyn RealtimePublisher>,
    batch_size: u64,
    wakeup: Notify,
}

impl OutboxDispatcher {
    pub fn new(db: Arc<DbPool>, publisher: Arc<dyn RealtimePublisher>, batch_size: u64) -> Self {
        Self {
            db,
            publisher,
            batch_size: batch_size.max(1),
            wakeup: Notify::new(),
        }
    }

    /// Wakes the worker early; cheap and safe to call after every command.
    pub fn nudge(&self) {
        self.wakeup.notify_one();
    }

    /// Claims and dispatches one batch of due rows.
    ///
    /// A claim is a lease: the row moves to `Processing` with `available_at`
    /// pushed out by [`PROCESSING_LEASE_SECS`]. A row whose lease ran out
    /// without being settled is due again on a later pass.
    pub async fn drain_once(&self) -> Result<DrainReport, ServiceError> {
        let db = self.db.as_ref();
        let now = Utc::now();
        let due = outbox_event::Entity::find()
            .filter(due_condition(now))
            .order_by_asc(outbox_event::Column::Id)
            .limit(self.batch_size)
            .all(db)
            .await?;

        let mut report = DrainReport::default();
        for row in due {
            if row.status == OutboxStatus::Processing {
                warn!(outbox_id = row.id, attempts = row.attempts, "reclaiming expired outbox lease");
            }

            // Another worker may have taken the row in the meantime
            let lease_until = Utc::now() + ChronoDuration::seconds(PROCESSING_LEASE_SECS);
            let claimed = outbox_event::Entity::update_many()
                .col_expr(
                    outbox_event::Column::Status,
                    Expr::value(OutboxStatus::Processing),
                )
                .col_expr(
                    outbox_event::Column::Attempts,
                    Expr::col(outbox_event::Column::Attempts).add(1),
                )
                .col_expr(outbox_event::Column::AvailableAt, Expr::value(lease_until))
                .filter(outbox_event::Column::Id.eq(row.id))
                .filter(due_condition(now))
                .exec(db)
                .await;
            match claimed {
                Ok(result) if result.rows_affected == 0 => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(outbox_id = row.id, error = %e, "failed claiming outbox row");
                    report.unsettled += 1;
                    continue;
                }
            }

            let attempts = row.attempts + 1;
            let settled = match self.dispatch(&row) {
                Ok(receivers) => self.mark_delivered(row.id).await.map(|()| {
                    counter!("pharmaflow.outbox.delivered", 1);
                    debug!(outbox_id = row.id, receivers, "outbox event delivered");
                    report.delivered += 1;
                }),
                Err(Dispatch::Poison(reason)) => {
                    self.mark_failed(row.id, &reason).await.map(|()| report.failed += 1)
                }
                Err(Dispatch::Retry(reason)) if attempts < MAX_ATTEMPTS => self
                    .schedule_retry(row.id, attempts, &reason)
                    .await
                    .map(|()| report.retried += 1),
                Err(Dispatch::Retry(reason)) => self
                    .mark_failed(row.id, &format!("max attempts exceeded: {}", reason))
                    .await
                    .map(|()| report.failed += 1),
            };

            // The lease brings the row back; keep going with the batch
            if let Err(e) = settled {
                error!(outbox_id = row.id, error = %e, "failed recording outbox outcome");
                counter!("pharmaflow.outbox.unsettled", 1);
                report.unsettled += 1;
            }
        }

        Ok(report)
    }

    fn dispatch(&self, row: &outbox_event::Model) -> Result<usize, Dispatch> {
        let topic: Topic = row
            .topic
            .parse()
            .map_err(|e: crate::realtime::InvalidTopic| Dispatch::Poison(e.to_string()))?;
        let event: RealtimeEvent = serde_json::from_str(&row.payload)
            .map_err(|e| Dispatch::Poison(format!("undecodable payload: {}", e)))?;

        self.publisher
            .publish(&topic, event)
            .map_err(|e| Dispatch::Retry(e.to_string()))
    }

    async fn mark_delivered(&self, id: i32) -> Result<(), ServiceError> {
        outbox_event::Entity::update_many()
            .col_expr(outbox_event::Column::Status, Expr::value(OutboxStatus::Delivered))
            .col_expr(outbox_event::Column::ProcessedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                outbox_event::Column::ErrorMessage,
                Expr::value(Option::<String>::None),
            )
            .filter(outbox_event::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn schedule_retry(&self, id: i32, attempts: i32, reason: &str) -> Result<(), ServiceError> {
        let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts.max(0) as u32);
        let jitter_ms = rand::thread_rng().gen_range(0..1000);
        let available_at = Utc::now()
            + ChronoDuration::seconds(backoff)
            + ChronoDuration::milliseconds(jitter_ms);

        warn!(outbox_id = id, attempts, %available_at, reason, "outbox dispatch failed, retrying");
        outbox_event::Entity::update_many()
            .col_expr(outbox_event::Column::Status, Expr::value(OutboxStatus::Pending))
            .col_expr(outbox_event::Column::AvailableAt, Expr::value(available_at))
            .col_expr(
                outbox_event::Column::ErrorMessage,
                Expr::value(Some(reason.to_string())),
            )
            .filter(outbox_event::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: i32, reason: &str) -> Result<(), ServiceError> {
        error!(outbox_id = id, reason, "outbox event abandoned");
        counter!("pharmaflow.outbox.failed", 1);
        outbox_event::Entity::update_many()
            .col_expr(outbox_event::Column::Status, Expr::value(OutboxStatus::Failed))
            .col_expr(outbox_event::Column::ProcessedAt, Expr::value(Some(Utc::now())))
            .col_expr(
                outbox_event::Column::ErrorMessage,
                Expr::value(Some(reason.to_string())),
            )
            .filter(outbox_event::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Background worker: drains on every tick or nudge.
    pub fn start_worker(self: Arc<Self>, poll_interval: Duration) -> JoinHandle<()> {
        info!(poll_ms = poll_interval.as_millis() as u64, "starting outbox worker");
        tokio::spawn(async move {
            loop {
                match self.drain_once().await {
                    Ok(report) if report != DrainReport::default() => {
                        debug!(?report, "outbox pass complete");
                    }
                    Ok(_) => {}
                    Err(e) => error!("outbox worker error: {}", e),
                }
                tokio::select! {
                    _ = sleep(poll_interval) => {}
                    _ = self.wakeup.notified() => {}
                }
            }
        })
    }
}

/// Pending rows that are due, and claimed rows whose lease has expired.
fn due_condition(now: DateTime<Utc>) -> Condition {
    Condition::all()
        .add(
            outbox_event::Column::Status
                .is_in([OutboxStatus::Pending, OutboxStatus::Processing]),
        )
        .add(outbox_event::Column::AvailableAt.lte(now))
}

enum Dispatch {
    /// Row can never be delivered
    Poison(String),
    Retry(String),
}
