use crate::{
    commands::Command,
    db::DbPool,
    errors::ServiceError,
    events::{
        outbox::{record_side_effects, SideEffect},
        EventSender,
    },
    realtime::{RealtimeEvent, Topic},
};
use async_trait::async_trait;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::report_location_command::assigned_shipment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripPhase {
    Started,
    Ended,
}

/// The assigned driver announces the start or end of a trip. Broadcast only;
/// status changes stay with the distributor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSignalCommand {
    pub shipment_id: i32,
    pub driver_user_id: String,
    pub phase: TripPhase,
}

#[async_trait]
impl Command for TripSignalCommand {
    type Result = RealtimeEvent;

    #[instrument(skip(self, db_pool, _event_sender), fields(shipment_id = self.shipment_id))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        _event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let txn = db_pool.begin().await?;
        let shipment = assigned_shipment(&txn, self.shipment_id, &self.driver_user_id).await?;

        let event = match self.phase {
            TripPhase::Started => RealtimeEvent::TripStarted {
                shipment_id: shipment.id,
                status: shipment.status,
            },
            TripPhase::Ended => RealtimeEvent::TripEnded {
                shipment_id: shipment.id,
                status: shipment.status,
            },
        };
        let recorded = record_side_effects(
            &txn,
            &[SideEffect::broadcast(Topic::Shipment(shipment.id), event.clone())],
        )
        .await;
        txn.commit().await?;

        info!(phase = ?self.phase, recorded, "trip signal");
        Ok(event)
    }
}
