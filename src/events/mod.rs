use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub mod outbox;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Domain events emitted after a command commits. They feed the in-process
/// audit log; client-facing pushes go through the outbox instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ShipmentCreated(i32),
    ShipmentAccepted(i32),
    ShipmentRejected(i32),
    DriverAssigned {
        shipment_id: i32,
        driver_id: i32,
    },
    ShipmentDelivered(i32),
    ShipmentRouted {
        shipment_id: i32,
        store_id: i32,
    },
    LocationReported {
        shipment_id: i32,
        location_id: i32,
        recorded_at: DateTime<Utc>,
    },
    DriverAdded(i32),
    DriverUpdated(i32),
    DriverRemoved(i32),
    StoreAdded(i32),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ShipmentCreated(_) => "shipment_created",
            Event::ShipmentAccepted(_) => "shipment_accepted",
            Event::ShipmentRejected(_) => "shipment_rejected",
            Event::DriverAssigned { .. } => "driver_assigned",
            Event::ShipmentDelivered(_) => "shipment_delivered",
            Event::ShipmentRouted { .. } => "shipment_routed",
            Event::LocationReported { .. } => "location_reported",
            Event::DriverAdded(_) => "driver_added",
            Event::DriverUpdated(_) => "driver_updated",
            Event::DriverRemoved(_) => "driver_removed",
            Event::StoreAdded(_) => "store_added",
        }
    }
}

/// Consumes domain events and writes them to the structured log.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("pharmaflow.events.processed", 1, "kind" => event.kind());
        match &event {
            Event::LocationReported {
                shipment_id,
                location_id,
                recorded_at,
            } => {
                // Chatty; keep out of info
                tracing::debug!(shipment_id, location_id, %recorded_at, "location reported");
            }
            other => info!(kind = other.kind(), event = ?other, "domain event"),
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sender_delivers_to_the_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender.send(Event::ShipmentAccepted(9)).await.unwrap();
        assert_eq!(rx.recv().await, Some(Event::ShipmentAccepted(9)));
    }

    #[tokio::test]
    async fn send_fails_once_the_consumer_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::DriverRemoved(1)).await.is_err());
    }
}
