//! Realtime fan-out.
//!
//! The hub keeps one `tokio::sync::broadcast` channel per live topic. Nothing
//! here is durable; the outbox is the durable record and feeds the hub through
//! [`RealtimePublisher`].

use dashmap::DashMap;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use utoipa::ToSchema;

use crate::models::ShipmentStatus;

pub mod ws;

/// Default buffer per topic channel; slow receivers beyond this lag and skip.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Realtime topic, written `shipment:{id}` or `user:{id}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    Shipment(i32),
    User(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Shipment(id) => write!(f, "shipment:{}", id),
            Topic::User(id) => write!(f, "user:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid topic '{0}', expected shipment:{{id}} or user:{{id}}")]
pub struct InvalidTopic(pub String);

impl FromStr for Topic {
    type Err = InvalidTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("shipment", id)) => id
                .parse::<i32>()
                .map(Topic::Shipment)
                .map_err(|_| InvalidTopic(s.to_string())),
            Some(("user", id)) if !id.is_empty() => Ok(Topic::User(id.to_string())),
            _ => Err(InvalidTopic(s.to_string())),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = InvalidTopic;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

/// Events pushed to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "event", content = "data")]
pub enum RealtimeEvent {
    LocationUpdated {
        shipment_id: i32,
        latitude: Decimal,
        longitude: Decimal,
        status: ShipmentStatus,
    },
    NotificationReceived {
        message: String,
        shipment_id: Option<i32>,
    },
    TripStarted {
        shipment_id: i32,
        status: ShipmentStatus,
    },
    TripEnded {
        shipment_id: i32,
        status: ShipmentStatus,
    },
    StatusChanged {
        shipment_id: i32,
        status: ShipmentStatus,
    },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::LocationUpdated { .. } => "LocationUpdated",
            RealtimeEvent::NotificationReceived { .. } => "NotificationReceived",
            RealtimeEvent::TripStarted { .. } => "TripStarted",
            RealtimeEvent::TripEnded { .. } => "TripEnded",
            RealtimeEvent::StatusChanged { .. } => "StatusChanged",
        }
    }
}

/// Wire frame: `{"topic": "...", "event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub topic: Topic,
    #[serde(flatten)]
    pub event: RealtimeEvent,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("realtime transport unavailable: {0}")]
    Unavailable(String),
}

/// Sink the outbox dispatcher publishes into.
///
/// Returns the number of live receivers reached; zero is a success.
#[cfg_attr(test, mockall::automock)]
pub trait RealtimePublisher: Send + Sync {
    fn publish(&self, topic: &Topic, event: RealtimeEvent) -> Result<usize, PublishError>;
}

pub struct RealtimeHub {
    channels: DashMap<Topic, broadcast::Sender<RealtimeMessage>>,
    capacity: usize,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Joins `topic`. The channel is forgotten once its last subscription drops.
    pub fn subscribe(self: &Arc<Self>, topic: &Topic) -> Subscription {
        let rx = self
            .channels
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        Subscription {
            rx: Some(rx),
            hub: Arc::clone(self),
            topic: topic.clone(),
        }
    }

    /// Drops the channel for `topic` if nobody is listening any more.
    fn release(&self, topic: &Topic) {
        if self
            .channels
            .remove_if(topic, |_, tx| tx.receiver_count() == 0)
            .is_some()
        {
            trace!(%topic, "released idle topic");
        }
    }

    /// Best-effort fan-out. A topic nobody listens to is dropped silently.
    pub fn send(&self, topic: &Topic, event: RealtimeEvent) -> usize {
        let sender = match self.channels.get(topic) {
            Some(entry) => entry.value().clone(),
            None => {
                trace!(%topic, "no subscribers for topic");
                return 0;
            }
        };

        let message = RealtimeMessage {
            topic: topic.clone(),
            event,
        };
        match sender.send(message) {
            Ok(receivers) => {
                counter!("pharmaflow.realtime.published", 1);
                debug!(%topic, receivers, "realtime event published");
                receivers
            }
            Err(_) => {
                self.release(topic);
                0
            }
        }
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.channels
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }
}

/// A live receiver on one topic.
pub struct Subscription {
    rx: Option<broadcast::Receiver<RealtimeMessage>>,
    hub: Arc<RealtimeHub>,
    topic: Topic,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub async fn recv(&mut self) -> Result<RealtimeMessage, broadcast::error::RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(broadcast::error::RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Result<RealtimeMessage, broadcast::error::TryRecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.try_recv(),
            None => Err(broadcast::error::TryRecvError::Closed),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The receiver must be gone before the count is checked
        drop(self.rx.take());
        self.hub.release(&self.topic);
    }
}

impl RealtimePublisher for RealtimeHub {
    fn publish(&self, topic: &Topic, event: RealtimeEvent) -> Result<usize, PublishError> {
        Ok(self.send(topic, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case("shipment:42", Topic::Shipment(42))]
    #[case("user:dist-7", Topic::User("dist-7".to_string()))]
    fn topics_round_trip_through_strings(#[case] raw: &str, #[case] topic: Topic) {
        assert_eq!(raw.parse::<Topic>().unwrap(), topic);
        assert_eq!(topic.to_string(), raw);
    }

    #[rstest]
    #[case("shipment:abc")]
    #[case("user:")]
    #[case("order:1")]
    #[case("shipment")]
    fn malformed_topics_are_rejected(#[case] raw: &str) {
        assert!(raw.parse::<Topic>().is_err());
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let hub = RealtimeHub::default();
        let sent = hub
            .publish(
                &Topic::Shipment(1),
                RealtimeEvent::StatusChanged {
                    shipment_id: 1,
                    status: ShipmentStatus::Delivered,
                },
            )
            .unwrap();
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events_for_their_topic_only() {
        let hub = Arc::new(RealtimeHub::new(8));
        let mut shipment_rx = hub.subscribe(&Topic::Shipment(5));
        let mut other_rx = hub.subscribe(&Topic::Shipment(6));

        let event = RealtimeEvent::LocationUpdated {
            shipment_id: 5,
            latitude: dec!(30.0444),
            longitude: dec!(31.2357),
            status: ShipmentStatus::InTransit,
        };
        assert_eq!(hub.send(&Topic::Shipment(5), event.clone()), 1);

        let received = shipment_rx.recv().await.unwrap();
        assert_eq!(received.topic, Topic::Shipment(5));
        assert_eq!(received.event, event);
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn topics_are_released_when_the_last_subscription_drops() {
        let hub = Arc::new(RealtimeHub::default());
        for n in 0..1000 {
            drop(hub.subscribe(&Topic::User(format!("u{}", n))));
        }
        assert_eq!(hub.topic_count(), 0);

        let first = hub.subscribe(&Topic::Shipment(9));
        let second = hub.subscribe(&Topic::Shipment(9));
        drop(first);
        assert_eq!(hub.topic_count(), 1);
        assert_eq!(hub.subscriber_count(&Topic::Shipment(9)), 1);
        drop(second);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn aborting_a_task_that_holds_a_subscription_releases_the_topic() {
        let hub = Arc::new(RealtimeHub::default());
        let mut subscription = hub.subscribe(&Topic::User("u1".into()));
        let task = tokio::spawn(async move {
            let _ = subscription.recv().await;
        });
        assert_eq!(hub.topic_count(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(hub.topic_count(), 0);
    }

    #[test]
    fn frames_carry_topic_event_and_data() {
        let frame = RealtimeMessage {
            topic: Topic::Shipment(3),
            event: RealtimeEvent::TripStarted {
                shipment_id: 3,
                status: ShipmentStatus::InTransit,
            },
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["topic"], "shipment:3");
        assert_eq!(json["event"], "TripStarted");
        assert_eq!(json["data"]["status"], "In Transit");
    }
}
