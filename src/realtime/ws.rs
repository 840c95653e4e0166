//! Websocket endpoint for the realtime channel.
//!
//! A connection joins `user:{me}` and every open shipment in the caller's
//! scope when it opens. Each joined topic gets a forwarder task that copies
//! hub messages into the connection's outgoing queue; one writer task owns the
//! socket sink. Closing the socket only stops those tasks.

use crate::{
    auth::RequestContext,
    commands::shipments::TripPhase,
    errors::ServiceError,
    models::{shipment, ShipmentStatus},
    realtime::{RealtimeHub, Topic},
    scoping, AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest client frame accepted
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

const OUTGOING_BUFFER: usize = 256;

/// Frames a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        topic: Topic,
    },
    Unsubscribe {
        topic: Topic,
    },
    UpdateLocation {
        shipment_id: i32,
        latitude: Decimal,
        longitude: Decimal,
    },
    StartTrip {
        shipment_id: i32,
    },
    EndTrip {
        shipment_id: i32,
    },
}

/// Replies to client frames. Broadcast events are sent as
/// [`RealtimeMessage`](super::RealtimeMessage) frames instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Ack { action: String, shipment_id: i32 },
    Error { status: u16, message: String },
}

impl From<&ServiceError> for ServerMessage {
    fn from(err: &ServiceError) -> Self {
        ServerMessage::Error {
            status: err.status_code().as_u16(),
            message: err.response_message(),
        }
    }
}

/// `GET /api/v1/realtime`
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Response {
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_BUFFER);
            let session = ConnectionSession::new(state, ctx, outgoing);
            session.run(socket, outgoing_rx).await;
        })
}

/// One websocket connection and the topics it has joined.
pub struct ConnectionSession {
    state: AppState,
    ctx: RequestContext,
    outgoing: mpsc::Sender<String>,
    forwarders: HashMap<Topic, JoinHandle<()>>,
}

impl ConnectionSession {
    pub fn new(state: AppState, ctx: RequestContext, outgoing: mpsc::Sender<String>) -> Self {
        Self {
            state,
            ctx,
            outgoing,
            forwarders: HashMap::new(),
        }
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.forwarders.keys()
    }

    async fn run(mut self, socket: WebSocket, mut outgoing_rx: mpsc::Receiver<String>) {
        info!(user_id = %self.ctx.user_id, role = %self.ctx.role, "realtime connection opened");

        let (mut sink, mut stream) = socket.split();
        let writer = tokio::spawn(async move {
            while let Some(text) = outgoing_rx.recv().await {
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        if let Err(e) = self.join_defaults().await {
            warn!(error = %e, "failed joining default topics");
        }

        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => continue,
            };

            let reply = self.handle_text(&text).await;
            if self.outgoing.send(reply).await.is_err() {
                break;
            }
        }

        self.close();
        writer.abort();
        info!(user_id = %self.ctx.user_id, "realtime connection closed");
    }

    /// Joins `user:{me}` and the caller's open shipments.
    pub async fn join_defaults(&mut self) -> Result<(), ServiceError> {
        self.join(Topic::User(self.ctx.user_id.clone()));

        let open = scoping::scoped_shipments(&self.ctx)
            .filter(
                shipment::Column::Status.is_in([ShipmentStatus::Pending, ShipmentStatus::InTransit]),
            )
            .all(self.state.db.as_ref())
            .await?;
        for shipment in open {
            self.join(Topic::Shipment(shipment.id));
        }
        Ok(())
    }

    /// Parses and dispatches one client frame, returning the serialized reply.
    pub async fn handle_text(&mut self, text: &str) -> String {
        let reply = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => match self.dispatch(message).await {
                Ok(reply) => reply,
                Err(e) => {
                    debug!(error = %e, "realtime command refused");
                    ServerMessage::from(&e)
                }
            },
            Err(e) => ServerMessage::Error {
                status: 400,
                message: format!("unrecognised message: {}", e),
            },
        };
        serde_json::to_string(&reply).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","status":500,"message":"{}"}}"#, e)
        })
    }

    async fn dispatch(&mut self, message: ClientMessage) -> Result<ServerMessage, ServiceError> {
        let services = &self.state.services;
        match message {
            ClientMessage::Subscribe { topic } => {
                self.authorize(&topic).await?;
                self.join(topic.clone());
                Ok(ServerMessage::Subscribed { topic })
            }
            ClientMessage::Unsubscribe { topic } => {
                if let Some(handle) = self.forwarders.remove(&topic) {
                    handle.abort();
                }
                Ok(ServerMessage::Unsubscribed { topic })
            }
            ClientMessage::UpdateLocation {
                shipment_id,
                latitude,
                longitude,
            } => {
                services
                    .locations
                    .report_location(&self.ctx, shipment_id, latitude, longitude)
                    .await?;
                Ok(ServerMessage::Ack {
                    action: "update_location".to_string(),
                    shipment_id,
                })
            }
            ClientMessage::StartTrip { shipment_id } => {
                services
                    .locations
                    .signal_trip(&self.ctx, shipment_id, TripPhase::Started)
                    .await?;
                Ok(ServerMessage::Ack {
                    action: "start_trip".to_string(),
                    shipment_id,
                })
            }
            ClientMessage::EndTrip { shipment_id } => {
                services
                    .locations
                    .signal_trip(&self.ctx, shipment_id, TripPhase::Ended)
                    .await?;
                Ok(ServerMessage::Ack {
                    action: "end_trip".to_string(),
                    shipment_id,
                })
            }
        }
    }

    /// A user topic is the caller's own; a shipment topic must be in scope.
    async fn authorize(&self, topic: &Topic) -> Result<(), ServiceError> {
        match topic {
            Topic::User(user_id) if *user_id == self.ctx.user_id => Ok(()),
            Topic::User(_) => Err(ServiceError::Forbidden(
                "cannot subscribe to another user's topic".to_string(),
            )),
            Topic::Shipment(id) => {
                scoping::find_visible_shipment(self.state.db.as_ref(), &self.ctx, *id).await?;
                Ok(())
            }
        }
    }

    fn join(&mut self, topic: Topic) {
        if self.forwarders.contains_key(&topic) {
            return;
        }
        let handle = spawn_forwarder(&self.state.hub, topic.clone(), self.outgoing.clone());
        self.forwarders.insert(topic, handle);
    }

    fn close(&mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_forwarder(
    hub: &Arc<RealtimeHub>,
    topic: Topic,
    outgoing: mpsc::Sender<String>,
) -> JoinHandle<()> {
    let mut rx = hub.subscribe(&topic);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    let frame = match serde_json::to_string(&message) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(%topic, error = %e, "dropping unserializable realtime event");
                            continue;
                        }
                    };
                    if outgoing.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%topic, skipped, "realtime subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
