//! Notifications, the transactional outbox and realtime delivery.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::{TestApp, COMPANY, DRIVER};
use pharmaflow_tracking::{
    auth::{RequestContext, Role},
    models::{notification, outbox_event, OutboxStatus},
    realtime::{ws::ConnectionSession, Topic},
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, EntityTrait, PaginatorTrait, QueryFilter,
    Statement,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

async fn next_frame(rx: &mut mpsc::Receiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame within timeout")
        .expect("channel open");
    serde_json::from_str(&text).expect("json frame")
}

async fn pending_outbox_rows(app: &TestApp) -> u64 {
    outbox_event::Entity::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
        .count(app.state.db.as_ref())
        .await
        .expect("count outbox")
}

#[tokio::test]
async fn accepted_shipment_reaches_a_connected_company() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;
    // Rows from creation are not this test's concern
    app.state.outbox.drain_once().await.expect("initial drain");

    let (tx, mut rx) = mpsc::channel(16);
    let mut session =
        ConnectionSession::new(app.state.clone(), RequestContext::new(COMPANY, Role::Company), tx);
    session.join_defaults().await.expect("join defaults");
    assert!(session.topics().any(|t| *t == Topic::User(COMPANY.to_string())));
    assert!(session.topics().any(|t| *t == Topic::Shipment(id)));

    let (status, _) = app
        .post(&format!("/api/v1/shipments/{}/accept", id), &app.distributor(), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let report = app.state.outbox.drain_once().await.expect("drain");
    assert_eq!(report.failed, 0);
    assert!(report.delivered >= 2, "{:?}", report);

    let mut events = Vec::new();
    for _ in 0..2 {
        let frame = next_frame(&mut rx).await;
        events.push((
            frame["topic"].as_str().unwrap_or_default().to_string(),
            frame["event"].as_str().unwrap_or_default().to_string(),
            frame["data"].clone(),
        ));
    }
    events.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(events[0].0, format!("shipment:{}", id));
    assert_eq!(events[0].1, "StatusChanged");
    assert_eq!(events[0].2["status"], "In Transit");

    assert_eq!(events[1].0, "user:company-1");
    assert_eq!(events[1].1, "NotificationReceived");
    assert_eq!(
        events[1].2["message"],
        format!("Shipment {} was accepted by the distributor.", id)
    );
}

#[tokio::test]
async fn driver_fixes_are_pushed_to_shipment_subscribers() {
    let app = TestApp::new().await;
    let id = app.shipment_on_the_road("Cairo Warehouse").await;
    app.state.outbox.drain_once().await.expect("initial drain");

    let (tx, mut rx) = mpsc::channel(16);
    let mut watcher = ConnectionSession::new(
        app.state.clone(),
        RequestContext::new(COMPANY, Role::Company),
        tx,
    );
    let reply = watcher
        .handle_text(&json!({ "type": "subscribe", "topic": format!("shipment:{}", id) }).to_string())
        .await;
    let reply: Value = serde_json::from_str(&reply).expect("reply json");
    assert_eq!(reply["type"], "subscribed");

    // Driver reports over its own realtime connection
    let (driver_tx, _driver_rx) = mpsc::channel(16);
    let mut driver = ConnectionSession::new(
        app.state.clone(),
        RequestContext::new(DRIVER, Role::Driver),
        driver_tx,
    );
    let reply = driver
        .handle_text(
            &json!({
                "type": "update_location",
                "shipment_id": id,
                "latitude": "30.0444",
                "longitude": "31.2357",
            })
            .to_string(),
        )
        .await;
    let reply: Value = serde_json::from_str(&reply).expect("reply json");
    assert_eq!(reply["type"], "ack");
    assert_eq!(reply["action"], "update_location");

    let reply = driver
        .handle_text(&json!({ "type": "start_trip", "shipment_id": id }).to_string())
        .await;
    assert!(reply.contains("start_trip"), "{}", reply);

    app.state.outbox.drain_once().await.expect("drain");

    let frame = next_frame(&mut rx).await;
    assert_eq!(frame["event"], "LocationUpdated");
    assert_eq!(frame["data"]["shipment_id"], id);
    let frame = next_frame(&mut rx).await;
    assert_eq!(frame["event"], "TripStarted");
}

#[tokio::test]
async fn realtime_subscriptions_are_scoped() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;

    let (tx, _rx) = mpsc::channel(16);
    let mut stranger = ConnectionSession::new(
        app.state.clone(),
        RequestContext::new(common::OTHER_DISTRIBUTOR, Role::Distributor),
        tx,
    );

    let reply: Value = serde_json::from_str(
        &stranger
            .handle_text(&json!({ "type": "subscribe", "topic": "user:company-1" }).to_string())
            .await,
    )
    .expect("reply json");
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["status"], 403);

    let reply: Value = serde_json::from_str(
        &stranger
            .handle_text(
                &json!({ "type": "subscribe", "topic": format!("shipment:{}", id) }).to_string(),
            )
            .await,
    )
    .expect("reply json");
    assert_eq!(reply["status"], 404);

    let reply: Value =
        serde_json::from_str(&stranger.handle_text("{\"type\":\"dance\"}").await).expect("json");
    assert_eq!(reply["status"], 400);
    assert_eq!(stranger.topics().count(), 0);
}

/// Waits for aborted forwarders to be dropped by the runtime.
async fn wait_for_topic_count(app: &TestApp, expected: usize) {
    for _ in 0..100 {
        if app.state.hub.topic_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(app.state.hub.topic_count(), expected);
}

#[tokio::test]
async fn closed_sessions_leave_no_topics_behind() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;

    let (tx, _rx) = mpsc::channel(16);
    let mut session =
        ConnectionSession::new(app.state.clone(), RequestContext::new(COMPANY, Role::Company), tx);
    session.join_defaults().await.expect("join defaults");
    assert_eq!(app.state.hub.topic_count(), 2);

    let reply = session
        .handle_text(&json!({ "type": "unsubscribe", "topic": format!("shipment:{}", id) }).to_string())
        .await;
    let reply: Value = serde_json::from_str(&reply).expect("reply json");
    assert_eq!(reply["type"], "unsubscribed");
    wait_for_topic_count(&app, 1).await;
    assert_eq!(app.state.hub.subscriber_count(&Topic::Shipment(id)), 0);

    drop(session);
    wait_for_topic_count(&app, 0).await;
}

#[tokio::test]
async fn drained_rows_are_not_delivered_twice() {
    let app = TestApp::new().await;
    app.create_shipment("Cairo Warehouse").await;
    assert!(pending_outbox_rows(&app).await >= 1);

    let first = app.state.outbox.drain_once().await.expect("drain");
    assert!(first.delivered >= 1);
    assert_eq!(pending_outbox_rows(&app).await, 0);

    let second = app.state.outbox.drain_once().await.expect("drain again");
    assert_eq!(second.delivered, 0);
}

#[tokio::test]
async fn a_broken_outbox_does_not_block_the_transition() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;

    app.state
        .db
        .execute(Statement::from_string(
            DatabaseBackend::Sqlite,
            "DROP TABLE outbox_events".to_string(),
        ))
        .await
        .expect("drop outbox table");

    let (status, body) = app
        .post(&format!("/api/v1/shipments/{}/accept", id), &app.distributor(), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "In Transit");

    let (_, current) = app
        .get(&format!("/api/v1/shipments/{}", id), &app.company())
        .await;
    assert_eq!(current["data"]["status"], "In Transit");
}

#[tokio::test]
async fn marking_read_is_idempotent_and_owner_only() {
    let app = TestApp::new().await;
    app.create_shipment("Cairo Warehouse").await;
    let distributor = app.distributor();

    let (_, inbox) = app.get("/api/v1/notifications", &distributor).await;
    let ids: Vec<i64> = inbox["data"]
        .as_array()
        .expect("list")
        .iter()
        .filter_map(|n| n["id"].as_i64())
        .collect();
    assert_eq!(ids.len(), 1);

    // Someone else's ids are silently ignored
    let (status, body) = app
        .post(
            "/api/v1/notifications/read",
            &app.company(),
            Some(json!({ "ids": ids })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["marked"], 0);

    let (_, body) = app
        .post(
            "/api/v1/notifications/read",
            &distributor,
            Some(json!({ "ids": ids })),
        )
        .await;
    assert_eq!(body["data"]["marked"], 1);

    let (_, body) = app
        .post(
            "/api/v1/notifications/read",
            &distributor,
            Some(json!({ "ids": ids })),
        )
        .await;
    assert_eq!(body["data"]["marked"], 0);

    let (_, inbox) = app.get("/api/v1/notifications", &distributor).await;
    assert_eq!(inbox["data"].as_array().map(Vec::len), Some(0));

    let (status, _) = app
        .post(
            "/api/v1/notifications/read",
            &distributor,
            Some(json!({ "ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn a_driver_listing_shipments_clears_their_notifications() {
    let app = TestApp::new().await;
    app.shipment_on_the_road("Cairo Warehouse").await;
    let driver = app.driver();

    let unread = notification::Entity::find()
        .filter(notification::Column::UserId.eq(DRIVER))
        .filter(notification::Column::IsRead.eq(false))
        .count(app.state.db.as_ref())
        .await
        .expect("count");
    assert_eq!(unread, 1);

    let (status, list) = app.get("/api/v1/shipments", &driver).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["data"].as_array().map(Vec::len), Some(1));

    let (_, inbox) = app.get("/api/v1/notifications", &driver).await;
    assert_eq!(inbox["data"].as_array().map(Vec::len), Some(0));

    // Distributor notifications are untouched
    let (_, inbox) = app.get("/api/v1/notifications", &app.distributor()).await;
    assert_eq!(inbox["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(
        inbox["data"][0]["message"].as_str().map(|m| m.starts_with("New shipment #")),
        Some(true)
    );
}
