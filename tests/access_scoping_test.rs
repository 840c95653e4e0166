//! Every caller sees and touches only the shipments tied to its own id.

mod common;

use axum::http::StatusCode;
use common::{TestApp, DRIVER, OTHER_COMPANY, OTHER_DISTRIBUTOR, OTHER_DRIVER};
use pharmaflow_tracking::auth::Role;
use rstest::rstest;
use serde_json::{json, Value};

fn ids(body: &Value) -> Vec<i64> {
    body["data"]
        .as_array()
        .expect("list body")
        .iter()
        .filter_map(|s| s["id"].as_i64())
        .collect()
}

#[tokio::test]
async fn companies_only_see_their_own_shipments() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;
    let stranger = app.token(OTHER_COMPANY, Role::Company);

    let (_, mine) = app.get("/api/v1/shipments", &app.company()).await;
    assert_eq!(ids(&mine), vec![id as i64]);

    let (_, theirs) = app.get("/api/v1/shipments", &stranger).await;
    assert!(ids(&theirs).is_empty());

    let (status, _) = app
        .get(&format!("/api/v1/shipments/{}", id), &stranger)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, summary) = app.get("/api/v1/shipments/summary", &stranger).await;
    assert_eq!(summary["data"]["total"], 0);
}

#[tokio::test]
async fn shipment_lists_are_newest_first() {
    let app = TestApp::new().await;
    let first = app.create_shipment("Cairo Warehouse").await;
    let second = app.create_shipment("Alexandria Port").await;

    let (_, body) = app.get("/api/v1/shipments", &app.distributor()).await;
    assert_eq!(ids(&body), vec![second as i64, first as i64]);
}

#[rstest]
#[case::accept("accept", None)]
#[case::reject("reject", None)]
#[case::confirm("confirm-delivery", None)]
#[case::store("store-location", Some(json!({ "address": "Somewhere else" })))]
#[tokio::test]
async fn another_distributor_cannot_act_on_the_shipment(
    #[case] action: &str,
    #[case] body: Option<Value>,
) {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;
    let stranger = app.token(OTHER_DISTRIBUTOR, Role::Distributor);

    let (status, _) = app
        .post(&format!("/api/v1/shipments/{}/{}", id, action), &stranger, body.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .post(&format!("/api/v1/shipments/9999/{}", action), &stranger, body)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, current) = app
        .get(&format!("/api/v1/shipments/{}", id), &app.company())
        .await;
    assert_eq!(current["data"]["status"], "Pending");
}

#[tokio::test]
async fn unassigned_distributor_cannot_claim_a_shipment() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/api/v1/shipments",
            &app.company(),
            Some(json!({
                "product_id": app.seed.product_id,
                "destination": "Cairo Warehouse",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = common::shipment_id(&body);

    let (status, _) = app
        .post(&format!("/api/v1/shipments/{}/accept", id), &app.distributor(), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn drivers_see_only_shipments_assigned_to_them() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Cairo Warehouse").await;
    let driver = app.driver();

    let (_, before) = app.get("/api/v1/shipments", &driver).await;
    assert!(ids(&before).is_empty());

    let distributor = app.distributor();
    app.post(&format!("/api/v1/shipments/{}/accept", id), &distributor, None)
        .await;
    app.post(
        &format!("/api/v1/shipments/{}/assign-driver", id),
        &distributor,
        Some(json!({ "driver_id": app.seed.driver_id })),
    )
    .await;

    let (_, after) = app.get("/api/v1/shipments", &driver).await;
    assert_eq!(ids(&after), vec![id as i64]);

    let other = app.token(OTHER_DRIVER, Role::Driver);
    let (status, _) = app.get(&format!("/api/v1/shipments/{}", id), &other).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.get(&format!("/api/v1/shipments/{}", id), &driver).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn tokens_for_unknown_roles_or_other_signers_are_rejected() {
    let app = TestApp::new().await;

    let (status, _) = app.get("/api/v1/shipments", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(axum::http::Method::GET, "/api/v1/notifications", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A token that names a valid role still needs a matching route gate
    let (status, _) = app
        .get("/api/v1/drivers", &app.token(DRIVER, Role::Driver))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stores_are_scoped_to_the_distributor() {
    let app = TestApp::new().await;

    let (status, mine) = app.get("/api/v1/stores", &app.distributor()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(mine["data"][0]["name"], "Heliopolis Pharmacy");

    let (_, theirs) = app
        .get(
            "/api/v1/stores",
            &app.token(OTHER_DISTRIBUTOR, Role::Distributor),
        )
        .await;
    assert_eq!(theirs["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn health_endpoints_need_no_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(axum::http::Method::GET, "/health/live", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);

    let (status, body) = app
        .request(axum::http::Method::GET, "/health/ready", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}
