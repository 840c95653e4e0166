//! End-to-end shipment lifecycle through the HTTP surface:
//! create, accept or reject, assign driver, report a fix, confirm delivery.

mod common;

use axum::http::StatusCode;
use common::{TestApp, DISTRIBUTOR, OTHER_DISTRIBUTOR, OTHER_DRIVER};
use pharmaflow_tracking::auth::Role;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {}", other),
    }
}

#[tokio::test]
async fn cairo_warehouse_shipment_runs_from_pending_to_delivered() {
    let app = TestApp::new().await;
    let company = app.company();
    let distributor = app.distributor();
    let driver = app.driver();

    // Company creates the shipment for D1
    let (status, body) = app
        .post(
            "/api/v1/shipments",
            &company,
            Some(json!({
                "product_id": app.seed.product_id,
                "destination": "Cairo Warehouse",
                "distributor_id": DISTRIBUTOR,
                "quantity": 120,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "Pending");
    assert_eq!(body["data"]["company_id"], "company-1");
    assert!(body["data"]["is_accepted_by_distributor"].is_null());
    let id = common::shipment_id(&body);

    let (_, inbox) = app.get("/api/v1/notifications", &distributor).await;
    let messages: Vec<&str> = inbox["data"]
        .as_array()
        .expect("notification list")
        .iter()
        .filter_map(|n| n["message"].as_str())
        .collect();
    assert_eq!(messages, vec![format!("New shipment #{} assigned to you.", id)]);

    // D1 accepts
    let (status, body) = app
        .post(&format!("/api/v1/shipments/{}/accept", id), &distributor, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "In Transit");
    assert_eq!(body["data"]["is_accepted_by_distributor"], true);

    // A driver from another distributor is not a valid reference
    let (status, body) = app
        .post(
            &format!("/api/v1/shipments/{}/assign-driver", id),
            &distributor,
            Some(json!({ "driver_id": app.seed.other_driver_id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
    let (_, current) = app.get(&format!("/api/v1/shipments/{}", id), &distributor).await;
    assert_eq!(current["data"]["status"], "In Transit");
    assert!(current["data"]["driver_id"].is_null());

    let (status, body) = app
        .post(
            &format!("/api/v1/shipments/{}/assign-driver", id),
            &distributor,
            Some(json!({ "driver_id": app.seed.driver_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["driver_id"], app.seed.driver_id);

    // Driver reports one fix
    let (status, body) = app
        .post(
            &format!("/api/v1/shipments/{}/locations", id),
            &driver,
            Some(json!({ "latitude": "30.0444", "longitude": "31.2357" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, latest) = app
        .get(&format!("/api/v1/shipments/{}/locations/latest", id), &company)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&latest["data"]["latitude"]).round_dp(4), dec!(30.0444));
    assert_eq!(decimal(&latest["data"]["longitude"]).round_dp(4), dec!(31.2357));

    let (_, history) = app
        .get(&format!("/api/v1/shipments/{}/locations", id), &company)
        .await;
    assert_eq!(history["data"].as_array().map(Vec::len), Some(1));

    // D1 confirms delivery, once
    let (status, body) = app
        .post(
            &format!("/api/v1/shipments/{}/confirm-delivery", id),
            &distributor,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "Delivered");

    let (status, body) = app
        .post(
            &format!("/api/v1/shipments/{}/confirm-delivery", id),
            &distributor,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{}", body);
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn rejected_shipment_notifies_company_and_is_terminal() {
    let app = TestApp::new().await;
    let distributor = app.distributor();
    let id = app.create_shipment("Alexandria Port").await;

    let (status, body) = app
        .post(&format!("/api/v1/shipments/{}/reject", id), &distributor, None)
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "Rejected");
    assert_eq!(body["data"]["is_accepted_by_distributor"], false);

    let (_, inbox) = app.get("/api/v1/notifications", &app.company()).await;
    assert_eq!(
        inbox["data"][0]["message"],
        format!("Shipment {} was rejected by the distributor.", id)
    );

    for action in ["accept", "reject", "confirm-delivery"] {
        let (status, _) = app
            .post(&format!("/api/v1/shipments/{}/{}", id, action), &distributor, None)
            .await;
        assert_eq!(status, StatusCode::CONFLICT, "{} on a rejected shipment", action);
    }
}

#[tokio::test]
async fn accepting_notifies_the_company() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Tanta Clinic").await;

    app.post(&format!("/api/v1/shipments/{}/accept", id), &app.distributor(), None)
        .await;

    let (_, inbox) = app.get("/api/v1/notifications", &app.company()).await;
    assert_eq!(
        inbox["data"][0]["message"],
        format!("Shipment {} was accepted by the distributor.", id)
    );
}

#[tokio::test]
async fn concurrent_accept_and_reject_have_exactly_one_winner() {
    let app = TestApp::new().await;
    let distributor = app.distributor();
    let id = app.create_shipment("Mansoura Hospital").await;

    let accept_uri = format!("/api/v1/shipments/{}/accept", id);
    let reject_uri = format!("/api/v1/shipments/{}/reject", id);
    let (accept, reject) = tokio::join!(
        app.post(&accept_uri, &distributor, None),
        app.post(&reject_uri, &distributor, None),
    );

    let statuses = [accept.0, reject.0];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::CONFLICT)
            .count(),
        1
    );

    let (_, current) = app.get(&format!("/api/v1/shipments/{}", id), &distributor).await;
    let expected = if accept.0 == StatusCode::OK {
        "In Transit"
    } else {
        "Rejected"
    };
    assert_eq!(current["data"]["status"], expected);
}

#[tokio::test]
async fn assigning_a_driver_requires_an_accepted_shipment() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Luxor Depot").await;

    let (status, _) = app
        .post(
            &format!("/api/v1/shipments/{}/assign-driver", id),
            &app.distributor(),
            Some(json!({ "driver_id": app.seed.driver_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn routing_a_pending_shipment_to_a_store_accepts_it() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Giza Pharmacy").await;

    let (status, body) = app
        .post(
            &format!("/api/v1/shipments/{}/store-location", id),
            &app.distributor(),
            Some(json!({ "address": "12 Baghdad St, Heliopolis" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "In Transit");
    assert_eq!(body["data"]["is_accepted_by_distributor"], true);
}

#[tokio::test]
async fn creating_with_a_foreign_product_is_a_validation_error() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/api/v1/shipments",
            &app.company(),
            Some(json!({
                "product_id": app.seed.other_product_id,
                "destination": "Cairo Warehouse",
                "distributor_id": DISTRIBUTOR,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
}

#[tokio::test]
async fn creating_with_an_unknown_store_is_a_reference_error() {
    let app = TestApp::new().await;
    let (status, _) = app
        .post(
            "/api/v1/shipments",
            &app.company(),
            Some(json!({
                "product_id": app.seed.product_id,
                "destination": "Cairo Warehouse",
                "store_id": 9_999,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Zero means "no store"
    let (status, body) = app
        .post(
            "/api/v1/shipments",
            &app.company(),
            Some(json!({
                "product_id": app.seed.product_id,
                "destination": "Cairo Warehouse",
                "store_id": 0,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["data"]["store_id"].is_null());
}

/// Creates a shipment as the company with one extra reference field set.
async fn create_with(
    app: &TestApp,
    distributor: Option<&str>,
    field: &str,
    id: i64,
) -> (StatusCode, Value) {
    let mut body = json!({
        "product_id": app.seed.product_id,
        "destination": "Cairo Warehouse",
    });
    body[field] = id.into();
    if let Some(distributor) = distributor {
        body["distributor_id"] = distributor.into();
    }
    app.post("/api/v1/shipments", &app.company(), Some(body)).await
}

#[tokio::test]
async fn a_pre_assigned_driver_must_work_for_the_distributor() {
    let app = TestApp::new().await;
    let foreign_driver = app.seed.other_driver_id as i64;
    let (status, body) = create_with(&app, Some(DISTRIBUTOR), "driver_id", foreign_driver).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);

    // Nothing was created that the foreign driver could report on
    let (_, theirs) = app
        .get("/api/v1/shipments", &app.token(OTHER_DRIVER, Role::Driver))
        .await;
    assert_eq!(theirs["data"].as_array().map(Vec::len), Some(0));

    let own_driver = app.seed.driver_id as i64;
    let (status, _) = create_with(&app, None, "driver_id", own_driver).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = create_with(&app, Some(DISTRIBUTOR), "driver_id", own_driver).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["driver_id"], app.seed.driver_id);
}

#[tokio::test]
async fn a_destination_store_must_belong_to_the_distributor() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/api/v1/stores",
            &app.token(OTHER_DISTRIBUTOR, Role::Distributor),
            Some(json!({ "name": "Dokki Pharmacy", "address": "9 Mossadak St, Dokki" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let foreign_store = body["data"]["id"].as_i64().expect("store id");

    let (status, _) = create_with(&app, Some(DISTRIBUTOR), "store_id", foreign_store).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let own_store = app.seed.store_id as i64;
    let (status, _) = create_with(&app, None, "store_id", own_store).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = create_with(&app, Some(DISTRIBUTOR), "store_id", own_store).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["store_id"], app.seed.store_id);
}

#[tokio::test]
async fn role_gates_reject_the_wrong_caller() {
    let app = TestApp::new().await;
    let id = app.create_shipment("Aswan Store").await;

    let (status, _) = app
        .request(
            axum::http::Method::POST,
            &format!("/api/v1/shipments/{}/accept", id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post(&format!("/api/v1/shipments/{}/accept", id), &app.company(), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let driver = app.token(common::DRIVER, Role::Driver);
    let (status, _) = app
        .post("/api/v1/shipments", &driver, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn summary_counts_shipments_by_status() {
    let app = TestApp::new().await;
    let distributor = app.distributor();
    let accepted = app.create_shipment("Cairo Warehouse").await;
    let rejected = app.create_shipment("Suez Depot").await;
    app.create_shipment("Port Said Clinic").await;

    app.post(&format!("/api/v1/shipments/{}/accept", accepted), &distributor, None)
        .await;
    app.post(&format!("/api/v1/shipments/{}/reject", rejected), &distributor, None)
        .await;

    let (status, body) = app.get("/api/v1/shipments/summary", &app.company()).await;
    assert_eq!(status, StatusCode::OK);
    let summary = &body["data"];
    assert_eq!(summary["total"], 3);
    assert_eq!(summary["pending"], 1);
    assert_eq!(summary["in_transit"], 1);
    assert_eq!(summary["rejected"], 1);
    assert_eq!(summary["delivered"], 0);
}
