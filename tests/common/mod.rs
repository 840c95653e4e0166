#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use pharmaflow_tracking::{
    app_router,
    auth::Role,
    config::AppConfig,
    db,
    events::{self, EventSender},
    models::{driver, product, store, user_account},
    AppState,
};
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const COMPANY: &str = "company-1";
pub const OTHER_COMPANY: &str = "company-2";
pub const DISTRIBUTOR: &str = "distributor-1";
pub const OTHER_DISTRIBUTOR: &str = "distributor-2";
pub const DRIVER: &str = "driver-user-1";
pub const OTHER_DRIVER: &str = "driver-user-2";
/// Holds the driver role but is not on anybody's roster yet
pub const SPARE_DRIVER: &str = "driver-user-3";

/// Rows seeded into every fresh database.
#[derive(Debug, Clone)]
pub struct Seed {
    pub product_id: i32,
    pub other_product_id: i32,
    pub store_id: i32,
    /// Employed by `DISTRIBUTOR`, signs in as `DRIVER`
    pub driver_id: i32,
    /// Employed by `OTHER_DISTRIBUTOR`, signs in as `OTHER_DRIVER`
    pub other_driver_id: i32,
}

/// Application harness over a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub seed: Seed,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "integration-secret-with-enough-entropy-42".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps the in-memory database alive and shared
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let seed = seed(&db_arc).await;

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(db_arc, cfg, EventSender::new(event_tx));
        let router = app_router(state.clone());

        Self {
            router,
            state,
            seed,
            _event_task: event_task,
        }
    }

    pub fn token(&self, user_id: &str, role: Role) -> String {
        self.state
            .auth
            .issue_token(user_id, role, None)
            .expect("token issuance")
    }

    pub fn company(&self) -> String {
        self.token(COMPANY, Role::Company)
    }

    pub fn distributor(&self) -> String {
        self.token(DISTRIBUTOR, Role::Distributor)
    }

    pub fn driver(&self) -> String {
        self.token(DRIVER, Role::Driver)
    }

    /// Sends one request through the full router and decodes the JSON body,
    /// `Value::Null` when the body is empty.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json response")
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), body).await
    }

    /// Creates a shipment as `COMPANY` for `DISTRIBUTOR` and returns its id.
    pub async fn create_shipment(&self, destination: &str) -> i32 {
        let (status, body) = self
            .post(
                "/api/v1/shipments",
                &self.company(),
                Some(serde_json::json!({
                    "product_id": self.seed.product_id,
                    "destination": destination,
                    "distributor_id": DISTRIBUTOR,
                    "quantity": 40,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "create failed: {}", body);
        shipment_id(&body)
    }

    /// Creates, accepts and assigns the seeded driver; the shipment is then
    /// ready for location reports.
    pub async fn shipment_on_the_road(&self, destination: &str) -> i32 {
        let id = self.create_shipment(destination).await;
        let distributor = self.distributor();
        let (status, body) = self
            .post(&format!("/api/v1/shipments/{}/accept", id), &distributor, None)
            .await;
        assert_eq!(status, StatusCode::OK, "accept failed: {}", body);
        let (status, body) = self
            .post(
                &format!("/api/v1/shipments/{}/assign-driver", id),
                &distributor,
                Some(serde_json::json!({ "driver_id": self.seed.driver_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "assign failed: {}", body);
        id
    }
}

pub fn shipment_id(body: &Value) -> i32 {
    body["data"]["id"].as_i64().expect("shipment id in response") as i32
}

async fn seed(db: &db::DbPool) -> Seed {
    let accounts = [
        (COMPANY, Role::Company, "Nile Pharma"),
        (OTHER_COMPANY, Role::Company, "Delta Labs"),
        (DISTRIBUTOR, Role::Distributor, "Cairo Distribution"),
        (OTHER_DISTRIBUTOR, Role::Distributor, "Giza Logistics"),
        (DRIVER, Role::Driver, "Omar Hassan"),
        (OTHER_DRIVER, Role::Driver, "Youssef Adel"),
        (SPARE_DRIVER, Role::Driver, "Karim Nabil"),
    ];
    for (id, role, name) in accounts {
        user_account::ActiveModel {
            id: Set(id.to_string()),
            role: Set(role),
            full_name: Set(name.to_string()),
            address: Set(None),
        }
        .insert(db)
        .await
        .expect("seed account");
    }

    let product = product::ActiveModel {
        name: Set("Amoxicillin 500mg".to_string()),
        company_id: Set(COMPANY.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed product");
    let other_product = product::ActiveModel {
        name: Set("Insulin Glargine".to_string()),
        company_id: Set(OTHER_COMPANY.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed product");

    let store = store::ActiveModel {
        name: Set("Heliopolis Pharmacy".to_string()),
        address: Set("12 Baghdad St, Heliopolis".to_string()),
        distributor_id: Set(DISTRIBUTOR.to_string()),
        latitude: Set(None),
        longitude: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed store");

    let driver = seed_driver(db, DRIVER, DISTRIBUTOR, "Omar Hassan", "LIC-1001").await;
    let other_driver =
        seed_driver(db, OTHER_DRIVER, OTHER_DISTRIBUTOR, "Youssef Adel", "LIC-2002").await;

    Seed {
        product_id: product.id,
        other_product_id: other_product.id,
        store_id: store.id,
        driver_id: driver.id,
        other_driver_id: other_driver.id,
    }
}

async fn seed_driver(
    db: &db::DbPool,
    user_id: &str,
    distributor_id: &str,
    name: &str,
    license: &str,
) -> driver::Model {
    driver::ActiveModel {
        user_id: Set(user_id.to_string()),
        full_name: Set(name.to_string()),
        contact_number: Set(Some("+20 100 000 0000".to_string())),
        license_number: Set(license.to_string()),
        national_id: Set(format!("NID-{}", license)),
        distributor_id: Set(distributor_id.to_string()),
        date_hired: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("seed driver")
}
