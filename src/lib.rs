//! PharmaFlow shipment tracking.
//!
//! Shipment lifecycle state machine, append-only location ledger,
//! notification outbox and realtime broadcast, all scoped per caller role.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod realtime;
pub mod scoping;
pub mod services;
pub mod tracing;

use axum::{
    http::HeaderValue,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use utoipa::ToSchema;

use crate::auth::{AuthConfig, AuthRouterExt, AuthService, Role};
use crate::events::{outbox::OutboxDispatcher, EventSender};
use crate::realtime::{RealtimeHub, RealtimePublisher};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Arc<EventSender>,
    pub hub: Arc<RealtimeHub>,
    pub outbox: Arc<OutboxDispatcher>,
    pub auth: Arc<AuthService>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires the hub, outbox dispatcher, auth and services around one pool.
    /// Background tasks are not started here.
    pub fn new(db: Arc<db::DbPool>, config: config::AppConfig, event_sender: EventSender) -> Self {
        let event_sender = Arc::new(event_sender);
        let hub = Arc::new(RealtimeHub::new(config.realtime_channel_capacity));
        let publisher: Arc<dyn RealtimePublisher> = hub.clone();
        let outbox = Arc::new(OutboxDispatcher::new(
            db.clone(),
            publisher,
            config.outbox_batch_size,
        ));
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config)));
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), outbox.clone());

        Self {
            db,
            config,
            event_sender,
            hub,
            outbox,
            auth,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Versioned API routes, gated by role where the operation requires one.
pub fn api_v1_routes() -> Router<AppState> {
    // Any authenticated caller; results are scoped to the caller
    let scoped_reads = Router::new()
        .route("/shipments", get(handlers::shipments::list_shipments))
        .route(
            "/shipments/summary",
            get(handlers::shipments::shipment_summary),
        )
        .route("/shipments/:id", get(handlers::shipments::get_shipment))
        .route(
            "/shipments/:id/locations",
            get(handlers::locations::location_history),
        )
        .route(
            "/shipments/:id/locations/latest",
            get(handlers::locations::latest_location),
        )
        .route("/notifications", get(handlers::notifications::list_unread))
        .route(
            "/notifications/read",
            post(handlers::notifications::mark_read),
        )
        .route("/realtime", get(realtime::ws::realtime_handler))
        .with_auth();

    let company = Router::new()
        .route("/shipments", post(handlers::shipments::create_shipment))
        .route(
            "/distributors/:distributor_id/drivers",
            get(handlers::drivers::distributor_drivers),
        )
        .route(
            "/distributors/:distributor_id/stores",
            get(handlers::stores::distributor_stores),
        )
        .with_role(Role::Company);

    let distributor = Router::new()
        .route(
            "/shipments/:id/accept",
            post(handlers::shipments::accept_shipment),
        )
        .route(
            "/shipments/:id/reject",
            post(handlers::shipments::reject_shipment),
        )
        .route(
            "/shipments/:id/assign-driver",
            post(handlers::shipments::assign_driver),
        )
        .route(
            "/shipments/:id/confirm-delivery",
            post(handlers::shipments::confirm_delivery),
        )
        .route(
            "/shipments/:id/store-location",
            post(handlers::shipments::update_store_location),
        )
        .route(
            "/drivers",
            get(handlers::drivers::list_drivers).post(handlers::drivers::add_driver),
        )
        .route(
            "/drivers/:id",
            put(handlers::drivers::update_driver).delete(handlers::drivers::remove_driver),
        )
        .route(
            "/stores",
            get(handlers::stores::list_stores).post(handlers::stores::add_store),
        )
        .with_role(Role::Distributor);

    let driver = Router::new()
        .route(
            "/shipments/:id/locations",
            post(handlers::locations::report_location),
        )
        .with_role(Role::Driver);

    Router::new()
        .merge(scoped_reads)
        .merge(company)
        .merge(distributor)
        .merge(driver)
}

fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                None
            } else {
                HeaderValue::from_str(trimmed).ok()
            }
        })
        .collect();

    if origins.is_empty() {
        // Config validation only lets this through in development
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Full HTTP surface: `/api/v1`, `/health`, OpenAPI document and Swagger UI.
pub fn app_router(state: AppState) -> Router {
    let health_state = Arc::new(health::HealthState::new(state.db.clone()));
    let timeout = Duration::from_secs(state.config.request_timeout_secs.max(1));

    Router::<AppState>::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer(&state.config))
        // Auth middleware reads the service from request extensions
        .layer(Extension(state.auth.clone()))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
        .nest("/health", health::health_routes(health_state))
}

pub mod prelude {
    pub use crate::auth::{RequestContext, Role};
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::models::{ShipmentAction, ShipmentStatus};
    pub use crate::realtime::{RealtimeEvent, RealtimeHub, Topic};
    pub use crate::{app_router, ApiResponse, ApiResult, AppState};
}
