/*!
 * # Health Check Module
 *
 * - Basic health check (`/health`) - cached up/down status
 * - Readiness check (`/health/ready`) - re-checks the database and outbox
 * - Liveness check (`/health/live`) - process is alive
 * - Detailed health check (`/health/details`) - per component status
 */

use crate::models::{outbox_event, OutboxStatus};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
    Degraded,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: HashMap<String, HealthDetail>,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DatabaseConnection>,
    pub health_cache: Arc<RwLock<HealthInfo>>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self {
            db_pool,
            health_cache: Arc::new(RwLock::new(HealthInfo {
                status: HealthStatus::Up,
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: Utc::now(),
                uptime_seconds: 0,
                details: HashMap::new(),
            })),
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    async fn check_database(&self) -> HealthDetail {
        let (status, message) = match self.db_pool.ping().await {
            Ok(()) => (HealthStatus::Up, None),
            Err(e) => {
                error!("Database health check failed: {}", e);
                (HealthStatus::Down, Some(e.to_string()))
            }
        };
        HealthDetail {
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Rows that exhausted their retries leave clients without some pushes.
    async fn check_outbox(&self) -> HealthDetail {
        let failed = outbox_event::Entity::find()
            .filter(outbox_event::Column::Status.eq(OutboxStatus::Failed))
            .count(self.db_pool.as_ref())
            .await;
        let (status, message) = match failed {
            Ok(0) => (HealthStatus::Up, None),
            Ok(n) => (
                HealthStatus::Degraded,
                Some(format!("{} outbox event(s) failed permanently", n)),
            ),
            Err(e) => (HealthStatus::Down, Some(e.to_string())),
        };
        HealthDetail {
            status,
            message,
            timestamp: Utc::now(),
        }
    }

    /// Update health status
    pub async fn update_health(&self) {
        let database = self.check_database().await;
        let outbox = self.check_outbox().await;

        let mut health = self.health_cache.write().await;
        health.timestamp = Utc::now();
        health.uptime_seconds = self.uptime();
        health.details.insert("database".to_string(), database);
        health.details.insert("outbox".to_string(), outbox);

        let any_down = health
            .details
            .values()
            .any(|detail| detail.status == HealthStatus::Down);
        let any_degraded = health
            .details
            .values()
            .any(|detail| detail.status == HealthStatus::Degraded);

        health.status = if any_down {
            HealthStatus::Down
        } else if any_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };
    }
}

fn status_code(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": env!("CARGO_PKG_NAME"),
    }))
}

/// Basic health check endpoint
pub async fn health_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    debug!("Health check endpoint called");
    let health = state.health_cache.read().await;

    (
        status_code(health.status),
        Json(json!({
            "status": health.status,
            "version": health.version,
            "timestamp": health.timestamp,
        })),
    )
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;

    (
        status_code(health.status),
        Json(json!({
            "ready": health.status != HealthStatus::Down,
            "timestamp": health.timestamp,
        })),
    )
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "uptime_seconds": state.uptime(),
        })),
    )
}

/// Detailed health check endpoint
pub async fn detailed_health(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    state.update_health().await;
    let health = state.health_cache.read().await;
    (status_code(health.status), Json(health.clone()))
}

/// Run periodic health checks
pub async fn run_health_checker(state: Arc<HealthState>, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;
        state.update_health().await;

        let health = state.health_cache.read().await;
        if health.status != HealthStatus::Up {
            warn!("System health is not optimal: {:?}", health.status);

            for (name, detail) in &health.details {
                if detail.status != HealthStatus::Up {
                    warn!(component = %name, message = ?detail.message, "component is not healthy");
                }
            }
        }
    }
}

/// Health endpoints, mounted under `/health`
pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/details", get(detailed_health))
        .route("/version", get(version_info))
        .with_state(state)
}
