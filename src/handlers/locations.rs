use crate::{
    auth::RequestContext,
    models::vehicle_location,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One GPS fix from the ledger.
#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 88,
    "shipment_id": 17,
    "latitude": "30.044420000",
    "longitude": "31.235712000",
    "timestamp": "2024-03-01T11:20:00Z"
}))]
pub struct LocationResponse {
    pub id: i32,
    pub shipment_id: i32,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl From<vehicle_location::Model> for LocationResponse {
    fn from(model: vehicle_location::Model) -> Self {
        Self {
            id: model.id,
            shipment_id: model.shipment_id,
            latitude: model.latitude,
            longitude: model.longitude,
            timestamp: model.timestamp,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({"latitude": "30.04442", "longitude": "31.235712"}))]
pub struct ReportLocationRequest {
    /// Degrees in [-90, 90]
    pub latitude: Decimal,
    /// Degrees in [-180, 180]
    pub longitude: Decimal,
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/locations",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    request_body = ReportLocationRequest,
    responses(
        (status = 200, description = "Location recorded", body = ApiResponse<LocationResponse>),
        (status = 400, description = "Coordinates out of range", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not the assigned driver", body = crate::errors::ErrorResponse),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn report_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<ReportLocationRequest>,
) -> ApiResult<LocationResponse> {
    let fix = state
        .services
        .locations
        .report_location(&ctx, id, payload.latitude, payload.longitude)
        .await?;
    Ok(Json(ApiResponse::success(fix.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/{id}/locations/latest",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    responses(
        (status = 200, description = "Latest fix, or null when none was reported", body = ApiResponse<LocationResponse>),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn latest_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<Option<LocationResponse>> {
    let latest = state.services.locations.latest_visible(&ctx, id).await?;
    Ok(Json(ApiResponse::success(latest.map(LocationResponse::from))))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/{id}/locations",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    responses(
        (status = 200, description = "Fixes in recording order", body = ApiResponse<Vec<LocationResponse>>),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn location_history(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<Vec<LocationResponse>> {
    let history = state.services.locations.history_visible(&ctx, id).await?;
    let fixes = history.collect().await?;
    Ok(Json(ApiResponse::success(
        fixes.into_iter().map(LocationResponse::from).collect(),
    )))
}
