use crate::{
    auth::RequestContext,
    commands::shipments::CreateShipmentCommand,
    models::{shipment, ShipmentStatus},
    services::shipments::ShipmentSummary,
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
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": 17,
    "product_id": 3,
    "destination": "Cairo Warehouse",
    "status": "In Transit",
    "company_id": "company-1",
    "distributor_id": "distributor-9",
    "store_id": null,
    "driver_id": 4,
    "quantity": 120,
    "is_accepted_by_distributor": true,
    "destination_latitude": "30.044420000",
    "destination_longitude": "31.235712000",
    "created_at": "2024-03-01T10:30:00Z",
    "updated_at": "2024-03-01T11:05:00Z"
}))]
pub struct ShipmentResponse {
    pub id: i32,
    pub product_id: i32,
    /// Free-text destination
    pub destination: String,
    pub status: ShipmentStatus,
    /// Owning company
    pub company_id: String,
    pub distributor_id: Option<String>,
    pub store_id: Option<i32>,
    pub driver_id: Option<i32>,
    pub quantity: Option<i32>,
    /// `null` until the distributor decides
    pub is_accepted_by_distributor: Option<bool>,
    pub destination_latitude: Option<Decimal>,
    pub destination_longitude: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<shipment::Model> for ShipmentResponse {
    fn from(model: shipment::Model) -> Self {
        Self {
            id: model.id,
            product_id: model.product_id,
            destination: model.destination,
            status: model.status,
            company_id: model.company_id,
            distributor_id: model.distributor_id,
            store_id: model.store_id,
            driver_id: model.driver_id,
            quantity: model.quantity,
            is_accepted_by_distributor: model.is_accepted_by_distributor,
            destination_latitude: model.destination_latitude,
            destination_longitude: model.destination_longitude,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "product_id": 3,
    "destination": "Cairo Warehouse",
    "distributor_id": "distributor-9",
    "quantity": 120,
    "destination_latitude": "30.04442",
    "destination_longitude": "31.235712"
}))]
pub struct CreateShipmentRequest {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(length(min = 2, max = 100))]
    pub destination: String,
    pub distributor_id: Option<String>,
    /// `0` is treated as no store
    pub store_id: Option<i32>,
    pub driver_id: Option<i32>,
    #[validate(range(min = 1))]
    pub quantity: Option<i32>,
    pub destination_latitude: Option<Decimal>,
    pub destination_longitude: Option<Decimal>,
}

impl CreateShipmentRequest {
    fn into_command(self, company_id: String) -> CreateShipmentCommand {
        CreateShipmentCommand {
            company_id,
            product_id: self.product_id,
            destination: self.destination,
            distributor_id: self.distributor_id,
            store_id: self.store_id,
            driver_id: self.driver_id,
            quantity: self.quantity,
            destination_latitude: self.destination_latitude,
            destination_longitude: self.destination_longitude,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AssignDriverRequest {
    #[validate(range(min = 1))]
    pub driver_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StoreLocationRequest {
    /// Address of the store the shipment is routed to
    #[validate(length(min = 1, max = 200))]
    #[schema(example = "12 Tahrir Square, Cairo")]
    pub address: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 200, description = "Shipment created", body = ApiResponse<ShipmentResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not a company", body = crate::errors::ErrorResponse),
        (status = 422, description = "Unknown driver, distributor or store", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<CreateShipmentRequest>,
) -> ApiResult<ShipmentResponse> {
    payload.validate()?;
    let command = payload.into_command(ctx.user_id.clone());
    let created = state.services.shipments.create(&ctx, command).await?;
    Ok(Json(ApiResponse::success(created.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments",
    responses(
        (status = 200, description = "Shipments visible to the caller", body = ApiResponse<Vec<ShipmentResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn list_shipments(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<ShipmentResponse>> {
    let shipments = state.services.shipments.list(&ctx).await?;
    Ok(Json(ApiResponse::success(
        shipments.into_iter().map(ShipmentResponse::from).collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/summary",
    responses(
        (status = 200, description = "Counts per status", body = ApiResponse<ShipmentSummary>)
    ),
    tag = "shipments"
)]
pub async fn shipment_summary(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<ShipmentSummary> {
    let summary = state.services.shipments.summary(&ctx).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/shipments/{id}",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    responses(
        (status = 200, description = "Shipment fetched", body = ApiResponse<ShipmentResponse>),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn get_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<ShipmentResponse> {
    let found = state.services.shipments.get(&ctx, id).await?;
    Ok(Json(ApiResponse::success(found.into())))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/accept",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    responses(
        (status = 200, description = "Shipment accepted", body = ApiResponse<ShipmentResponse>),
        (status = 403, description = "Not assigned to the caller", body = crate::errors::ErrorResponse),
        (status = 409, description = "Shipment is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn accept_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<ShipmentResponse> {
    let updated = state.services.shipments.accept(&ctx, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        updated.into(),
        "Shipment accepted",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/reject",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    responses(
        (status = 200, description = "Shipment rejected", body = ApiResponse<ShipmentResponse>),
        (status = 403, description = "Not assigned to the caller", body = crate::errors::ErrorResponse),
        (status = 409, description = "Shipment is not pending", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn reject_shipment(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<ShipmentResponse> {
    let updated = state.services.shipments.reject(&ctx, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        updated.into(),
        "Shipment rejected",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/assign-driver",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    request_body = AssignDriverRequest,
    responses(
        (status = 200, description = "Driver assigned", body = ApiResponse<ShipmentResponse>),
        (status = 409, description = "Shipment is not accepted and in transit", body = crate::errors::ErrorResponse),
        (status = 422, description = "Driver does not exist", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn assign_driver(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<AssignDriverRequest>,
) -> ApiResult<ShipmentResponse> {
    payload.validate()?;
    let updated = state
        .services
        .shipments
        .assign_driver(&ctx, id, payload.driver_id)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        updated.into(),
        "Driver assigned",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/confirm-delivery",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    responses(
        (status = 200, description = "Delivery confirmed", body = ApiResponse<ShipmentResponse>),
        (status = 409, description = "Shipment is not accepted and in transit", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<ShipmentResponse> {
    let updated = state.services.shipments.confirm_delivery(&ctx, id).await?;
    Ok(Json(ApiResponse::success_with_message(
        updated.into(),
        "Delivery confirmed",
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/shipments/{id}/store-location",
    params(
        ("id" = i32, Path, description = "Shipment ID")
    ),
    request_body = StoreLocationRequest,
    responses(
        (status = 200, description = "Shipment routed to store", body = ApiResponse<ShipmentResponse>),
        (status = 409, description = "Shipment is closed", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn update_store_location(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<StoreLocationRequest>,
) -> ApiResult<ShipmentResponse> {
    payload.validate()?;
    let updated = state
        .services
        .shipments
        .update_location(&ctx, id, payload.address)
        .await?;
    Ok(Json(ApiResponse::success_with_message(
        updated.into(),
        "Store location updated",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_request_rejects_short_destination() {
        let request = CreateShipmentRequest {
            product_id: 1,
            destination: "X".to_string(),
            distributor_id: None,
            store_id: None,
            driver_id: None,
            quantity: Some(10),
            destination_latitude: None,
            destination_longitude: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn create_request_maps_onto_command_for_the_caller() {
        let request = CreateShipmentRequest {
            product_id: 1,
            destination: "Cairo Warehouse".to_string(),
            distributor_id: Some("d1".to_string()),
            store_id: Some(0),
            driver_id: None,
            quantity: Some(10),
            destination_latitude: Some(dec!(30.0444)),
            destination_longitude: Some(dec!(31.2357)),
        };
        let command = request.into_command("company-1".to_string());
        assert_eq!(command.company_id, "company-1");
        assert_eq!(command.store_id, Some(0));
        assert_eq!(command.destination_latitude, Some(dec!(30.0444)));
    }

    #[test]
    fn status_is_serialized_with_display_name() {
        let now = Utc::now();
        let response = ShipmentResponse::from(shipment::Model {
            id: 1,
            product_id: 1,
            destination: "Giza".to_string(),
            status: ShipmentStatus::InTransit,
            company_id: "c".to_string(),
            distributor_id: None,
            store_id: None,
            driver_id: None,
            quantity: None,
            is_accepted_by_distributor: Some(true),
            destination_latitude: None,
            destination_longitude: None,
            created_at: now,
            updated_at: now,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "In Transit");
    }
}
