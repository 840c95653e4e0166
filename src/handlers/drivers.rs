use crate::{
    auth::RequestContext,
    commands::drivers::{AddDriverCommand, UpdateDriverCommand},
    models::driver,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
pub struct DriverResponse {
    pub id: i32,
    pub user_id: String,
    pub full_name: String,
    pub contact_number: Option<String>,
    pub license_number: String,
    pub national_id: String,
    pub date_hired: DateTime<Utc>,
}

impl From<driver::Model> for DriverResponse {
    fn from(model: driver::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            full_name: model.full_name,
            contact_number: model.contact_number,
            license_number: model.license_number,
            national_id: model.national_id,
            date_hired: model.date_hired,
        }
    }
}

/// What a company sees of another party's driver when preparing a shipment.
#[derive(Debug, Serialize, ToSchema)]
pub struct DriverSummary {
    pub id: i32,
    pub full_name: String,
    pub license_number: String,
    pub contact_number: Option<String>,
}

impl From<driver::Model> for DriverSummary {
    fn from(model: driver::Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name,
            license_number: model.license_number,
            contact_number: model.contact_number,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "user_id": "driver-user-4",
    "full_name": "Omar Hassan",
    "contact_number": "+20 100 555 0101",
    "license_number": "EG-DL-55821",
    "national_id": "29801011234567"
}))]
pub struct AddDriverRequest {
    /// Account of the driver; must hold the driver role
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 2, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub contact_number: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub license_number: String,
    #[validate(length(min = 3, max = 50))]
    pub national_id: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateDriverRequest {
    #[validate(length(min = 2, max = 100))]
    pub full_name: String,
    #[validate(length(max = 30))]
    pub contact_number: Option<String>,
    #[validate(length(min = 3, max = 50))]
    pub license_number: String,
    #[validate(length(min = 3, max = 50))]
    pub national_id: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/drivers",
    responses(
        (status = 200, description = "Drivers of the caller", body = ApiResponse<Vec<DriverResponse>>),
        (status = 403, description = "Caller is not a distributor", body = crate::errors::ErrorResponse)
    ),
    tag = "drivers"
)]
pub async fn list_drivers(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<DriverResponse>> {
    let drivers = state.services.drivers.list(&ctx).await?;
    Ok(Json(ApiResponse::success(
        drivers.into_iter().map(DriverResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/drivers",
    request_body = AddDriverRequest,
    responses(
        (status = 200, description = "Driver added", body = ApiResponse<DriverResponse>),
        (status = 400, description = "Invalid or duplicate driver", body = crate::errors::ErrorResponse),
        (status = 422, description = "Account is not a driver", body = crate::errors::ErrorResponse)
    ),
    tag = "drivers"
)]
pub async fn add_driver(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<AddDriverRequest>,
) -> ApiResult<DriverResponse> {
    payload.validate()?;
    let command = AddDriverCommand {
        distributor_id: ctx.user_id.clone(),
        user_id: payload.user_id,
        full_name: payload.full_name,
        contact_number: payload.contact_number,
        license_number: payload.license_number,
        national_id: payload.national_id,
    };
    let added = state.services.drivers.add(&ctx, command).await?;
    Ok(Json(ApiResponse::success(added.into())))
}

#[utoipa::path(
    delete,
    path = "/api/v1/drivers/{id}",
    params(
        ("id" = i32, Path, description = "Driver ID")
    ),
    responses(
        (status = 200, description = "Driver removed"),
        (status = 403, description = "Driver belongs to another distributor", body = crate::errors::ErrorResponse),
        (status = 409, description = "Driver has open shipments", body = crate::errors::ErrorResponse)
    ),
    tag = "drivers"
)]
pub async fn remove_driver(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> ApiResult<()> {
    state.services.drivers.remove(&ctx, id).await?;
    Ok(Json(ApiResponse::success_with_message((), "Driver removed")))
}

#[utoipa::path(
    put,
    path = "/api/v1/drivers/{id}",
    params(
        ("id" = i32, Path, description = "Driver ID")
    ),
    request_body = UpdateDriverRequest,
    responses(
        (status = 200, description = "Driver updated", body = ApiResponse<DriverResponse>),
        (status = 400, description = "Invalid or duplicate details", body = crate::errors::ErrorResponse),
        (status = 403, description = "Driver belongs to another distributor", body = crate::errors::ErrorResponse),
        (status = 404, description = "Driver not found", body = crate::errors::ErrorResponse)
    ),
    tag = "drivers"
)]
pub async fn update_driver(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateDriverRequest>,
) -> ApiResult<DriverResponse> {
    payload.validate()?;
    let command = UpdateDriverCommand {
        driver_id: id,
        distributor_id: ctx.user_id.clone(),
        full_name: payload.full_name,
        contact_number: payload.contact_number,
        license_number: payload.license_number,
        national_id: payload.national_id,
    };
    let updated = state.services.drivers.update(&ctx, command).await?;
    Ok(Json(ApiResponse::success(updated.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/distributors/{distributor_id}/drivers",
    params(
        ("distributor_id" = String, Path, description = "Distributor user ID")
    ),
    responses(
        (status = 200, description = "Drivers the company may pre-assign", body = ApiResponse<Vec<DriverSummary>>),
        (status = 403, description = "Caller is not a company", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown distributor", body = crate::errors::ErrorResponse)
    ),
    tag = "drivers"
)]
pub async fn distributor_drivers(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(distributor_id): Path<String>,
) -> ApiResult<Vec<DriverSummary>> {
    let drivers = state
        .services
        .drivers
        .for_distributor(&ctx, &distributor_id)
        .await?;
    Ok(Json(ApiResponse::success(
        drivers.into_iter().map(DriverSummary::from).collect(),
    )))
}
