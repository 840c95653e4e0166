use crate::{
    auth::RequestContext, commands::stores::AddStoreCommand, models::store, ApiResponse,
    ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
pub struct StoreResponse {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}

impl From<store::Model> for StoreResponse {
    fn from(model: store::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            address: model.address,
            latitude: model.latitude,
            longitude: model.longitude,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/stores",
    responses(
        (status = 200, description = "Stores owned by the caller", body = ApiResponse<Vec<StoreResponse>>),
        (status = 403, description = "Caller is not a distributor", body = crate::errors::ErrorResponse)
    ),
    tag = "stores"
)]
pub async fn list_stores(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<StoreResponse>> {
    let stores = state.services.stores.list(&ctx).await?;
    Ok(Json(ApiResponse::success(
        stores.into_iter().map(StoreResponse::from).collect(),
    )))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Zamalek Pharmacy",
    "address": "26 July St, Zamalek",
    "latitude": "30.0626",
    "longitude": "31.2197"
}))]
pub struct AddStoreRequest {
    #[validate(length(min = 2, max = 100))]
    pub name: String,
    #[validate(length(min = 2, max = 200))]
    pub address: String,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
}

#[utoipa::path(
    post,
    path = "/api/v1/stores",
    request_body = AddStoreRequest,
    responses(
        (status = 200, description = "Store registered", body = ApiResponse<StoreResponse>),
        (status = 400, description = "Invalid store", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not a distributor", body = crate::errors::ErrorResponse)
    ),
    tag = "stores"
)]
pub async fn add_store(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<AddStoreRequest>,
) -> ApiResult<StoreResponse> {
    payload.validate()?;
    let command = AddStoreCommand {
        distributor_id: ctx.user_id.clone(),
        name: payload.name,
        address: payload.address,
        latitude: payload.latitude,
        longitude: payload.longitude,
    };
    let added = state.services.stores.add(&ctx, command).await?;
    Ok(Json(ApiResponse::success(added.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/distributors/{distributor_id}/stores",
    params(
        ("distributor_id" = String, Path, description = "Distributor user ID")
    ),
    responses(
        (status = 200, description = "Stores the company may route to", body = ApiResponse<Vec<StoreResponse>>),
        (status = 403, description = "Caller is not a company", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown distributor", body = crate::errors::ErrorResponse)
    ),
    tag = "stores"
)]
pub async fn distributor_stores(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(distributor_id): Path<String>,
) -> ApiResult<Vec<StoreResponse>> {
    let stores = state
        .services
        .stores
        .for_distributor(&ctx, &distributor_id)
        .await?;
    Ok(Json(ApiResponse::success(
        stores.into_iter().map(StoreResponse::from).collect(),
    )))
}
