use crate::{auth::RequestContext, models::notification, ApiResponse, ApiResult, AppState};
use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i32,
    pub shipment_id: Option<i32>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<notification::Model> for NotificationResponse {
    fn from(model: notification::Model) -> Self {
        Self {
            id: model.id,
            shipment_id: model.shipment_id,
            message: model.message,
            is_read: model.is_read,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MarkReadRequest {
    #[validate(length(min = 1, max = 500))]
    pub ids: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    /// Rows that were unread before this call
    pub marked: u64,
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications",
    responses(
        (status = 200, description = "Unread notifications, newest first", body = ApiResponse<Vec<NotificationResponse>>)
    ),
    tag = "notifications"
)]
pub async fn list_unread(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> ApiResult<Vec<NotificationResponse>> {
    let unread = state.services.notifications.unread_for(&ctx.user_id).await?;
    Ok(Json(ApiResponse::success(
        unread.into_iter().map(NotificationResponse::from).collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read",
    request_body = MarkReadRequest,
    responses(
        (status = 200, description = "Notifications marked read", body = ApiResponse<MarkReadResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_read(
    State(state): State<AppState>,
    ctx: RequestContext,
    Json(payload): Json<MarkReadRequest>,
) -> ApiResult<MarkReadResponse> {
    payload.validate()?;
    let marked = state
        .services
        .notifications
        .mark_read(&ctx.user_id, &payload.ids)
        .await?;
    Ok(Json(ApiResponse::success(MarkReadResponse { marked })))
}
