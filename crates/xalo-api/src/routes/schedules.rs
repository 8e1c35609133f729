//! Schedule API routes.
//!
//! ## Routes
//!
//! - `GET    /schedules` - List schedules, newest month first (public)
//! - `POST   /schedules` - Create a schedule (admin)
//! - `PUT    /schedules/{id}` - Partially update a schedule (admin)
//! - `DELETE /schedules/{id}` - Delete a schedule (admin)
//!
//! Image lists arrive already reconciled: the admin console uploads new files
//! one at a time through `/upload` and submits `retained ++ uploaded`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use xalo_core::{ImageList, NewSchedule, Schedule, ScheduleId, ScheduleMonth, ScheduleUpdate};

use crate::context::{AdminContext, RequestId};
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Request to create a schedule.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    /// Calendar month (`YYYY-MM`; a full ISO date is also accepted).
    #[schema(example = "2024-06")]
    pub month: Option<String>,
    /// Optional display label.
    pub title: Option<String>,
    /// Ordered image URLs. A single string is accepted as a one-element list.
    #[serde(default, rename = "scheduleImgURL")]
    #[schema(value_type = Option<Vec<String>>)]
    pub schedule_img_url: Option<ImageList>,
}

/// Partial schedule update. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScheduleRequest {
    /// New title. An empty string clears it.
    pub title: Option<String>,
    /// New month. An empty string is ignored.
    pub month: Option<String>,
    /// Replacement image list; must not be empty.
    #[serde(default, rename = "scheduleImgURL")]
    #[schema(value_type = Option<Vec<String>>)]
    pub schedule_img_url: Option<ImageList>,
}

/// Schedule response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    /// Schedule ID (ULID).
    pub id: String,
    /// Calendar month (`YYYY-MM`).
    pub month: String,
    /// Optional display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Ordered image URLs.
    #[serde(rename = "scheduleImgURL")]
    pub schedule_img_url: Vec<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

impl From<Schedule> for ScheduleResponse {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.id.to_string(),
            month: schedule.month.to_string(),
            title: schedule.title,
            schedule_img_url: schedule.images,
            created_at: schedule.created_at.to_rfc3339(),
            updated_at: schedule.updated_at.to_rfc3339(),
        }
    }
}

/// Confirmation message.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub message: String,
}

/// Creates schedule routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/schedules/:id",
            put(update_schedule).delete(delete_schedule),
        )
}

/// List schedules.
///
/// GET /api/v1/schedules
#[utoipa::path(
    get,
    path = "/api/v1/schedules",
    tag = "schedules",
    responses(
        (status = 200, description = "Schedules, newest month first", body = Vec<ScheduleResponse>),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    )
)]
pub(crate) async fn list_schedules(
    RequestId(request_id): RequestId,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ScheduleResponse>>> {
    let schedules = state
        .schedules()
        .list()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id))?;

    Ok(Json(schedules.into_iter().map(ScheduleResponse::from).collect()))
}

/// Create a schedule.
///
/// POST /api/v1/schedules
#[utoipa::path(
    post,
    path = "/api/v1/schedules",
    tag = "schedules",
    request_body = CreateScheduleRequest,
    responses(
        (status = 201, description = "Schedule created", body = ScheduleResponse),
        (status = 400, description = "Missing month or images", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn create_schedule(
    AdminContext(ctx): AdminContext,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateScheduleRequest>,
) -> ApiResult<impl IntoResponse> {
    let err = |e: xalo_core::Error| ApiError::from(e).with_request_id(ctx.request_id.clone());

    let month: ScheduleMonth = req.month.as_deref().unwrap_or_default().parse().map_err(err)?;
    let input = NewSchedule {
        month,
        title: req.title,
        images: req
            .schedule_img_url
            .map(ImageList::into_inner)
            .unwrap_or_default(),
    };

    tracing::info!(
        user_id = %ctx.user_id,
        month = %input.month,
        images = input.images.len(),
        request_id = %ctx.request_id,
        "Creating schedule"
    );

    let schedule = state.schedules().create(input).await.map_err(err)?;
    Ok((StatusCode::CREATED, Json(ScheduleResponse::from(schedule))))
}

/// Update a schedule.
///
/// PUT /api/v1/schedules/{id}
#[utoipa::path(
    put,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(
        ("id" = String, Path, description = "Schedule ID")
    ),
    request_body = UpdateScheduleRequest,
    responses(
        (status = 200, description = "Schedule updated", body = ScheduleResponse),
        (status = 400, description = "Empty image list or bad month", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 404, description = "Schedule not found", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn update_schedule(
    AdminContext(ctx): AdminContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleRequest>,
) -> ApiResult<Json<ScheduleResponse>> {
    let err = |e: xalo_core::Error| ApiError::from(e).with_request_id(ctx.request_id.clone());

    let id: ScheduleId = id.parse().map_err(err)?;
    let month = match req.month.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => Some(raw.parse::<ScheduleMonth>().map_err(err)?),
        _ => None,
    };
    let update = ScheduleUpdate {
        title: req.title,
        month,
        images: req.schedule_img_url.map(ImageList::into_inner),
    };

    tracing::info!(
        user_id = %ctx.user_id,
        schedule_id = %id,
        images = ?update.images.as_ref().map(Vec::len),
        request_id = %ctx.request_id,
        "Updating schedule"
    );

    let schedule = state.schedules().update(id, update).await.map_err(err)?;
    Ok(Json(ScheduleResponse::from(schedule)))
}

/// Delete a schedule.
///
/// DELETE /api/v1/schedules/{id}
#[utoipa::path(
    delete,
    path = "/api/v1/schedules/{id}",
    tag = "schedules",
    params(
        ("id" = String, Path, description = "Schedule ID")
    ),
    responses(
        (status = 200, description = "Schedule removed", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 404, description = "Schedule not found", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn delete_schedule(
    AdminContext(ctx): AdminContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let err = |e: xalo_core::Error| ApiError::from(e).with_request_id(ctx.request_id.clone());

    let id: ScheduleId = id.parse().map_err(err)?;
    tracing::info!(
        user_id = %ctx.user_id,
        schedule_id = %id,
        request_id = %ctx.request_id,
        "Deleting schedule"
    );

    state.schedules().delete(id).await.map_err(err)?;
    Ok(Json(MessageResponse {
        message: "Schedule removed".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_accepts_single_url() {
        let req: CreateScheduleRequest = serde_json::from_str(
            r#"{"month":"2024-06","scheduleImgURL":"https://cdn.test/a.jpg"}"#,
        )
        .unwrap();
        assert_eq!(
            req.schedule_img_url.unwrap().into_inner(),
            vec!["https://cdn.test/a.jpg".to_string()]
        );
    }

    #[test]
    fn update_request_fields_are_optional() {
        let req: UpdateScheduleRequest = serde_json::from_str("{}").unwrap();
        assert!(req.title.is_none());
        assert!(req.month.is_none());
        assert!(req.schedule_img_url.is_none());
    }

    #[test]
    fn response_uses_wire_names() {
        let now = chrono::Utc::now();
        let schedule = Schedule {
            id: ScheduleId::generate(),
            month: "2024-06".parse().unwrap(),
            title: None,
            images: vec!["a".into()],
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(ScheduleResponse::from(schedule)).unwrap();
        assert_eq!(json["month"], "2024-06");
        assert_eq!(json["scheduleImgURL"][0], "a");
        assert!(json.get("title").is_none());
        assert!(json.get("createdAt").is_some());
    }
}
