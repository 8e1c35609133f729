//! Image upload routes.
//!
//! ## Routes
//!
//! - `POST /upload` - Store one image from multipart field `image` (admin)
//! - `GET  /uploads/{name}` - Serve a stored image (public)
//! - `POST /uploads/sweep` - Remove unreferenced uploads (admin)

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use xalo_core::{sweep_orphans, PendingFile, SweepReport, UploadError};

use crate::context::{AdminContext, RequestId};
use crate::error::{ApiError, ApiResult};
use crate::metrics::{record_sweep_removed, record_upload};
use crate::server::AppState;

/// Multipart field carrying the file.
pub const IMAGE_FIELD: &str = "image";

/// Room for multipart boundaries and part headers on top of the file limit.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Multipart form accepted by `POST /upload`.
#[derive(Debug, ToSchema)]
pub struct UploadForm {
    /// The image file.
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

/// Upload response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    /// Public URL of the stored image.
    pub image_url: String,
}

/// Sweep request. Both fields fall back to the server configuration.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SweepRequest {
    /// Report without deleting.
    #[serde(default)]
    pub dry_run: Option<bool>,
    /// Keep unreferenced uploads younger than this.
    #[serde(default)]
    pub grace_seconds: Option<u64>,
}

/// Sweep response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SweepResponse {
    /// Uploads examined.
    pub scanned: usize,
    /// Uploads still referenced by a schedule.
    pub referenced: usize,
    /// URLs removed (or removable, on a dry run).
    pub removed: Vec<String>,
    /// Whether anything was actually deleted.
    pub dry_run: bool,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            scanned: report.scanned,
            referenced: report.referenced,
            removed: report.removed,
            dry_run: report.dry_run,
        }
    }
}

/// Creates upload routes.
pub fn routes(max_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(
                max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
            )),
        )
        .route("/uploads/sweep", post(sweep_uploads))
        .route("/uploads/:name", get(get_upload))
}

/// Upload one image.
///
/// POST /api/v1/upload
#[utoipa::path(
    post,
    path = "/api/v1/upload",
    tag = "uploads",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Missing file or not an image", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 413, description = "File too large", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn upload_image(
    AdminContext(ctx): AdminContext,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or("image").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            let error = ApiError::from(e).with_request_id(ctx.request_id.clone());
            record_upload(if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
                "too_large"
            } else {
                "rejected"
            });
            error
        })?;
        file = Some(PendingFile::new(name, content_type, bytes));
        break;
    }

    let Some(file) = file else {
        record_upload("rejected");
        return Err(ApiError::bad_request("No image file provided")
            .with_request_id(ctx.request_id));
    };

    match state.uploads().store(&file).await {
        Ok(stored) => {
            record_upload("stored");
            tracing::info!(
                user_id = %ctx.user_id,
                name = %stored.name,
                size = stored.size,
                request_id = %ctx.request_id,
                "Upload stored"
            );
            Ok(Json(UploadResponse {
                image_url: stored.url,
            }))
        }
        Err(e) => {
            record_upload(match e {
                UploadError::Rejected(_) => "rejected",
                UploadError::TooLarge { .. } => "too_large",
                UploadError::Failed(_) => "failed",
            });
            tracing::warn!(
                file = %file.name,
                error = %e,
                request_id = %ctx.request_id,
                "Upload refused"
            );
            Err(ApiError::from(e).with_request_id(ctx.request_id))
        }
    }
}

/// Fetch a stored image.
///
/// GET /api/v1/uploads/{name}
#[utoipa::path(
    get,
    path = "/api/v1/uploads/{name}",
    tag = "uploads",
    params(
        ("name" = String, Path, description = "Upload name as issued in the image URL")
    ),
    responses(
        (status = 200, description = "Image bytes with the stored content type"),
        (status = 404, description = "No such upload", body = ApiErrorBody),
    )
)]
pub(crate) async fn get_upload(
    RequestId(request_id): RequestId,
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let (bytes, content_type) = state
        .uploads()
        .fetch(&name)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(request_id))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            // names embed a fresh ULID; content never changes
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    ))
}

/// Remove unreferenced uploads.
///
/// POST /api/v1/uploads/sweep
#[utoipa::path(
    post,
    path = "/api/v1/uploads/sweep",
    tag = "uploads",
    request_body = SweepRequest,
    responses(
        (status = 200, description = "Sweep report", body = SweepResponse),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Not an admin", body = ApiErrorBody),
        (status = 500, description = "Internal error", body = ApiErrorBody),
    ),
    security(
        ("bearerAuth" = [])
    )
)]
pub(crate) async fn sweep_uploads(
    AdminContext(ctx): AdminContext,
    State(state): State<Arc<AppState>>,
    body: Option<Json<SweepRequest>>,
) -> ApiResult<Json<SweepResponse>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let mut options = state.sweep_options();
    if let Some(dry_run) = req.dry_run {
        options.dry_run = dry_run;
    }
    if let Some(secs) = req.grace_seconds {
        options.grace = chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX));
    }

    tracing::info!(
        user_id = %ctx.user_id,
        dry_run = options.dry_run,
        grace_secs = options.grace.num_seconds(),
        request_id = %ctx.request_id,
        "Sweeping unreferenced uploads"
    );

    let report = sweep_orphans(state.uploads(), state.schedules(), options)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;
    if !report.dry_run {
        record_sweep_removed(report.removed.len());
    }
    Ok(Json(SweepResponse::from(report)))
}
