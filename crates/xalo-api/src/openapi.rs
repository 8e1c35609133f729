//! `OpenAPI` (3.1) document generation for `xalo-api`.
//!
//! The generated document feeds the admin console's typed client.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// `OpenAPI` documentation for the Xalo REST API (`/api/v1/*`).
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Xalo API",
        description = "Xalo English school site: schedules and image uploads"
    ),
    paths(
        crate::routes::schedules::list_schedules,
        crate::routes::schedules::create_schedule,
        crate::routes::schedules::update_schedule,
        crate::routes::schedules::delete_schedule,
        crate::routes::uploads::upload_image,
        crate::routes::uploads::get_upload,
        crate::routes::uploads::sweep_uploads,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::routes::schedules::CreateScheduleRequest,
            crate::routes::schedules::UpdateScheduleRequest,
            crate::routes::schedules::ScheduleResponse,
            crate::routes::schedules::MessageResponse,
            crate::routes::uploads::UploadForm,
            crate::routes::uploads::UploadResponse,
            crate::routes::uploads::SweepRequest,
            crate::routes::uploads::SweepResponse,
        )
    ),
    tags(
        (name = "schedules", description = "Monthly class schedules"),
        (name = "uploads", description = "Image uploads"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Returns the generated `OpenAPI` document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Returns the generated `OpenAPI` document serialized as pretty JSON.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn openapi_json() -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&openapi())
}
