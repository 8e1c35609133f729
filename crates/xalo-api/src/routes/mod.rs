//! HTTP route handlers.

pub mod schedules;
pub mod uploads;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// `/api/v1` routes.
///
/// Reads are public; writes go through the admin guard in each handler.
pub fn api_v1_routes(upload_max_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .merge(schedules::routes())
        .merge(uploads::routes(upload_max_bytes))
}
