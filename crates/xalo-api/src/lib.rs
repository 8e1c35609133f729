//! # xalo-api
//!
//! HTTP composition layer for the Xalo English school site.
//!
//! - **Access control**: `protect` (any verified identity) and `admin`
//!   (identity with the admin role) guards as request extractors
//! - **Schedules**: monthly class schedules with ordered image galleries
//! - **Uploads**: image storage, public serving, and orphan sweeping
//! - **Observability**: request tracing, Prometheus metrics, health checks
//!
//! Domain rules live in `xalo-core`; handlers here only translate HTTP.
//!
//! ## Endpoints
//!
//! ```text
//!   GET  /health                  - Health check
//!   GET  /ready                   - Readiness check
//!   GET  /metrics                 - Prometheus metrics
//!   /api/v1/schedules             - Schedule list (public) and CRUD (admin)
//!   POST /api/v1/upload           - Image upload (admin)
//!   GET  /api/v1/uploads/{name}   - Uploaded image (public)
//!   POST /api/v1/uploads/sweep    - Orphaned upload sweep (admin)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use xalo_api::server::Server;
//!
//! let server = Server::builder()
//!     .http_port(5000)
//!     .debug(true)
//!     .build();
//!
//! server.serve().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod openapi;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::{AdminContext, RequestContext};
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::server::Server;
}
