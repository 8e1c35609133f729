//! Request context extraction and access control.
//!
//! Two guards sit in front of the admin routes:
//!
//! - **protect** ([`RequestContext`]): the caller must present an identity. In
//!   debug mode this comes from `X-User-Id` / `X-User-Role` headers; in
//!   production from a verified HS256 bearer JWT (user claim default `sub`,
//!   role claim default `role`).
//! - **admin** ([`AdminContext`]): the identity must also carry the configured
//!   admin role.
//!
//! Every response carries an `x-request-id` header, taken from the request
//! when present and minted as a ULID otherwise.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
use ulid::Ulid;

use crate::config::JwtConfig;
use crate::error::ApiError;
use crate::server::AppState;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation ID for the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    fn from_parts(parts: &Parts) -> Self {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return existing.clone();
        }
        Self(header_string(&parts.headers, REQUEST_ID_HEADER).unwrap_or_else(|| Ulid::new().to_string()))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// User identifier (from JWT or debug headers).
    pub user_id: String,
    /// Role claim, if present.
    pub role: Option<String>,
    /// Request ID for tracing/correlation.
    pub request_id: String,
}

impl RequestContext {
    /// Returns true when the caller holds `admin_role`.
    #[must_use]
    pub fn has_role(&self, admin_role: &str) -> bool {
        self.role.as_deref() == Some(admin_role)
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let request_id = RequestId::from_parts(parts).0;
        let headers = &parts.headers;

        let (user_id, role) = if state.config.debug {
            let user_id = header_string(headers, "X-User-Id")
                .ok_or_else(|| ApiError::missing_auth().with_request_id(request_id.clone()))?;
            (user_id, header_string(headers, "X-User-Role"))
        } else {
            extract_from_jwt(headers, &state.config.jwt, &request_id)?
        };

        let ctx = Self {
            user_id,
            role,
            request_id,
        };
        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

/// Authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminContext(pub RequestContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let ctx = RequestContext::from_request_parts(parts, state).await?;
        if !ctx.has_role(&state.config.jwt.admin_role) {
            tracing::warn!(
                user_id = %ctx.user_id,
                role = ?ctx.role,
                request_id = %ctx.request_id,
                "admin route denied"
            );
            return Err(ApiError::forbidden("Not authorized as an admin")
                .with_request_id(ctx.request_id));
        }
        Ok(Self(ctx))
    }
}

fn extract_from_jwt(
    headers: &HeaderMap,
    jwt: &JwtConfig,
    request_id: &str,
) -> Result<(String, Option<String>), ApiError> {
    let token = bearer_token(headers)
        .ok_or_else(|| ApiError::missing_auth().with_request_id(request_id.to_string()))?;

    let Some(secret) = jwt.hs256_secret.as_deref() else {
        return Err(
            ApiError::internal("jwt.hs256_secret is required when debug=false")
                .with_request_id(request_id.to_string()),
        );
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_nbf = true;
    if let Some(iss) = jwt.issuer.as_deref() {
        validation.set_issuer(&[iss]);
    }
    if let Some(aud) = jwt.audience.as_deref() {
        validation.set_audience(&[aud]);
    }

    let data = jsonwebtoken::decode::<Value>(
        &token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        ApiError::invalid_token().with_request_id(request_id.to_string())
    })?;

    let Some(obj) = data.claims.as_object() else {
        return Err(ApiError::invalid_token().with_request_id(request_id.to_string()));
    };

    let user_id = string_claim(obj, &jwt.user_claim)
        .ok_or_else(|| ApiError::invalid_token().with_request_id(request_id.to_string()))?;
    let role = string_claim(obj, &jwt.role_claim);

    Ok((user_id, role))
}

fn string_claim(obj: &serde_json::Map<String, Value>, claim: &str) -> Option<String> {
    obj.get(claim)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization")?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Request ID middleware.
///
/// Resolves the request ID once, stores it in request extensions for
/// extractors, and echoes it on the response.
pub async fn request_id_middleware(req: Request<Body>, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let request_id = RequestId::from_parts(&parts);
    parts.extensions.insert(request_id.clone());

    let mut response = next.run(Request::from_parts(parts, body)).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}
