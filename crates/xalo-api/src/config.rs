//! Server configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use xalo_core::sweep::DEFAULT_SWEEP_GRACE_SECS;
use xalo_core::uploads::DEFAULT_MAX_UPLOAD_BYTES;
use xalo_core::{Error, Result};

/// Origins the public site is served from.
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "https://xaloenglish.vercel.app",
    "https://www.xalo.edu.vn",
    "https://xalo.edu.vn",
];

/// Configuration for the Xalo API server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server port.
    pub http_port: u16,

    /// Enable debug mode.
    ///
    /// When enabled, `RequestContext` is read from `X-User-Id` / `X-User-Role`
    /// headers. When disabled, a verified bearer JWT is required on protected
    /// routes.
    pub debug: bool,

    /// Optional shared secret required to access `/metrics`.
    ///
    /// Callers send `X-Metrics-Secret: <secret>` or
    /// `Authorization: Bearer <secret>`.
    #[serde(default)]
    pub metrics_secret: Option<String>,

    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,

    /// JWT verification settings.
    #[serde(default)]
    pub jwt: JwtConfig,

    /// Storage location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Upload limits and public URL base.
    #[serde(default)]
    pub uploads: UploadConfig,

    /// Orphaned upload sweep.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 5000,
            debug: false,
            metrics_secret: None,
            cors: CorsConfig::default(),
            jwt: JwtConfig::default(),
            storage: StorageConfig::default(),
            uploads: UploadConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// CORS configuration for the admin console and public site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins. `["*"]` allows all origins (debug only). Empty
    /// disables CORS.
    pub allowed_origins: Vec<String>,

    /// Max age for preflight cache (seconds).
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_CORS_ORIGINS.iter().map(ToString::to_string).collect(),
            max_age_seconds: 3600,
        }
    }
}

/// JWT configuration for production authentication.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 secret used to verify bearer tokens.
    #[serde(default)]
    pub hs256_secret: Option<String>,
    /// Optional issuer (`iss`) to enforce.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Optional audience (`aud`) to enforce.
    #[serde(default)]
    pub audience: Option<String>,
    /// Claim name that contains the user identifier.
    #[serde(default = "default_user_claim")]
    pub user_claim: String,
    /// Claim name that contains the user's role.
    #[serde(default = "default_role_claim")]
    pub role_claim: String,
    /// Role value that grants admin access.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("hs256_secret", &self.hs256_secret.as_ref().map(|_| "[REDACTED]"))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("user_claim", &self.user_claim)
            .field("role_claim", &self.role_claim)
            .field("admin_role", &self.admin_role)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            hs256_secret: None,
            issuer: None,
            audience: None,
            user_claim: default_user_claim(),
            role_claim: default_role_claim(),
            admin_role: default_admin_role(),
        }
    }
}

fn default_user_claim() -> String {
    "sub".to_string()
}

fn default_role_claim() -> String {
    "role".to_string()
}

fn default_admin_role() -> String {
    "admin".to_string()
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for schedules and uploads. In-memory when unset
    /// (debug only).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Base URL prefixed to issued upload URLs. Defaults to
    /// `http://localhost:{http_port}`.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Maximum accepted file size in bytes.
    pub max_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            public_base_url: None,
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Orphaned upload sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run the sweep in the background every N seconds. Disabled when unset.
    #[serde(default)]
    pub interval_secs: Option<u64>,
    /// Unreferenced uploads younger than this are kept.
    pub grace_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: None,
            grace_secs: DEFAULT_SWEEP_GRACE_SECS.unsigned_abs(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported env vars:
    /// - `XALO_HTTP_PORT` (falls back to `PORT`)
    /// - `XALO_DEBUG`
    /// - `XALO_METRICS_SECRET`
    /// - `XALO_CORS_ALLOWED_ORIGINS` (comma-separated, or `*`)
    /// - `XALO_CORS_MAX_AGE_SECONDS`
    /// - `XALO_JWT_SECRET`
    /// - `XALO_JWT_ISSUER`
    /// - `XALO_JWT_AUDIENCE`
    /// - `XALO_JWT_USER_CLAIM`
    /// - `XALO_JWT_ROLE_CLAIM`
    /// - `XALO_ADMIN_ROLE`
    /// - `XALO_DATA_DIR`
    /// - `XALO_PUBLIC_BASE_URL`
    /// - `XALO_UPLOAD_MAX_BYTES`
    /// - `XALO_SWEEP_INTERVAL_SECS`
    /// - `XALO_SWEEP_GRACE_SECS`
    ///
    /// # Errors
    ///
    /// Returns an error if any environment variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed.
    pub fn from_vars(vars: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Vars(&vars);
        let mut config = Self::default();

        if let Some(port) = env.u16("XALO_HTTP_PORT")?.or(env.u16("PORT")?) {
            config.http_port = port;
        }
        if let Some(debug) = env.bool("XALO_DEBUG")? {
            config.debug = debug;
        }
        config.metrics_secret = env.string("XALO_METRICS_SECRET");

        if let Some(origins) = env.string("XALO_CORS_ALLOWED_ORIGINS") {
            config.cors.allowed_origins = parse_cors_allowed_origins(&origins);
        }
        if let Some(max_age) = env.u64("XALO_CORS_MAX_AGE_SECONDS")? {
            config.cors.max_age_seconds = max_age;
        }

        config.jwt.hs256_secret = env.string("XALO_JWT_SECRET");
        config.jwt.issuer = env.string("XALO_JWT_ISSUER");
        config.jwt.audience = env.string("XALO_JWT_AUDIENCE");
        if let Some(claim) = env.string("XALO_JWT_USER_CLAIM") {
            config.jwt.user_claim = claim;
        }
        if let Some(claim) = env.string("XALO_JWT_ROLE_CLAIM") {
            config.jwt.role_claim = claim;
        }
        if let Some(role) = env.string("XALO_ADMIN_ROLE") {
            config.jwt.admin_role = role;
        }

        config.storage.data_dir = env.string("XALO_DATA_DIR").map(PathBuf::from);

        config.uploads.public_base_url = env.string("XALO_PUBLIC_BASE_URL");
        if let Some(max_bytes) = env.u64("XALO_UPLOAD_MAX_BYTES")? {
            if max_bytes == 0 {
                return Err(Error::InvalidInput(
                    "XALO_UPLOAD_MAX_BYTES must be greater than 0".to_string(),
                ));
            }
            config.uploads.max_bytes = usize::try_from(max_bytes).map_err(|_| {
                Error::InvalidInput("XALO_UPLOAD_MAX_BYTES is too large".to_string())
            })?;
        }

        if let Some(interval) = env.u64("XALO_SWEEP_INTERVAL_SECS")? {
            if interval == 0 {
                return Err(Error::InvalidInput(
                    "XALO_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
                ));
            }
            config.sweep.interval_secs = Some(interval);
        }
        if let Some(grace) = env.u64("XALO_SWEEP_GRACE_SECS")? {
            config.sweep.grace_secs = grace;
        }

        Ok(config)
    }

    /// Base URL for issued upload URLs.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.uploads
            .public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.http_port))
    }

    /// Grace period for the orphan sweep.
    #[must_use]
    pub fn sweep_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.sweep.grace_secs).unwrap_or(i64::MAX))
    }

    /// Checks production guardrails.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` when `debug=false` and CORS allows `*`, no
    /// JWT secret is configured, no data directory is configured, or no public
    /// base URL is configured.
    pub fn validate(&self) -> Result<()> {
        if self.debug {
            return Ok(());
        }
        if self.cors.allowed_origins.iter().any(|origin| origin == "*") {
            return Err(Error::InvalidInput(
                "cors.allowed_origins cannot include '*' when debug=false".to_string(),
            ));
        }
        if self.jwt.hs256_secret.is_none() {
            return Err(Error::InvalidInput(
                "jwt.hs256_secret (XALO_JWT_SECRET) is required when debug=false".to_string(),
            ));
        }
        if self.storage.data_dir.is_none() {
            return Err(Error::InvalidInput(
                "storage.data_dir (XALO_DATA_DIR) is required when debug=false".to_string(),
            ));
        }
        if self.uploads.public_base_url.is_none() {
            return Err(Error::InvalidInput(
                "uploads.public_base_url (XALO_PUBLIC_BASE_URL) is required when debug=false"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn u16(&self, name: &str) -> Result<Option<u16>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u16>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u16: {e}")))
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<u64>()
            .map(Some)
            .map_err(|e| Error::InvalidInput(format!("{name} must be a u64: {e}")))
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        parse_bool(name, &v).map(Some)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::InvalidInput(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn parse_cors_allowed_origins(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    if trimmed == "*" {
        return vec!["*".to_string()];
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
