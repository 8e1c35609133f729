//! HTTP client for the Xalo API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use xalo_core::{ImageUploader, PendingFile, Schedule, ScheduleId, SweepReport, UploadError};

use crate::Config;

/// API client for schedule and upload endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Creates a new API client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.api_url.clone(),
            token: config.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Lists schedules, newest month first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let response = self
            .client
            .get(self.url("/schedules"))
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Finds one schedule by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no schedule has this ID.
    pub async fn find_schedule(&self, id: ScheduleId) -> Result<Schedule> {
        self.list_schedules()
            .await?
            .into_iter()
            .find(|s| s.id == id)
            .with_context(|| format!("Schedule {id} not found"))
    }

    /// Creates a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn create_schedule(&self, body: &ScheduleBody) -> Result<Schedule> {
        let req = self.client.post(self.url("/schedules")).json(body);
        let response = self
            .authed(req)
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Partially updates a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn update_schedule(&self, id: ScheduleId, body: &ScheduleBody) -> Result<Schedule> {
        let req = self.client.put(self.url(&format!("/schedules/{id}"))).json(body);
        let response = self
            .authed(req)
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Deletes a schedule.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn delete_schedule(&self, id: ScheduleId) -> Result<MessageResponse> {
        let req = self.client.delete(self.url(&format!("/schedules/{id}")));
        let response = self
            .authed(req)
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    /// Runs the orphaned upload sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn sweep(&self, body: &SweepBody) -> Result<SweepReport> {
        let req = self.client.post(self.url("/uploads/sweep")).json(body);
        let response = self
            .authed(req)
            .send()
            .await
            .context("Failed to send request")?;
        parse(response).await
    }

    async fn upload_file(&self, file: &PendingFile) -> Result<String, UploadError> {
        tracing::debug!(file = %file.name, size = file.len(), "uploading");
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| UploadError::Rejected(format!("invalid content type: {e}")))?;
        let form = Form::new().part("image", part);

        let req = self.client.post(self.url("/upload")).multipart(form);
        let response = self
            .authed(req)
            .send()
            .await
            .map_err(|e| UploadError::Failed(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: UploadResponse = response
                .json()
                .await
                .map_err(|e| UploadError::Failed(format!("bad upload response: {e}")))?;
            return Ok(body.image_url);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::PAYLOAD_TOO_LARGE => UploadError::Rejected(format!("file too large: {body}")),
            s if s.is_client_error() => UploadError::Rejected(format!("API error ({s}): {body}")),
            s => UploadError::Failed(format!("API error ({s}): {body}")),
        })
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    if response.status().is_success() {
        response.json().await.context("Failed to parse response")
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({status}): {body}")
    }
}

/// [`ImageUploader`] that posts each file to `POST /api/v1/upload`.
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: ApiClient,
}

impl HttpUploader {
    /// Wraps an API client.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageUploader for HttpUploader {
    async fn upload(&self, file: &PendingFile) -> Result<String, UploadError> {
        self.client.upload_file(file).await
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Create or update body. Unset fields are omitted.
#[derive(Debug, Default, Serialize)]
pub struct ScheduleBody {
    /// Calendar month (`YYYY-MM`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    /// Title; an empty string clears it on update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Full ordered image list.
    #[serde(rename = "scheduleImgURL", skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Sweep request body.
#[derive(Debug, Default, Serialize)]
pub struct SweepBody {
    /// Report without deleting.
    pub dry_run: bool,
    /// Grace period override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_seconds: Option<u64>,
}

/// Upload response.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Public URL of the stored image.
    pub image_url: String,
}

/// Confirmation message.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable confirmation.
    pub message: String,
}
