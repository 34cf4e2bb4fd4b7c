//! Client for the image CDN's unsigned upload API.
//!
//! Uploads go to `{base_url}/{cloud_name}/image/upload` as a multipart form
//! carrying the file, the upload preset and an optional folder.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Error)]
pub enum CdnError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected with status {status}: {message}")]
    Upload { status: u16, message: String },
    #[error("invalid CDN base URL '{0}'")]
    InvalidBaseUrl(String),
    #[error("invalid content type '{0}'")]
    InvalidContentType(String),
}

/// An image stored on the CDN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    #[serde(default)]
    pub filename: String,
    pub secure_url: String,
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

#[derive(Clone)]
pub struct CdnClient {
    client: Client,
    upload_url: Url,
    upload_preset: String,
    folder: Option<String>,
}

impl CdnClient {
    /// # Errors
    ///
    /// Returns [`CdnError::Http`] if the `reqwest::Client` cannot be built.
    pub fn new(cloud_name: &str, upload_preset: &str, timeout_secs: u64) -> Result<Self, CdnError> {
        Self::with_base_url(cloud_name, upload_preset, timeout_secs, DEFAULT_BASE_URL)
    }

    /// Client against a custom base URL (a mock server in tests).
    ///
    /// # Errors
    ///
    /// Returns [`CdnError::InvalidBaseUrl`] when `base_url` plus the cloud
    /// name does not form a valid URL.
    pub fn with_base_url(cloud_name: &str, upload_preset: &str, timeout_secs: u64, base_url: &str) -> Result<Self, CdnError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("storefront/0.1 (image-upload)")
            .build()?;
        let raw = format!("{}/{}/image/upload", base_url.trim_end_matches('/'), cloud_name.trim_matches('/'));
        let upload_url = Url::parse(&raw).map_err(|_| CdnError::InvalidBaseUrl(base_url.to_owned()))?;
        Ok(Self { client, upload_url, upload_preset: upload_preset.to_owned(), folder: None })
    }

    pub fn with_folder(mut self, folder: Option<String>) -> Self {
        self.folder = folder.filter(|f| !f.trim().is_empty());
        self
    }

    /// Uploads one file.
    ///
    /// # Errors
    ///
    /// - [`CdnError::Upload`] when the CDN answers with a non-2xx status.
    /// - [`CdnError::InvalidContentType`] when `content_type` is not a MIME type.
    /// - [`CdnError::Http`] on network failure or an unreadable body.
    pub async fn upload(&self, filename: &str, content_type: Option<&str>, bytes: Vec<u8>) -> Result<UploadedImage, CdnError> {
        let mut part = Part::bytes(bytes).file_name(filename.to_owned());
        if let Some(mime) = content_type {
            part = part.mime_str(mime).map_err(|_| CdnError::InvalidContentType(mime.to_owned()))?;
        }
        let mut form = Form::new().part("file", part).text("upload_preset", self.upload_preset.clone());
        if let Some(folder) = &self.folder {
            form = form.text("folder", folder.clone());
        }

        let response = self.client.post(self.upload_url.clone()).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            tracing::warn!(status = status.as_u16(), filename, "cdn upload rejected");
            return Err(CdnError::Upload { status: status.as_u16(), message });
        }

        let mut image: UploadedImage = response.json().await?;
        image.filename = filename.to_owned();
        tracing::debug!(filename, public_id = %image.public_id, "image uploaded");
        Ok(image)
    }
}
