use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, LOCATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::query::children_query;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";
const FILES_ENDPOINT: &str = "/drive/v3/files";
const UPLOAD_ENDPOINT: &str = "/upload/drive/v3/files";
const LIST_PAGE_SIZE: u32 = 1000;
const FILE_FIELDS: &str = "id,name,mimeType,size";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Idle time allowed between reads; a stalled transfer fails instead of
/// holding its worker forever.
const READ_TIMEOUT: Duration = Duration::from_secs(120);

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("upload session response is missing a Location header")]
    MissingUploadSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_timeouts(base_url, token, CONNECT_TIMEOUT, READ_TIMEOUT)
    }

    pub fn with_timeouts(
        base_url: &str,
        token: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, DriveError> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    /// Lists every non-trashed child of `parent_id`, following pagination.
    /// When `name` is given only exact-name matches are returned.
    pub async fn list_children(
        &self,
        parent_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<DriveFile>, DriveError> {
        let query = children_query(parent_id, name);
        let mut page_token: Option<String> = None;
        let mut files = Vec::new();
        loop {
            let page = self.list_page(&query, page_token.as_deref()).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(files)
    }

    pub async fn list_page(
        &self,
        query: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let mut url = self.endpoint(FILES_ENDPOINT)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("spaces", "drive")
                .append_pair("pageSize", &LIST_PAGE_SIZE.to_string())
                .append_pair("fields", &format!("nextPageToken,files({FILE_FIELDS})"));
            if let Some(token) = page_token {
                pairs.append_pair("pageToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<DriveFile, DriveError> {
        let mut url = self.endpoint(FILES_ENDPOINT)?;
        url.query_pairs_mut().append_pair("fields", FILE_FIELDS);
        let body = NewFile {
            name,
            mime_type: Some(FOLDER_MIME_TYPE),
            parents: [parent_id],
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    /// Opens a resumable upload session and returns its session URL.
    pub async fn start_resumable_upload(
        &self,
        name: &str,
        parent_id: &str,
        size: u64,
    ) -> Result<Url, DriveError> {
        let mut url = self.endpoint(UPLOAD_ENDPOINT)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "resumable")
            .append_pair("fields", FILE_FIELDS);
        let body = NewFile {
            name,
            mime_type: None,
            parents: [parent_id],
        };
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .header("X-Upload-Content-Length", size.to_string())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Api { status, body });
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(DriveError::MissingUploadSession)?;
        Ok(Url::parse(location)?)
    }

    /// Streams `source` into an open upload session in a single request.
    pub async fn upload_to_session(
        &self,
        session: Url,
        source: &Path,
        size: u64,
    ) -> Result<DriveFile, DriveError> {
        let file = tokio::fs::File::open(source).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .http
            .put(session)
            .bearer_auth(&self.token)
            .header(CONTENT_LENGTH, size)
            .body(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn upload_file(
        &self,
        source: &Path,
        name: &str,
        parent_id: &str,
    ) -> Result<DriveFile, DriveError> {
        let size = tokio::fs::metadata(source).await?.len();
        let session = self.start_resumable_upload(name, parent_id, size).await?;
        self.upload_to_session(session, source, size).await
    }

    fn endpoint(&self, path: &str) -> Result<Url, DriveError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, body } => Some(classify_api_status(*status, body)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            // Dropped connections surface as request or body errors.
            DriveError::Request(err) => {
                err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
            }
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DriveError::Api { status, .. } => Some(*status),
            DriveError::Request(err) => err.status(),
            _ => None,
        }
    }
}

fn classify_api_status(status: StatusCode, body: &str) -> ApiErrorClass {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status == StatusCode::FORBIDDEN && is_rate_limit_reason(body) {
        // Drive reports per-user quotas as 403 with a rate-limit reason.
        ApiErrorClass::RateLimit
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn is_rate_limit_reason(body: &str) -> bool {
    body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded")
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    /// Drive encodes int64 values as JSON strings; absent for folders.
    #[serde(default)]
    pub size: Option<String>,
}

impl DriveFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFile<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    parents: [&'a str; 1],
}
