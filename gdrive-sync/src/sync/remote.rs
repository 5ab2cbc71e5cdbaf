use std::path::Path;

use async_trait::async_trait;
use gdrive_core::{ApiErrorClass, DriveClient, DriveError, DriveFile, FOLDER_MIME_TYPE};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to succeed on retry: rate limiting, temporary server failure.
    Transient,
    Permanent,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
    pub class: ErrorClass,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }
}

impl From<DriveError> for RemoteError {
    fn from(err: DriveError) -> Self {
        let class = if err.is_retryable() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        };
        let kind = match err.classification() {
            Some(ApiErrorClass::Auth) => "auth",
            Some(ApiErrorClass::RateLimit) => "rate limit",
            Some(ApiErrorClass::Transient) => "server",
            Some(ApiErrorClass::Permanent) => "request",
            None => "transport",
        };
        Self {
            class,
            status: err.status().map(|status| status.as_u16()),
            message: format!("{kind} error: {err}"),
        }
    }
}

/// A child object of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: String,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        Self {
            size: file.size_bytes(),
            id: file.id,
            name: file.name,
            mime_type: file.mime_type,
        }
    }
}

/// Hierarchical object store the local tree is mirrored into.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Non-trashed children of `parent_id`, optionally only those named `name`.
    async fn list_children(
        &self,
        parent_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteEntry>, RemoteError>;

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, RemoteError>;

    async fn upload_file(
        &self,
        source: &Path,
        name: &str,
        parent_id: &str,
    ) -> Result<String, RemoteError>;
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_children(
        &self,
        parent_id: &str,
        name: Option<&str>,
    ) -> Result<Vec<RemoteEntry>, RemoteError> {
        let files = DriveClient::list_children(self, parent_id, name).await?;
        Ok(files.into_iter().map(RemoteEntry::from).collect())
    }

    async fn create_folder(&self, name: &str, parent_id: &str) -> Result<String, RemoteError> {
        Ok(DriveClient::create_folder(self, name, parent_id).await?.id)
    }

    async fn upload_file(
        &self,
        source: &Path,
        name: &str,
        parent_id: &str,
    ) -> Result<String, RemoteError> {
        Ok(DriveClient::upload_file(self, source, name, parent_id)
            .await?
            .id)
    }
}
