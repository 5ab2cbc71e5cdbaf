use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_CACHE_DIR: &str = "tmp";
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("local root does not exist: {0}")]
    RootMissing(PathBuf),
    #[error("local root is not a directory: {0}")]
    RootNotDirectory(PathBuf),
    #[error("remote root folder id is empty")]
    EmptyRemoteRoot,
    #[error("worker count must be at least 1")]
    ZeroWorkers,
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("token file {path} is not valid JSON: {source}")]
    TokenJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("token file {0} has no access token")]
    MissingToken(PathBuf),
}

/// Everything one mirror run needs; built once at startup and passed to the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub local_root: PathBuf,
    pub remote_root_id: String,
    pub cache_root: PathBuf,
    pub workers: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl SyncConfig {
    pub fn new(local_root: impl Into<PathBuf>, remote_root_id: impl Into<String>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root_id: remote_root_id.into(),
            cache_root: PathBuf::from(DEFAULT_CACHE_DIR),
            workers: DEFAULT_WORKERS,
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }

    /// Checks the run can start and canonicalizes the local root, which is
    /// the identity of the sync root.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        let meta = std::fs::metadata(&self.local_root).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::RootMissing(self.local_root.clone())
            } else {
                ConfigError::Io {
                    path: self.local_root.clone(),
                    source,
                }
            }
        })?;
        if !meta.is_dir() {
            return Err(ConfigError::RootNotDirectory(self.local_root));
        }
        self.local_root =
            std::fs::canonicalize(&self.local_root).map_err(|source| ConfigError::Io {
                path: self.local_root.clone(),
                source,
            })?;
        if self.remote_root_id.trim().is_empty() {
            return Err(ConfigError::EmptyRemoteRoot);
        }
        if self.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        Ok(self)
    }
}

/// Authorized-user credentials file; only the access token is used.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

pub fn load_access_token(path: &Path) -> Result<String, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: TokenFile =
        serde_json::from_str(&raw).map_err(|source| ConfigError::TokenJson {
            path: path.to_path_buf(),
            source,
        })?;
    parsed
        .token
        .or(parsed.access_token)
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ConfigError::MissingToken(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_uses_defaults() {
        let config = SyncConfig::new("/data", "root-id");
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.cache_root, PathBuf::from("tmp"));
    }

    #[test]
    fn validate_rejects_missing_root() {
        let dir = tempdir().unwrap();
        let err = SyncConfig::new(dir.path().join("missing"), "root-id")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::RootMissing(_)));
    }

    #[test]
    fn validate_rejects_file_root_and_bad_settings() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            SyncConfig::new(&file, "root-id").validate(),
            Err(ConfigError::RootNotDirectory(_))
        ));
        assert!(matches!(
            SyncConfig::new(dir.path(), " ").validate(),
            Err(ConfigError::EmptyRemoteRoot)
        ));
        let mut config = SyncConfig::new(dir.path(), "root-id");
        config.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroWorkers)));
    }

    #[test]
    fn validate_canonicalizes_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        let config = SyncConfig::new(dir.path().join("a/./b/.."), "root-id")
            .validate()
            .unwrap();
        assert_eq!(
            config.local_root,
            std::fs::canonicalize(dir.path().join("a")).unwrap()
        );
    }

    #[test]
    fn loads_token_from_authorized_user_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(
            &path,
            r#"{"token": "ya29.abc", "refresh_token": "1//r", "client_id": "id"}"#,
        )
        .unwrap();
        assert_eq!(load_access_token(&path).unwrap(), "ya29.abc");

        std::fs::write(&path, r#"{"access_token": "ya29.def"}"#).unwrap();
        assert_eq!(load_access_token(&path).unwrap(), "ya29.def");

        std::fs::write(&path, r#"{"refresh_token": "1//r"}"#).unwrap();
        assert!(matches!(
            load_access_token(&path),
            Err(ConfigError::MissingToken(_))
        ));
    }
}
