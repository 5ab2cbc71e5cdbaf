use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use gdrive_core::DriveClient;
use gdrive_sync::config::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_CACHE_DIR, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
    DEFAULT_TOKEN_FILE, DEFAULT_WORKERS, SyncConfig, load_access_token,
};
use gdrive_sync::logging;
use gdrive_sync::sync::engine::{SyncEngine, SyncSummary};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EXIT_FAILED_FILES: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Mirror a local folder into a Google Drive folder, resuming where the last
/// run stopped.
#[derive(Debug, Parser)]
#[command(name = "gdrive-sync", version)]
struct Cli {
    /// Local folder to mirror.
    #[arg(long, env = "GDRIVE_SYNC_LOCAL")]
    local: PathBuf,

    /// ID of the Drive folder that mirrors the local root.
    #[arg(long, env = "GDRIVE_SYNC_DRIVE_ID")]
    drive_id: String,

    #[arg(long, env = "GDRIVE_SYNC_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Retries per file after transient errors.
    #[arg(long, env = "GDRIVE_SYNC_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// Delay before the first retry; doubles on each further retry.
    #[arg(long, env = "GDRIVE_SYNC_BASE_DELAY_MS", default_value_t = DEFAULT_BASE_DELAY_MS)]
    base_delay_ms: u64,

    /// Directory holding the per-root todo and done logs.
    #[arg(long, env = "GDRIVE_SYNC_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// OAuth access token; takes precedence over --token-file.
    #[arg(long, env = "GDRIVE_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Authorized-user JSON file with a `token` or `access_token` field.
    #[arg(long, env = "GDRIVE_SYNC_TOKEN_FILE", default_value = DEFAULT_TOKEN_FILE)]
    token_file: PathBuf,

    /// Override the Drive API endpoint.
    #[arg(long, env = "GDRIVE_SYNC_API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new(&self.local, &self.drive_id);
        config.cache_root = self.cache_dir.clone();
        config.workers = self.workers;
        config.max_retries = self.max_retries;
        config.base_delay = Duration::from_millis(self.base_delay_ms);
        config.max_delay = Duration::from_millis(DEFAULT_MAX_DELAY_MS.max(self.base_delay_ms));
        config
    }

    fn access_token(&self) -> anyhow::Result<String> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => load_access_token(&self.token_file).with_context(|| {
                format!(
                    "no access token: pass --token, set GDRIVE_ACCESS_TOKEN, or provide {}",
                    self.token_file.display()
                )
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = cli.sync_config().validate()?;
    let token = cli.access_token()?;
    let client = match cli.api_base_url.as_deref() {
        Some(base_url) => DriveClient::with_base_url(base_url, token),
        None => DriveClient::new(token),
    }
    .context("failed to build Drive client")?;

    info!(
        root = %config.local_root.display(),
        drive_id = %config.remote_root_id,
        workers = config.workers,
        max_retries = config.max_retries,
        "starting sync"
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing running uploads");
            on_signal.cancel();
        }
    });

    let engine = SyncEngine::new(Arc::new(client), config);
    let summary = engine.run(cancel.clone()).await.context("sync run failed")?;
    report(&summary);

    Ok(ExitCode::from(exit_code(&summary, cancel.is_cancelled())))
}

fn report(summary: &SyncSummary) {
    for failed in &summary.failed {
        error!(
            path = %failed.rel_path,
            attempts = failed.attempts,
            error = %failed.error,
            "not uploaded"
        );
    }
    info!(
        total = summary.total,
        todo = summary.todo,
        uploaded = summary.uploaded,
        already_present = summary.already_present,
        skipped_missing = summary.skipped_missing,
        failed = summary.failed.len(),
        retries = summary.retries,
        remaining = summary.undispatched,
        "sync finished"
    );
}

fn exit_code(summary: &SyncSummary, interrupted: bool) -> u8 {
    if interrupted && summary.undispatched > 0 {
        EXIT_INTERRUPTED
    } else if !summary.failed.is_empty() {
        EXIT_FAILED_FILES
    } else {
        0
    }
}
