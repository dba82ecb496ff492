use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use courier_blob::{BlobStore, FilesystemBlobStore, DEFAULT_MAX_OBJECT_BYTES};
use courier_contract::{IdentityProvider, Session, StaticIdentityProvider};
use courier_control_plane::{build_router, AppState};
use courier_storage::{RecordStore, SqliteRecordStore, StorageConfig};
use courier_transfer::OrchestratorConfig;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Courier file transfer daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        #[arg(long, default_value = "config/courier.toml")]
        config: PathBuf,
    },
    /// Parse and validate a config file without starting the server.
    CheckConfig {
        #[arg(long, default_value = "config/courier.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    http: HttpSection,
    storage: StorageSection,
    blob: BlobSection,
    #[serde(default)]
    transfers: TransfersSection,
    #[serde(default)]
    identity: IdentitySection,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpSection {
    bind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    sqlite_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct BlobSection {
    root: PathBuf,
    public_base_url: String,
    max_object_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct TransfersSection {
    #[serde(default = "default_issue_codes")]
    issue_codes: bool,
    ttl_hours: Option<i64>,
}

impl Default for TransfersSection {
    fn default() -> Self {
        Self {
            issue_codes: default_issue_codes(),
            ttl_hours: None,
        }
    }
}

/// One hundred years.
const MAX_TTL_HOURS: i64 = 100 * 366 * 24;

fn default_issue_codes() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IdentitySection {
    #[serde(default)]
    users: Vec<IdentityUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdentityUser {
    token: String,
    user_id: String,
    email: String,
    name: Option<String>,
}

impl RuntimeConfig {
    fn load(path: &PathBuf) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: RuntimeConfig = toml::from_str(&source)
            .with_context(|| format!("invalid config TOML at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.socket()?;
        if self.identity.users.is_empty() {
            warn!("no identity users configured: every request will be unauthenticated");
        }
        for user in &self.identity.users {
            if user.token.trim().is_empty() || user.user_id.trim().is_empty() {
                bail!("identity user {} needs a token and user_id", user.email);
            }
        }
        if let Some(hours) = self.transfers.ttl_hours {
            if hours <= 0 || hours > MAX_TTL_HOURS {
                bail!("transfers.ttl_hours must be in 1..={MAX_TTL_HOURS}, got {hours}");
            }
        }
        Ok(())
    }

    fn socket(&self) -> Result<SocketAddr> {
        self.http
            .bind
            .parse()
            .with_context(|| format!("invalid socket address {}", self.http.bind))
    }

    fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            issue_codes: self.transfers.issue_codes,
            ttl: self.transfers.ttl_hours.and_then(chrono::Duration::try_hours),
        }
    }

    fn identity_provider(&self) -> StaticIdentityProvider {
        self.identity
            .users
            .iter()
            .fold(StaticIdentityProvider::new(), |provider, user| {
                let mut session = Session::new(&user.user_id, &user.email);
                session.name = user.name.clone();
                provider.with_user(&user.token, session)
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::CheckConfig { config } => {
            let loaded = RuntimeConfig::load(&config)?;
            info!(
                bind = %loaded.http.bind,
                users = loaded.identity.users.len(),
                "config ok"
            );
            Ok(())
        }
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = RuntimeConfig::load(&config_path)?;
    let socket = config.socket()?;

    let records = SqliteRecordStore::connect(&StorageConfig {
        sqlite_path: config.storage.sqlite_path.clone(),
    })
    .await?;

    let max_object_bytes = config
        .blob
        .max_object_bytes
        .unwrap_or(DEFAULT_MAX_OBJECT_BYTES);
    let blobs = FilesystemBlobStore::new(&config.blob.root, &config.blob.public_base_url)
        .with_max_object_bytes(max_object_bytes);
    blobs
        .ensure_ready()
        .await
        .with_context(|| format!("blob root {} unusable", config.blob.root.display()))?;

    let identity = config.identity_provider();
    for session in identity.known_sessions() {
        records
            .upsert_profile(&session.profile())
            .await
            .with_context(|| format!("failed to seed profile {}", session.user_id))?;
    }
    info!(profiles = config.identity.users.len(), "profile directory seeded");

    if !socket.ip().is_loopback() {
        warn!(bind = %socket, "non-loopback bind: blob route is publicly readable");
    }

    let state = AppState::new(
        Arc::new(blobs),
        Arc::new(records),
        Arc::new(identity),
        config.orchestrator(),
        max_object_bytes,
    );
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "courierd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
