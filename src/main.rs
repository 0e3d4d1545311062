use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use journal_auth::{DohHandleResolver, HttpOAuthClient, IdentityService, OAuthConfig};
use journal_server::{AppState, ServerConfig};
use journal_store::Database;
use journal_telemetry::{init_telemetry, TelemetryConfig};

/// Personal journal server with AT Protocol sign-in.
#[derive(Debug, Parser)]
#[command(name = "a7journal", version)]
struct Args {
    #[arg(long, env = "A7_HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(long, env = "A7_PORT", default_value_t = journal_auth::config::DEFAULT_DEV_PORT)]
    port: u16,

    /// Directory holding the entry database and the log database.
    #[arg(long, env = "A7_DATA_DIR", default_value = journal_store::database::DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Public origin, e.g. `https://journal.example`. Required outside dev mode.
    #[arg(long, env = "A7_PUBLIC_ORIGIN")]
    public_origin: Option<String>,

    /// Use a loopback OAuth client instead of published client metadata.
    #[arg(long, env = "A7_DEV")]
    dev: bool,

    /// Directory serving `did:plc` documents.
    #[arg(
        long,
        env = "A7_PLC_DIRECTORY",
        default_value = journal_auth::config::DEFAULT_PLC_DIRECTORY
    )]
    plc_directory: String,

    #[arg(long, env = "A7_LOG_LEVEL", default_value = "info")]
    log_level: tracing::Level,

    #[arg(long, env = "A7_JSON_LOGS")]
    json_logs: bool,

    /// Persist warn+ logs to `<data-dir>/logs.sqlite`.
    #[arg(long, env = "A7_LOG_TO_SQLITE")]
    log_to_sqlite: bool,

    /// Days of persisted warnings kept across restarts.
    #[arg(long, env = "A7_LOG_RETENTION_DAYS", default_value_t = 14)]
    log_retention_days: u32,
}

impl Args {
    fn oauth_config(&self) -> anyhow::Result<OAuthConfig> {
        let origin = match (&self.public_origin, self.dev) {
            (Some(origin), _) => origin.clone(),
            (None, true) => format!("http://127.0.0.1:{}", self.port),
            (None, false) => {
                anyhow::bail!("A7_PUBLIC_ORIGIN is required unless --dev (A7_DEV) is set")
            }
        };
        Ok(OAuthConfig {
            dev: self.dev,
            origin,
            dev_port: self.port,
            plc_directory: self.plc_directory.clone(),
            ..OAuthConfig::default()
        })
    }

    fn server_config(&self) -> anyhow::Result<ServerConfig> {
        Ok(ServerConfig {
            host: self.host.clone(),
            port: self.port,
            oauth: self.oauth_config()?,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_telemetry(TelemetryConfig {
        log_level: args.log_level,
        json: args.json_logs,
        log_to_sqlite: args.log_to_sqlite,
        log_db_path: args.data_dir.join("logs.sqlite"),
        log_retention_days: args.log_retention_days,
        ..Default::default()
    })?;

    tracing::info!("starting a7journal");

    let config = args.server_config()?;

    let db = Database::open_in_dir(&args.data_dir).context("failed to open entry database")?;

    let http = reqwest::Client::builder()
        .user_agent(concat!("a7journal/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(15))
        .build()?;
    let resolver = Arc::new(DohHandleResolver::new(
        http.clone(),
        config.oauth.doh_endpoint.clone(),
    ));
    let client = HttpOAuthClient::new(http, config.oauth.clone(), resolver)
        .context("failed to create OAuth client")?;
    let client = Arc::new(client);
    let identity = IdentityService::new(client, config.oauth.clone());

    tracing::info!(
        dev = config.oauth.dev,
        client_id = %config.oauth.client_id(),
        "oauth client configured"
    );

    let handle = journal_server::start(config, AppState::new(db, identity))
        .await
        .context("failed to start server")?;

    tracing::info!(port = handle.port, "a7journal ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}
