//! Terminal broker server: owns PTY sessions and exposes them over HTTP and
//! a websocket streaming endpoint.

mod extractors;
mod handlers;
mod services;
mod storage;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use services::{AuthService, ConfigStore};
use storage::Database;
use termbroker_core::SessionManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub manager: Arc<SessionManager>,
    pub auth_service: Arc<AuthService>,
    pub config_store: Arc<ConfigStore>,
}

#[derive(Parser, Debug)]
#[command(name = "termbroker-server")]
#[command(author, version, about = "Web-accessible terminal broker", long_about = None)]
struct Cli {
    /// Overrides BIND_ADDRESS.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides DATABASE_PATH.
    #[arg(long)]
    database: Option<String>,

    /// Overrides DATA_DIR.
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()));
        let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        eprintln!("[PANIC] at {:?}: {}", location, payload);
        tracing::error!("panic at {:?}: {}", location, payload);
    }));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[FATAL] failed to initialize logging: {e}");
        std::process::exit(1);
    }

    info!("starting terminal broker v{}", env!("CARGO_PKG_VERSION"));
    info!("pid: {}", std::process::id());

    let cli = Cli::parse();
    if let Err(e) = run_server(cli).await {
        error!("server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(cli: Cli) -> Result<()> {
    let config = load_config(&cli).await.context("loading configuration")?;
    info!(
        bind = %config.bind_address,
        db = %config.database_path,
        "configuration loaded"
    );

    let db = Arc::new(
        Database::new(&config.database_path)
            .await
            .context("initializing database")?,
    );

    let config_store = Arc::new(
        ConfigStore::load(&config.data_dir)
            .await
            .context("loading terminal config")?,
    );
    let terminal_config = config_store.get();

    let manager = Arc::new(SessionManager::new(
        db.clone(),
        terminal_config.session_timeout,
        terminal_config.buffer_size,
    ));
    let auth_service = Arc::new(AuthService::new(db.clone(), config.jwt_secret.clone()));

    let state = AppState {
        db,
        manager,
        auth_service,
        config_store,
    };

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/login", post(handlers::auth::login))
        .route("/terminal/sessions", get(handlers::sessions::list))
        .route(
            "/terminal/session/:id/status",
            get(handlers::sessions::status),
        )
        .route("/terminal/cleanup", post(handlers::sessions::cleanup))
        .route(
            "/config",
            get(handlers::config::get).post(handlers::config::set),
        )
        .route("/terminal/ws/:session_id", get(handlers::ws::handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config
        .bind_address
        .parse()
        .context("parsing bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding to address")?;

    info!("listening on {addr}");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

struct Config {
    bind_address: String,
    database_path: String,
    jwt_secret: String,
    data_dir: PathBuf,
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let data_dir = cli
        .data_dir
        .clone()
        .map(PathBuf::from)
        .or_else(|| std::env::var("DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/var/lib/termbroker"));

    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let database_path = cli.database.clone().unwrap_or_else(|| {
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| {
            data_dir
                .join("terminal_broker.db")
                .to_string_lossy()
                .to_string()
        })
    });

    let bind_address = cli
        .bind
        .clone()
        .unwrap_or_else(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8022".to_string()));

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        warn!("JWT_SECRET not set, using an insecure development default");
        "change-me-in-production".to_string()
    });

    Ok(Config {
        bind_address,
        database_path,
        jwt_secret,
        data_dir,
    })
}
