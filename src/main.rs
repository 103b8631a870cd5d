use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use clap::Parser;
use eyre::WrapErr;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate lazy_static;

#[macro_use]
mod macros;

mod api;
mod cli;
mod clock;
mod config;
mod cookies;
mod db;
mod env;
mod error;
mod game;
mod routes;
#[cfg(test)]
mod testing;
mod traits;

use clock::{Clock, SystemClock};
use config::GameConfig;
use db::{MemoryStore, PgStore, Store};
pub use error::{AppError, AppResult};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<GameConfig>,
    /// Serializes everything that reshapes the schedule: rollover, window
    /// creation and manual reset.
    rollover_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: GameConfig) -> Self {
        Self {
            store,
            clock,
            config: Arc::new(config),
            rollover_lock: Arc::default(),
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&*env::RUST_LOG))
        .init();

    let config = GameConfig::from_env().wrap_err("invalid game configuration")?;
    tracing::info!(
        timezone = %config.timezone,
        window_start = %config.window_start,
        window_end = %config.window_end,
        "Loaded game configuration.",
    );

    let pg_store = match &*env::DATABASE_URL {
        Some(url) => Some(Arc::new(
            PgStore::connect(url)
                .await
                .wrap_err("can't connect to database")?,
        )),
        None => {
            tracing::warn!("DATABASE_URL is not set; game state will be kept in memory only.");
            None
        }
    };
    let store: Arc<dyn Store> = match &pg_store {
        Some(pg) => pg.clone() as Arc<dyn Store>,
        None => Arc::new(MemoryStore::new()),
    };
    let state = AppState::new(store, Arc::new(SystemClock), config);

    match args.command.unwrap_or_default() {
        cli::Command::Run => {
            if let Some(pg) = &pg_store {
                pg.migrate().await?;
            }
            run(state).await?;
        }
        cli::Command::Migrate => {
            let pg = pg_store.ok_or_else(|| eyre::eyre!("migrate requires DATABASE_URL"))?;
            pg.migrate().await?;
            tracing::info!("Database migrated.");
        }
        cli::Command::Reset => {
            state.store.reset().await?;
            tracing::info!("Database reset.");
        }
        cli::Command::Rollover => {
            let report = state.trigger_daily_rollover().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        cli::Command::EnsureWindow => match state.ensure_next_window().await? {
            Some(window) => println!("Scheduled window {} at {}", window.id, window.open_time),
            None => println!("A window is already scheduled."),
        },
        cli::Command::CreateUser { name, rank } => {
            let user = state.create_user(&name, rank).await?;
            let token = state.create_token(user.id).await?;
            println!("Created user {} with ID {}", user.name, user.id);
            println!("Token: {}", token.string);
        }
        cli::Command::IssueToken { name } => {
            let user = state.find_user_by_name(&name).await?;
            let token = state.create_token(user.id).await?;
            tracing::info!(user_id = %user.id, "Issued sign-in token from the command line.");
            println!("Token for {} (ID {}): {}", user.name, user.id, token.string);
        }
    }

    Ok(())
}

async fn run(state: AppState) -> eyre::Result<()> {
    // Failures here are retried by the daily rollover.
    if let Err(e) = state.evaluate_missed_windows().await {
        tracing::error!(error = %e, "Failed to evaluate windows from missed rollovers.");
    }
    if let Err(e) = state.ensure_next_window().await {
        tracing::error!(error = %e, "Failed to schedule the next submission window.");
    }
    tokio::spawn(state.clone().run_daily_rollover());

    let app = routes::router().layer(cors_layer()).with_state(state);

    let listener = tokio::net::TcpListener::bind(&*env::BIND_ADDRESS)
        .await
        .wrap_err_with(|| format!("can't bind to {}", *env::BIND_ADDRESS))?;
    tracing::info!(address = %*env::BIND_ADDRESS, "Engaged.");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shut down.");
    Ok(())
}

fn cors_layer() -> CorsLayer {
    let origins = if env::CORS_ORIGINS.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            env::CORS_ORIGINS
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler.");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down.");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler.");
                std::future::pending::<()>().await;
            }
        }
        tracing::info!("Received terminate signal, shutting down.");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
