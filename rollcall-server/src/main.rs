//! rollcall - faculty attendance server
//!
//! Serves the JSON API over SQLite (or an in-memory store with `--memory`)
//! and offers a `create-user` command for provisioning instructors.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall_common::config::{
    ConfigSource, RootFolderInitializer, RootFolderResolver, StorageBackend, TomlConfig,
};
use rollcall_common::db::init_database;
use rollcall_common::models::{NewUser, DEFAULT_LANGUAGE};
use rollcall_common::time;
use rollcall_server::seed::seed_demo_data;
use rollcall_server::storage::{MemStorage, SqliteStorage, Storage};
use rollcall_server::{build_router, AppState, ServerOptions};

const SESSION_SWEEP_SECS: u64 = 15 * 60;

#[derive(Parser, Debug)]
#[command(name = "rollcall")]
#[command(about = "Faculty attendance server")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Data folder holding rollcall.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "ROLLCALL_PORT")]
    port: Option<u16>,

    /// Keep everything in memory; nothing survives a restart
    #[arg(long)]
    memory: bool,

    /// Load the demo dataset if it is not already present
    #[arg(long)]
    seed: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create an instructor account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        language: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    // Config is read first so its log level can seed the filter
    let source = ConfigSource::locate(args.config.as_deref());
    let config = source.load();
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "rollcall={level},rollcall_server={level},rollcall_common={level},tower_http={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting rollcall v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    source.log();

    let config = config.context("Failed to load configuration")?;
    let storage = open_storage(&args, &config).await?;
    let options = ServerOptions::from_config(&config);

    match args.command.take() {
        Some(Command::CreateUser {
            username,
            password,
            name,
            department,
            language,
        }) => {
            let user = NewUser {
                username,
                password_hash: options.hasher.hash(&password)?,
                name,
                department,
                profile_image: None,
                language,
            }
            .normalized()?;
            let created = storage
                .create_user(user)
                .await
                .context("Failed to create user")?;
            info!("Created user '{}' (id {})", created.username, created.id);
            Ok(())
        }
        Some(Command::Serve) | None => serve(&args, &config, storage, options).await,
    }
}

async fn open_storage(args: &Args, config: &TomlConfig) -> Result<Arc<dyn Storage>> {
    if args.memory || config.database.backend == StorageBackend::Memory {
        warn!("Using in-memory storage; data is lost on shutdown");
        return Ok(Arc::new(MemStorage::new()));
    }

    let root_folder = RootFolderResolver::new()
        .with_cli_arg(args.root_folder.clone())
        .with_config(config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };
    Ok(Arc::new(SqliteStorage::new(pool)))
}

async fn serve(
    args: &Args,
    config: &TomlConfig,
    storage: Arc<dyn Storage>,
    options: ServerOptions,
) -> Result<()> {
    if args.seed || config.seed_demo_data {
        seed_demo_data(storage.as_ref(), &options.hasher, time::now()).await?;
    }

    let state = AppState::new(storage, options);
    info!(
        "Verification policy: {}, face image limit {} bytes",
        state.verifier.policy_name(),
        state.upload_limit
    );

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(SESSION_SWEEP_SECS));
        loop {
            ticker.tick().await;
            let purged = sessions.purge_expired().await;
            if purged > 0 {
                info!("Purged {} expired sessions", purged);
            }
        }
    });

    let app = build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", config.server.host, port)
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("rollcall listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
