//! foodtruckd — the food truck API daemon.
//!
//! Resolves settings, makes sure the database and its views exist, then
//! serves the REST API until Ctrl-C or SIGTERM.
//!
//! # Usage
//!
//! ```text
//! foodtruckd serve --port 8080 --db-host localhost
//! foodtruckd provision --config /etc/foodtruck.toml
//! foodtruckd reset --yes
//! ```

mod settings;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use foodtruck_backend::{CouchBackend, FoodTruckBackend, SchemaStatus, ensure_schema};
use foodtruck_store::{CouchClient, DocumentStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use settings::{DatabaseArgs, Settings};

const DEFAULT_LOG_FILTER: &str = "info,foodtruckd=debug,foodtruck=debug";

#[derive(Parser)]
#[command(name = "foodtruckd", about = "Food truck API daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Provision the database if needed and serve the REST API.
    Serve {
        /// HTTP port to listen on.
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Create the database and its views if the database is missing.
    Provision {
        #[command(flatten)]
        db: DatabaseArgs,
    },

    /// Delete every truck and review in the database.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,

        #[command(flatten)]
        db: DatabaseArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let vcap = std::env::var("VCAP_SERVICES").ok();

    match cli.command {
        Command::Serve { port, db } => {
            let settings = Settings::load(&db, port, vcap.as_deref())?;
            serve(settings).await
        }
        Command::Provision { db } => {
            let settings = Settings::load(&db, None, vcap.as_deref())?;
            provision(settings).await
        }
        Command::Reset { yes, db } => {
            if !yes {
                anyhow::bail!("reset deletes every document; pass --yes to confirm");
            }
            let settings = Settings::load(&db, None, vcap.as_deref())?;
            reset(settings).await
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn connect(settings: &Settings) -> anyhow::Result<CouchClient> {
    let client = CouchClient::new(&settings.database)?;
    info!(
        server = %settings.database.server_url(),
        database = client.database_name(),
        "database client ready"
    );
    Ok(client)
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    info!("food truck daemon starting");

    let client = connect(&settings)?;

    // Provisioning failures are logged; the server starts regardless.
    match ensure_schema(&client).await {
        Ok(status) => info!(?status, "schema ready"),
        Err(e) => error!(error = %e, "schema provisioning failed; continuing"),
    }

    let backend: Arc<dyn FoodTruckBackend> = Arc::new(CouchBackend::new(
        client,
        settings.database.request_timeout,
    ));
    let router = foodtruck_api::build_router(backend);
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http_port));

    info!(%addr, "API server starting");
    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("food truck daemon stopped");
    Ok(())
}

async fn provision(settings: Settings) -> anyhow::Result<()> {
    let client = connect(&settings)?;
    match ensure_schema(&client).await? {
        SchemaStatus::Created => info!(database = client.database_name(), "database and views created"),
        SchemaStatus::Existing => info!(
            database = client.database_name(),
            "database already exists; views left unchanged"
        ),
    }
    Ok(())
}

async fn reset(settings: Settings) -> anyhow::Result<()> {
    let backend = CouchBackend::new(connect(&settings)?, settings.database.request_timeout);
    let (trucks, reviews) = (backend.count_trucks().await?, backend.count_reviews().await?);
    warn!(trucks, reviews, database = backend.store().database_name(), "deleting all documents");
    backend.clear_all().await?;
    info!("database cleared");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C, shutting down"),
            Err(e) => {
                error!(error = %e, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received SIGTERM, shutting down");
            }
            Err(e) => {
                error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
