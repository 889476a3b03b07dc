use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use lab_reservations::api::{self, SecurityConfig};
use lab_reservations::clock::SystemClock;
use lab_reservations::config::ServerConfig;
use lab_reservations::conflict::ConflictChecker;
use lab_reservations::models::{CheckConflictResponse, TimeRange};

#[derive(Parser)]
#[command(name = "labres")]
#[command(about = "Computer laboratory reservations with booking conflict detection")]
struct Cli {
    /// SQLite database file (overrides LAB_RESERVATIONS_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port for HTTP API
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Apply pending database migrations and exit
    Migrate,
    /// Check one laboratory time slot for conflicts
    Check {
        /// Laboratory id
        #[arg(long)]
        lab: Uuid,

        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        /// Start time (HH:MM)
        #[arg(long)]
        start: String,

        /// End time (HH:MM)
        #[arg(long)]
        end: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "lab_reservations=debug,tower_http=debug".into()),
    );

    // stdout stays clean for `check` output
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let db = config.open_database()?;
    let security = SecurityConfig::from_env();
    if security.api_key.is_none() {
        tracing::warn!("LAB_RESERVATIONS_API_KEY is not set, API authentication is disabled");
    }

    let app = api::create_router_with(db, std::sync::Arc::new(SystemClock), security);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Lab reservations server listening on http://{}", address);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = ServerConfig::from_env();
    if let Some(path) = cli.database {
        config.database_path = Some(path);
    }

    match cli.command {
        Some(Commands::Serve { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await?;
        }
        Some(Commands::Migrate) => {
            config.open_database()?;
            tracing::info!("Database schema is up to date");
        }
        Some(Commands::Check {
            lab,
            date,
            start,
            end,
        }) => {
            let db = config.open_database()?;
            let range = TimeRange::parse(&start, &end)?;
            let result = ConflictChecker::new(&db).check_conflicts(lab, date, &range)?;
            let response = CheckConflictResponse::from(result);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        None => serve(config).await?,
    }

    Ok(())
}
