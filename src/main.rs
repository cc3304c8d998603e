use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookforge::api::{self, AppState};
use bookforge::breaker::CircuitBreaker;
use bookforge::config::Settings;
use bookforge::db::Database;
use bookforge::engine::Engine;
use bookforge::generation::OpenAiGenerator;
use bookforge::jobs::JobQueue;
use bookforge::ledger::{PriceTable, UsageLedger};
use bookforge::personas::PersonaRegistry;

#[derive(Parser)]
#[command(name = "bookforge")]
#[command(about = "Multi-phase book generation with human validation checkpoints")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and job workers
    Serve {
        /// Port for HTTP API (overrides BOOKFORGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Concurrent job workers (overrides BOOKFORGE_WORKERS)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Apply database migrations and exit
    Migrate,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "bookforge=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(settings: &Settings) -> anyhow::Result<Database> {
    let db = match &settings.db_path {
        Some(path) => Database::open(path.clone())?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

async fn serve(mut settings: Settings, port: Option<u16>, workers: Option<usize>) -> anyhow::Result<()> {
    if let Some(port) = port {
        settings.port = port;
    }
    if let Some(workers) = workers {
        settings.workers = workers.max(1);
    }
    if settings.api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; generation calls will be rejected upstream");
    }

    let db = open_database(&settings)?;
    let generator = OpenAiGenerator::new(settings.openai())?;
    let engine = Engine::new(db, Arc::new(generator), Arc::new(PersonaRegistry::builtin()))
        .with_breaker(Arc::new(CircuitBreaker::new(settings.breaker())))
        .with_ledger(UsageLedger::new(PriceTable::default(), settings.model.clone()))
        .with_call_timeout(settings.call_timeout);

    let queue = JobQueue::start_retaining(engine.clone(), settings.workers, settings.retained_jobs);
    let app = api::create_router(AppState::new(engine, queue));

    tracing::info!("Starting bookforge server on port {}", settings.port);
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", settings.port)).await?;
    tracing::info!("bookforge listening on http://127.0.0.1:{}", settings.port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let settings = Settings::from_env();

    match cli.command {
        Some(Commands::Serve { port, workers }) => serve(settings, port, workers).await?,
        Some(Commands::Migrate) => {
            open_database(&settings)?;
            tracing::info!("Migrations applied");
        }
        None => serve(settings, None, None).await?,
    }

    Ok(())
}
