//! `flowmill` entry point.
//!
//! Sub-commands:
//! - `serve`    — start the orchestration service (API + engine + scheduler).
//! - `migrate`  — run pending database migrations and exit.
//! - `validate` — validate a workflow JSON file without touching the server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use nodes::NodeRegistry;
use service::{AppConfig, AppContext};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flowmill", about = "Workflow orchestration service", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server, engine, and scheduler.
    Serve,
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve => serve().await,
        Command::Migrate { database_url } => migrate(database_url).await,
        Command::Validate { path } => validate(&path),
    }
}

async fn serve() {
    let config = AppConfig::from_env();
    info!(port = config.listen_port, database_url = %config.database_url, "starting flowmill");

    let pool = db::pool::create_pool(&config.database_url, config.db_max_connections)
        .await
        .expect("failed to connect to database");
    db::pool::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let registry = Arc::new(NodeRegistry::new());
    nodes::builtin::register_builtins(&registry).expect("failed to register built-in plugins");
    info!(plugins = registry.count(), "built-in plugins registered");

    let ctx = AppContext::initialize(config, pool, registry)
        .expect("failed to initialize application context");

    if let Err(e) = api::serve(Arc::clone(&ctx)).await {
        error!(error = %e, "server exited with an error");
    }
    ctx.shutdown().await;
}

async fn migrate(database_url: Option<String>) {
    let database_url = database_url.unwrap_or_else(|| AppConfig::default().database_url);
    info!(%database_url, "running migrations");
    let pool = db::pool::create_pool(&database_url, 2)
        .await
        .expect("failed to connect to database");
    db::pool::run_migrations(&pool)
        .await
        .expect("migration failed");
    info!("migrations applied");
}

fn validate(path: &PathBuf) {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("cannot read file {}: {e}", path.display()));

    let workflow: engine::models::Workflow =
        serde_json::from_str(&content).unwrap_or_else(|e| panic!("invalid workflow JSON: {e}"));

    if let Err(e) = workflow.validate() {
        eprintln!("validation failed: {e}");
        std::process::exit(1);
    }
    match engine::validate_dag(&workflow) {
        Ok(order) => {
            println!("workflow is valid; execution order: {order:?}");
        }
        Err(e) => {
            eprintln!("validation failed: {e}");
            std::process::exit(1);
        }
    }
}
