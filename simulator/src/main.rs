//! Seat reservation simulator.
//!
//! Loads `.env`, configures tracing and dispatches the subcommand.

use clap::Parser;
use seat_arbiter_postgres::PostgresInventoryStore;
use seat_arbiter_runtime::metrics::MetricsServer;
use seat_arbiter_simulator::{Cli, Command, Config, commands};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,seat_arbiter=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(url) = cli.database_url.clone() {
        config.postgres.url = url;
    }
    config.validate()?;
    tracing::debug!(
        max_connections = config.postgres.max_connections,
        max_attempts = config.simulation.max_attempts,
        "Configuration loaded"
    );

    let _metrics = if config.metrics.enabled {
        let mut server = MetricsServer::new(config.metrics_addr()?);
        server.start()?;
        Some(server)
    } else {
        None
    };

    if let Command::Report(args) = &cli.command {
        return commands::report(&config, args);
    }

    let store = match PostgresInventoryStore::connect_with(&config.pool_settings()).await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("Connection failed: {err}");
            commands::print_connection_hints(&config);
            return Err(err.into());
        }
    };

    match &cli.command {
        Command::Check => commands::check(&store, &config).await,
        Command::Setup(args) => {
            store.migrate().await?;
            commands::setup(&store, args).await
        }
        Command::Events { id } => commands::events(&store, *id).await,
        Command::Run(args) => {
            store.migrate().await?;
            commands::run(Arc::clone(&store), &config, args).await
        }
        Command::Sweep(args) => {
            store.migrate().await?;
            commands::sweep(Arc::clone(&store), &config, args).await
        }
        Command::Report(args) => commands::report(&config, args),
    }
}
