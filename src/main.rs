//! LapseKV - An In-Memory Key-Value Store with Expiring Keys
//!
//! This is the main entry point for the LapseKV server.
//! It restores the append-only file, starts the sweeper, and accepts
//! connections until Ctrl+C.

use anyhow::Context as _;
use clap::Parser;
use lapsekv::commands::CommandHandler;
use lapsekv::config::Config;
use lapsekv::connection::{handle_connection, ConnectionStats};
use lapsekv::persistence::{self, AofWriter, Persistence};
use lapsekv::storage::{Context, KeyValueStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
LapseKV v{} - In-Memory Key-Value Store with Expiring Keys
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        lapsekv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();

    // Set up logging, RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Restore earlier state before anything can write to the file
    let persistence_config = config.persistence();
    let mut store = KeyValueStore::new();
    if persistence_config.enabled {
        let replayed = persistence::replay(&persistence_config.filepath, |m| store.restore(m))
            .with_context(|| {
                format!(
                    "failed to replay {}",
                    persistence_config.filepath.display()
                )
            })?;
        info!(records = replayed, "Append-only file replayed");
    }

    let aof: Option<Arc<AofWriter>> = persistence::open(&persistence_config)
        .await
        .context("failed to open append-only file")?
        .map(Arc::new);
    if let Some(aof) = &aof {
        store = store.with_persistence(Arc::clone(aof) as Arc<dyn Persistence>);
    }
    let store = Arc::new(store);

    // Start the background expiry sweeper
    store.start_cleanup(config.cleanup_interval())?;

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", config.bind_address());

    print_banner(&config);

    // Cancelled on shutdown; every connection works under a child of it
    let root = Context::background();

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&store), Arc::clone(&stats), root.clone()) => {}
        _ = shutdown_signal() => {}
    }

    root.cancel();
    if let Err(e) = store.stop_cleanup() {
        warn!(error = %e, "Sweeper was not running at shutdown");
    }
    if let Some(aof) = &aof {
        aof.shutdown().await;
        info!(dropped = aof.dropped(), "Append-only file flushed");
    }

    let totals = stats.snapshot();
    info!(
        connections = totals.accepted,
        commands = totals.commands,
        rejected = totals.rejected,
        expired = store.expired_count(),
        "Server shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping server..."),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, stopping server..."),
    }
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    store: Arc<KeyValueStore>,
    stats: Arc<ConnectionStats>,
    root: Context,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                // Create a command handler for this connection
                let handler = CommandHandler::new(Arc::clone(&store));
                let stats = Arc::clone(&stats);
                let ctx = root.child();

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, ctx, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
