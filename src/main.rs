//! RiftDB - A Sharded In-Memory Key-Value Database
//!
//! This is the main entry point for the RiftDB server.
//! It sets up the engine (shard tasks and worker admission), the TCP
//! listener, and handles incoming connections.

use riftdb::config::Config;
use riftdb::connection::{handle_connection, ConnectionStats};
use riftdb::engine::Engine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

fn print_banner(config: &Config) {
    println!(
        r#"

        ██████╗ ██╗███████╗████████╗██████╗ ██████╗
        ██╔══██╗██║██╔════╝╚══██╔══╝██╔══██╗██╔══██╗
        ██████╔╝██║█████╗     ██║   ██║  ██║██████╔╝
        ██╔══██╗██║██╔══╝     ██║   ██║  ██║██╔══██╗
        ██║  ██║██║██║        ██║   ██████╔╝██████╔╝
        ╚═╝  ╚═╝╚═╝╚═╝        ╚═╝   ╚═════╝ ╚═════╝

RiftDB v{} - Sharded In-Memory Key-Value Database
──────────────────────────────────────────────────────────────
Server started on {}
{} shards, up to {} clients.

Use Ctrl+C to shutdown gracefully.
"#,
        riftdb::VERSION,
        config.bind_address(),
        config.shard_count,
        config.max_clients,
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Spin up the engine: shard tasks, stores, expiry sweeps
    let engine = Arc::new(Engine::new(&config)?);

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&engine), stats) => {}
        _ = shutdown => {}
    }

    engine.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, engine: Arc<Engine>, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let engine = Arc::clone(&engine);
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, engine, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
