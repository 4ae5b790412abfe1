//! resp-kv: a minimal in-memory key-value server
//!
//! Speaks a line-based subset of the Redis protocol over TCP:
//! - `PING`
//! - `SET key value...`
//! - `GET key`
//! - `DEL key [key...]`
//!
//! Configuration comes from CLI arguments or a TOML file.

mod config;
mod protocols;
mod server;
mod storage;

use config::Config;
use server::Server;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storage::Storage;
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        backlog = config.backlog,
        workers = ?config.workers,
        "Starting resp-kv server"
    );

    let runtime = create_runtime(config.workers)?;
    let server = Arc::new(Server::new(config, Storage::new()));

    let shutdown = Arc::clone(&server);
    runtime.spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt, stopping server");
                shutdown.stop().await;
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt signal"),
        }
    });

    runtime.block_on(server.start())?;
    Ok(())
}

fn worker_thread_name() -> String {
    static ATOMIC_ID: AtomicUsize = AtomicUsize::new(0);
    let id = ATOMIC_ID.fetch_add(1, Ordering::SeqCst);
    format!("resp-kv-wrk-{}", id)
}

fn create_runtime(workers: Option<usize>) -> std::io::Result<Runtime> {
    let mut builder = Builder::new_multi_thread();
    builder.thread_name_fn(worker_thread_name).enable_all();
    if let Some(workers) = workers {
        builder.worker_threads(workers);
    }
    builder.build()
}
