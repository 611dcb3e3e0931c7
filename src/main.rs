//! pta-server: a minimal line-oriented file-sharing server
//!
//! Clients connect over TCP and speak a small text protocol:
//! - `CUMP <user>`: authenticate against a static user list
//! - `LIST`: list the served directory
//! - `PEGA <file>`: fetch a whole file
//! - `TERM`: end the session
//!
//! Features:
//! - One task per session, bounded by a configurable session limit
//! - Graceful drain of in-flight sessions on Ctrl-C
//! - Configuration via CLI arguments or TOML file

mod config;
mod error;
mod protocol;
mod server;
mod storage;

use config::Config;
use server::Server;
use storage::{FileCatalog, UserDirectory};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        users_file = %config.users_file.display(),
        files_dir = %config.files_dir.display(),
        max_sessions = config.max_sessions,
        backlog = config.backlog,
        shutdown_timeout = config.shutdown_timeout,
        "Starting pta-server"
    );

    // No server without a user list
    let users = UserDirectory::load(&config.users_file)?;
    if users.is_empty() {
        warn!("User list is empty, every CUMP will be rejected");
    }

    let catalog = FileCatalog::new(&config.files_dir);
    if !catalog.root().is_dir() {
        warn!(files_dir = %catalog.root().display(), "Served directory is not readable yet");
    }

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(Server::new(config, users, catalog).run())?;

    info!("Server stopped");
    Ok(())
}
