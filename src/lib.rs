pub mod bot;
pub mod config;
pub mod error;
pub mod health;
pub mod indexer;
pub mod models;
pub mod openai;
pub mod rag;
pub mod session;
pub mod telegram;

use tracing_subscriber::EnvFilter;

/// Logs to stdout at `info` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
