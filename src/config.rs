//! Server configuration, parsed from the command line.

use crate::persistence::{PersistenceConfig, DEFAULT_QUEUE_CAPACITY};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// LapseKV - an in-memory key-value server with key expiration
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Host to bind to
    #[arg(long, default_value = crate::DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = crate::DEFAULT_PORT)]
    pub port: u16,

    /// Mirror every mutation to an append-only file and replay it on startup
    #[arg(long)]
    pub aof: bool,

    /// Location of the append-only file
    #[arg(long, default_value = "appendonly.aof")]
    pub aof_path: PathBuf,

    /// Records buffered in memory before new ones are dropped
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub aof_queue: usize,

    /// Milliseconds between passes of the expired-key sweeper
    #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
    pub cleanup_interval_ms: u64,

    /// Default log filter; RUST_LOG takes precedence when set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn persistence(&self) -> PersistenceConfig {
        PersistenceConfig {
            enabled: self.aof,
            filepath: self.aof_path.clone(),
            queue_capacity: self.aof_queue,
        }
    }
}
