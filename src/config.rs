//! Runtime configuration for the tracker service.
//!
//! Values come from CLI flags or the environment (see `main.rs`); these
//! structs carry them with sensible defaults for tests and embedding.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::eta::EtaConfig;
use crate::feed::FeedConfig;
use crate::hub::DEFAULT_QUEUE_CAPACITY;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// `*` allows any origin.
    pub cors_origin: String,
    pub gtfs_dir: PathBuf,
    /// Undelivered updates a live subscriber may queue before it is dropped.
    pub subscriber_queue: usize,
    pub eta: EtaConfig,
    pub feed: Option<FeedConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
            cors_origin: String::from("*"),
            gtfs_dir: PathBuf::from("data/gtfs"),
            subscriber_queue: DEFAULT_QUEUE_CAPACITY,
            eta: EtaConfig::default(),
            feed: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}
