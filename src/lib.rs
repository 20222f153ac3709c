//! Line-protocol chat routing server
//!
//! This library provides a TCP chat server that routes line-delimited text
//! messages between connected identities. Each connection lives in a "scope"
//! (the open lobby or one named group); the server tracks identities and
//! group memberships in a shared directory and routes every message to the
//! correct recipient set (lobby, group, global, or private).

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{ChatClient, ChatClientConfig};
pub use error::{ChatError, Result};
pub use server::ChatServer;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a unique session ID, used to tag log lines for connections
/// that have not completed the handshake yet
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Chat server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Server listen address
    pub bind_addr: std::net::SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Capacity of each session's outbound queue; lines beyond this are
    /// dropped rather than blocking the routing path
    pub outbound_queue: usize,
    /// Maximum inbound line length in bytes
    pub max_line_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:1111".parse().unwrap(),
            max_connections: 1000,
            outbound_queue: 256,
            max_line_len: 8 * 1024,
        }
    }
}
