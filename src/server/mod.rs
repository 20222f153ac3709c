//! TCP chat server: accept loop and process-wide state
//!
//! The server owns the listener and the shared directory; every accepted
//! connection gets its own [`Session`] task. A failed accept never stops the
//! loop, and no session failure is fatal to the process.

pub mod directory;
pub mod router;
pub mod session;

pub use directory::{Directory, PeerHandle, Scope};
pub use router::Router;
pub use session::Session;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::error::{ChatError, Result};
use crate::ServerConfig;

/// Line-protocol chat server
pub struct ChatServer {
    config: ServerConfig,
    directory: Arc<Directory>,
    listener: Option<TcpListener>,
}

impl ChatServer {
    /// Create a new chat server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        let directory = Arc::new(Directory::with_limit(config.max_connections));
        Self {
            config,
            directory,
            listener: None,
        }
    }

    /// Bind the listener without accepting yet. Returns the bound address,
    /// which differs from the configured one when port 0 was requested.
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ChatError::config(format!("Failed to bind {}: {}", self.config.bind_addr, e))
            })?;
        let addr = listener.local_addr()?;
        info!("Chat server listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Bind (if not already bound) and run the accept loop until the
    /// process terminates
    pub async fn start(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        self.run().await
    }

    /// Accept connections indefinitely, spawning one session per connection
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| ChatError::config("run() called before bind()"))?;

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let session = Session::new(
                        addr,
                        Arc::clone(&self.directory),
                        Router::new(Arc::clone(&self.directory)),
                        self.config.clone(),
                    );
                    tokio::spawn(session.run(stream));
                }
                Err(e) => {
                    // Transient accept failures must not stop the loop
                    warn!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Number of registered sessions
    pub async fn connected(&self) -> usize {
        self.directory.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let mut server = ChatServer::new(config);

        assert_eq!(server.connected().await, 0);
        let addr = server.bind().await.unwrap();
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn test_run_before_bind_is_a_config_error() {
        let mut server = ChatServer::new(ServerConfig::default());
        let err = server.run().await.unwrap_err();
        assert!(matches!(err, ChatError::Config(_)));
    }
}
