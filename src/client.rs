//! Line-protocol chat client
//!
//! A thin client over the server's wire protocol: it performs the handshake,
//! frames outbound commands, and yields raw server lines one at a time. The
//! integration tests drive the server through this type; it carries no
//! presentation logic.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::io::Lines;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::info;

use crate::error::{ChatError, Result};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:1111".parse().unwrap(),
            connect_timeout_secs: 10,
        }
    }
}

/// Connected line-protocol chat client
pub struct ChatClient {
    identity: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl ChatClient {
    /// Connect and register under `identity`, starting in the lobby
    pub async fn connect(config: &ChatClientConfig, identity: &str) -> Result<Self> {
        Self::connect_scoped(config, identity, None).await
    }

    /// Connect and register under `identity`, joining `group` immediately
    pub async fn connect_in_group(
        config: &ChatClientConfig,
        identity: &str,
        group: &str,
    ) -> Result<Self> {
        Self::connect_scoped(config, identity, Some(group)).await
    }

    async fn connect_scoped(
        config: &ChatClientConfig,
        identity: &str,
        group: Option<&str>,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            TcpStream::connect(config.server_addr),
        )
        .await
        .map_err(|_| ChatError::transport("Connection timeout"))??;

        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            identity: identity.to_string(),
            lines: BufReader::new(read_half).lines(),
            writer: BufWriter::new(write_half),
        };

        let handshake = match group {
            Some(group) => format!("{}|{}", identity, group),
            None => identity.to_string(),
        };
        client.send_line(&handshake).await?;
        info!("Connected to {} as '{}'", config.server_addr, identity);
        Ok(client)
    }

    /// The identity this client registered under
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Send one raw protocol line
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Chat routed per the current scope
    pub async fn chat(&mut self, text: &str) -> Result<()> {
        self.send_line(&format!("ALL||{}", text)).await
    }

    /// Broadcast to every connected identity
    pub async fn global(&mut self, text: &str) -> Result<()> {
        self.send_line(&format!("ALL||[GLOBAL] {}", text)).await
    }

    /// Private message to a single identity
    pub async fn private(&mut self, to: &str, text: &str) -> Result<()> {
        self.send_line(&format!("PRIVATE|{}|{}", to, text)).await
    }

    /// Message to the members of a named group
    pub async fn group(&mut self, group: &str, text: &str) -> Result<()> {
        self.send_line(&format!("GROUP|{}|{}", group, text)).await
    }

    /// Join a named group
    pub async fn join(&mut self, group: &str) -> Result<()> {
        self.send_line(&format!("JOIN|{}|", group)).await
    }

    /// Leave a named group
    pub async fn leave(&mut self, group: &str) -> Result<()> {
        self.send_line(&format!("LEAVE|{}|", group)).await
    }

    /// Explicit disconnect
    pub async fn quit(&mut self) -> Result<()> {
        self.send_line("QUIT||").await
    }

    /// Next server line, or `None` once the server closed the connection
    pub async fn recv(&mut self) -> Result<Option<String>> {
        Ok(self.lines.next_line().await?)
    }
}
