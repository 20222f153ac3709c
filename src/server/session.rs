//! Per-connection session: handshake, command dispatch, teardown
//!
//! Each accepted connection runs one session task. The session owns the
//! connection's read half and a writer task draining the bounded outbound
//! queue; the directory and router only ever hold the queue's sender. The
//! lifecycle is a straight-line state machine:
//! `Handshaking -> Active(scope) -> Closed`, with `Closed` entered exactly
//! once via read failure, write failure, or an explicit `QUIT`.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::protocol::{self, wire, Command};
use crate::server::directory::{Directory, PeerHandle, Scope};
use crate::server::router::Router;
use crate::{current_timestamp, generate_session_id, ServerConfig};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Waiting for the handshake line
    Handshaking,
    /// Registered in the directory, processing commands
    Active,
    /// Torn down; terminal
    Closed,
}

/// One live connection
pub struct Session {
    session_id: String,
    addr: SocketAddr,
    directory: Arc<Directory>,
    router: Router,
    config: ServerConfig,
}

impl Session {
    pub fn new(
        addr: SocketAddr,
        directory: Arc<Directory>,
        router: Router,
        config: ServerConfig,
    ) -> Self {
        Self {
            session_id: generate_session_id(),
            addr,
            directory,
            router,
            config,
        }
    }

    /// Drive the session to completion. Never returns an error to the accept
    /// loop: every failure is local to this connection.
    pub async fn run(self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel::<String>(self.config.outbound_queue);
        let mut writer = spawn_writer(write_half, rx);
        let mut writer_done = false;
        let mut lines = LineReader::new(read_half, self.config.max_line_len);
        let mut state = SessionState::Handshaking;
        debug!(
            "Session {} from {} in state {:?}",
            self.session_id, self.addr, state
        );

        // Handshake: first line is the identity, optionally `identity|group`.
        // An oversized handshake line is as unusable as an empty one.
        let handshake = match lines.next_line().await {
            Ok(ReadLine::Line(line)) => protocol::parse_handshake(&line),
            Ok(ReadLine::Oversized) => None,
            Ok(ReadLine::Eof) | Err(_) => {
                debug!("Session {} closed before handshake", self.session_id);
                return;
            }
        };
        let Some(handshake) = handshake else {
            // Empty or unusable identity: close without registering; no
            // other session ever learns this connection existed
            debug!(
                "Session {} from {} sent an invalid handshake, closing",
                self.session_id, self.addr
            );
            return;
        };
        let identity = handshake.identity;
        let scope = handshake
            .group
            .map(Scope::Group)
            .unwrap_or(Scope::Lobby);

        let handle = PeerHandle {
            identity: identity.clone(),
            scope: scope.clone(),
            outbound: tx.clone(),
            addr: self.addr,
            connected_at: current_timestamp(),
        };
        if let Err(err) = self.directory.register(handle).await {
            // Duplicate identity or connection cap: the refusal closes the
            // new connection only, with no peer-visible side effects
            info!("Refusing '{}' from {}: {}", identity, self.addr, err);
            let _ = tx.try_send(wire::error(&err));
            drop(tx);
            let _ = writer.await;
            return;
        }

        state = SessionState::Active;
        debug!(
            "Session {} ('{}') entered state {:?}",
            self.session_id, identity, state
        );
        info!("'{}' connected from {} into {}", identity, self.addr, scope);
        self.router
            .notify_scope(&scope, &identity, &wire::joined(&identity))
            .await;
        self.router.push_user_lists(&scope).await;

        loop {
            tokio::select! {
                read = lines.next_line() => match read {
                    Ok(ReadLine::Line(line)) => {
                        if !self.handle_line(&identity, &line).await {
                            break;
                        }
                    }
                    Ok(ReadLine::Oversized) => {
                        // Reported to the sender only; the connection
                        // stays open
                        let err = ChatError::malformed_command("line too long");
                        self.router.notify(&identity, wire::error(&err)).await;
                    }
                    Ok(ReadLine::Eof) => break,
                    Err(e) => {
                        debug!("Read failure for '{}': {}", identity, e);
                        break;
                    }
                },
                _ = &mut writer, if !writer_done => {
                    debug!("Writer for '{}' ended, tearing down", identity);
                    writer_done = true;
                    break;
                }
            }
        }

        // Terminal transition, taken exactly once whichever event ended the
        // loop. Unregister first so no further line is routed here, then
        // tell the peers who could see this session.
        state = SessionState::Closed;
        debug!(
            "Session {} ('{}') entered state {:?}",
            self.session_id, identity, state
        );
        if let Some(removed) = self.directory.unregister(&identity).await {
            self.router
                .notify_scope(&removed.scope, &identity, &wire::left(&identity))
                .await;
            self.router.push_user_lists(&removed.scope).await;
        }
        info!("'{}' disconnected", identity);

        drop(tx);
        if !writer_done {
            let _ = writer.await;
        }
    }

    /// Classify and dispatch one inbound line. Returns `false` when the
    /// session should close (explicit disconnect). An empty line is an
    /// empty chat message, routed per scope like any other untagged text.
    async fn handle_line(&self, identity: &str, line: &str) -> bool {
        let command = match protocol::parse_command(line) {
            Ok(command) => command,
            Err(err) => {
                // Reported to the offending sender only; the connection
                // stays open
                self.router.notify(identity, wire::error(&err)).await;
                return true;
            }
        };

        match command {
            Command::Chat(text) => {
                self.router.send_scoped(identity, &text).await;
            }
            Command::Global(text) => {
                self.router.send_global(identity, &text).await;
            }
            Command::Group { group, text } => {
                self.router.send_group(identity, &group, &text).await;
            }
            Command::Private { to, text } => {
                self.router.send_private(identity, &to, &text).await;
            }
            Command::Join(group) => {
                self.join_group(identity, &group).await;
            }
            Command::Leave(group) => {
                self.leave_group(identity, &group).await;
            }
            Command::Quit => return false,
        }
        true
    }

    /// Move into a group; visible-peer lists are recomputed for both the
    /// old and the new scope's members
    async fn join_group(&self, identity: &str, group: &str) {
        let new_scope = Scope::Group(group.to_string());
        let Some(old_scope) = self
            .directory
            .set_scope(identity, new_scope.clone())
            .await
        else {
            // Already in this group: idempotent, no notice
            return;
        };
        debug!("'{}' moved from {} to {}", identity, old_scope, new_scope);
        self.router
            .notify(identity, wire::info(&format!("joined group: {}", group)))
            .await;
        self.router.push_user_lists(&old_scope).await;
        self.router.push_user_lists(&new_scope).await;
    }

    /// Leave a group back to the lobby. Leaving a group the session is not
    /// in is a no-op with no membership change and no notice.
    async fn leave_group(&self, identity: &str, group: &str) {
        let current = self.directory.scope_of(identity).await;
        if current.as_ref().and_then(|s| s.group_name()) != Some(group) {
            return;
        }
        let Some(old_scope) = self.directory.set_scope(identity, Scope::Lobby).await else {
            return;
        };
        self.router
            .notify(identity, wire::info(&format!("left group: {}", group)))
            .await;
        self.router.push_user_lists(&old_scope).await;
        self.router.push_user_lists(&Scope::Lobby).await;
    }
}

/// One framing step of the inbound line reader
#[derive(Debug, PartialEq, Eq)]
enum ReadLine {
    /// A complete line, newline stripped
    Line(String),
    /// The line exceeded the length cap; its contents were discarded
    Oversized,
    /// The peer closed the connection
    Eof,
}

/// Capped line framing over the connection's read half.
///
/// `AsyncBufReadExt::lines` accumulates until it sees a newline, so a peer
/// streaming bytes with no newline would grow that buffer without limit.
/// This reader enforces the cap at read time: once a line passes `max_len`
/// its bytes are discarded up to the newline and the line is reported as
/// [`ReadLine::Oversized`] instead of buffered.
struct LineReader<R> {
    reader: BufReader<R>,
    max_len: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R, max_len: usize) -> Self {
        Self {
            reader: BufReader::new(inner),
            max_len,
        }
    }

    async fn next_line(&mut self) -> std::io::Result<ReadLine> {
        let mut buf: Vec<u8> = Vec::new();
        let mut oversized = false;
        loop {
            let (consumed, complete) = {
                let chunk = self.reader.fill_buf().await?;
                if chunk.is_empty() {
                    // EOF: a trailing line without a newline still counts
                    return Ok(if oversized {
                        ReadLine::Oversized
                    } else if buf.is_empty() {
                        ReadLine::Eof
                    } else {
                        ReadLine::Line(Self::finish(buf))
                    });
                }
                match chunk.iter().position(|&b| b == b'\n') {
                    Some(newline) => {
                        if !oversized && buf.len() + newline <= self.max_len {
                            buf.extend_from_slice(&chunk[..newline]);
                        } else {
                            oversized = true;
                        }
                        (newline + 1, true)
                    }
                    None => {
                        let len = chunk.len();
                        if !oversized && buf.len() + len <= self.max_len {
                            buf.extend_from_slice(chunk);
                        } else {
                            oversized = true;
                            buf.clear();
                        }
                        (len, false)
                    }
                }
            };
            self.reader.consume(consumed);
            if complete {
                return Ok(if oversized {
                    ReadLine::Oversized
                } else {
                    ReadLine::Line(Self::finish(buf))
                });
            }
        }
    }

    fn finish(mut buf: Vec<u8>) -> String {
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Writer task: drains the outbound queue onto the socket, one line per
/// message. Exits on the first write failure or when every sender is gone;
/// either way the session's select loop observes it and tears down.
fn spawn_writer(
    write_half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut writer = BufWriter::new(write_half);
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                return;
            }
            if writer.write_all(b"\n").await.is_err() {
                return;
            }
            if writer.flush().await.is_err() {
                return;
            }
        }
        let _ = writer.flush().await;
    })
}
