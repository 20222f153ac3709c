//! Recipient-set computation and delivery
//!
//! The router turns a sender, a routing mode and a message into a set of
//! outbound sinks, then delivers to each sink independently. Recipient
//! snapshots come from the directory under its lock; delivery happens after
//! the lock is released, against cloned bounded senders, so a slow recipient
//! never stalls registry mutations. A failed delivery to one recipient never
//! aborts delivery to the others.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::protocol::wire;
use crate::server::directory::{Directory, Scope};

/// Routes messages to recipient sets computed from the directory
#[derive(Clone)]
pub struct Router {
    directory: Arc<Directory>,
}

impl Router {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }

    /// Fire-and-forget delivery of one line to one sink.
    ///
    /// A full queue drops the line (the bounded-queue overflow policy); a
    /// closed queue means the session is concurrently shutting down. Neither
    /// is an error of the send operation as a whole.
    fn deliver(sink: &mpsc::Sender<String>, line: String) {
        match sink.try_send(line) {
            Ok(()) => {}
            Err(TrySendError::Full(line)) => {
                warn!("Outbound queue full, dropping line: {}", line);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Recipient closed while delivering, skipping");
            }
        }
    }

    fn deliver_all(sinks: &[mpsc::Sender<String>], line: &str) {
        for sink in sinks {
            Self::deliver(sink, line.to_string());
        }
    }

    /// Send one line directly to a single identity, if still connected
    pub async fn notify(&self, identity: &str, line: String) {
        if let Some(sink) = self.directory.sink_of(identity).await {
            Self::deliver(&sink, line);
        }
    }

    /// Chat routed per the sender's current scope: lobby chat reaches all
    /// other lobby sessions, group chat all other members of that group
    pub async fn send_scoped(&self, sender: &str, text: &str) {
        let Some(scope) = self.directory.scope_of(sender).await else {
            return;
        };
        let sinks = self.directory.sinks_in_scope(&scope, Some(sender)).await;
        Self::deliver_all(&sinks, &wire::scoped_chat(sender, text));
    }

    /// Send to the members of a named group.
    ///
    /// The sender need not be a member; a member sender receives the
    /// distinct self-confirmation variant. A group with no members is an
    /// empty-delivery signal reported to the sender only, not an error.
    pub async fn send_group(&self, sender: &str, group: &str, text: &str) {
        let roster = self.directory.group_roster(group).await;
        if roster.is_empty() {
            self.notify(sender, wire::no_members(group)).await;
            return;
        }
        for (identity, sink) in &roster {
            if identity == sender {
                Self::deliver(sink, wire::group_echo(group, text));
            } else {
                Self::deliver(sink, wire::group_chat(sender, group, text));
            }
        }
    }

    /// Broadcast to every connected identity except the sender, bypassing
    /// scope filtering
    pub async fn send_global(&self, sender: &str, text: &str) {
        let sinks = self.directory.all_sinks_except(sender).await;
        Self::deliver_all(&sinks, &wire::global_chat(sender, text));
    }

    /// Send to a single target identity; an unknown target is reported back
    /// to the sender, never silently dropped
    pub async fn send_private(&self, sender: &str, to: &str, text: &str) {
        match self.directory.sink_of(to).await {
            Some(sink) => Self::deliver(&sink, wire::private_chat(sender, text)),
            None => {
                self.notify(sender, wire::error(&ChatError::unknown_target(to)))
                    .await;
            }
        }
    }

    /// Push a notice to every member of a scope except one identity
    pub async fn notify_scope(&self, scope: &Scope, exclude: &str, line: &str) {
        let sinks = self.directory.sinks_in_scope(scope, Some(exclude)).await;
        Self::deliver_all(&sinks, line);
    }

    /// Push an updated `USERS|` visible-peer snapshot to every member of a
    /// scope. Called after every connect, disconnect, join and leave, for
    /// each scope whose member set changed.
    pub async fn push_user_lists(&self, scope: &Scope) {
        for (sink, visible) in self.directory.visibility_updates(scope).await {
            Self::deliver(&sink, wire::user_list(&visible));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current_timestamp;
    use crate::server::directory::PeerHandle;
    use tokio::sync::mpsc::Receiver;

    async fn connect(
        directory: &Directory,
        identity: &str,
        scope: Scope,
    ) -> Receiver<String> {
        let (tx, rx) = mpsc::channel(8);
        directory
            .register(PeerHandle {
                identity: identity.to_string(),
                scope,
                outbound: tx,
                addr: "127.0.0.1:9999".parse().unwrap(),
                connected_at: current_timestamp(),
            })
            .await
            .unwrap();
        rx
    }

    fn group(name: &str) -> Scope {
        Scope::Group(name.to_string())
    }

    fn drain(rx: &mut Receiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    #[tokio::test]
    async fn test_lobby_send_excludes_sender_and_groups() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", Scope::Lobby).await;
        let mut bob = connect(&directory, "bob", Scope::Lobby).await;
        let mut carol = connect(&directory, "carol", group("g1")).await;

        router.send_scoped("alice", "hi").await;

        assert_eq!(drain(&mut bob), vec!["[alice]: hi"]);
        assert!(drain(&mut alice).is_empty());
        assert!(drain(&mut carol).is_empty());
    }

    #[tokio::test]
    async fn test_group_send_echoes_to_member_sender() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", group("g1")).await;
        let mut bob = connect(&directory, "bob", group("g1")).await;
        let mut carol = connect(&directory, "carol", Scope::Lobby).await;

        router.send_group("alice", "g1", "hi").await;

        assert_eq!(drain(&mut bob), vec!["[alice -> g1]: hi"]);
        assert_eq!(drain(&mut alice), vec!["[you -> g1]: hi"]);
        assert!(drain(&mut carol).is_empty());
    }

    #[tokio::test]
    async fn test_group_send_from_non_member_gets_no_echo() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", Scope::Lobby).await;
        let mut bob = connect(&directory, "bob", group("g1")).await;

        router.send_group("alice", "g1", "knock").await;

        assert_eq!(drain(&mut bob), vec!["[alice -> g1]: knock"]);
        assert!(drain(&mut alice).is_empty());
    }

    #[tokio::test]
    async fn test_group_send_to_empty_group_notices_sender_only() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", Scope::Lobby).await;
        let mut bob = connect(&directory, "bob", Scope::Lobby).await;

        router.send_group("alice", "ghosts", "anyone?").await;

        assert_eq!(
            drain(&mut alice),
            vec!["[info] Group has no members: ghosts"]
        );
        assert!(drain(&mut bob).is_empty());
    }

    #[tokio::test]
    async fn test_global_send_reaches_everyone_but_sender() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", Scope::Lobby).await;
        let mut bob = connect(&directory, "bob", group("g1")).await;
        let mut carol = connect(&directory, "carol", group("g2")).await;

        router.send_global("alice", "fire drill").await;

        let expected = "[global] [alice]: fire drill";
        assert_eq!(drain(&mut bob), vec![expected]);
        assert_eq!(drain(&mut carol), vec![expected]);
        assert!(drain(&mut alice).is_empty());
    }

    #[tokio::test]
    async fn test_private_send_reaches_exactly_the_target() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", Scope::Lobby).await;
        let mut bob = connect(&directory, "bob", group("g1")).await;
        let mut carol = connect(&directory, "carol", Scope::Lobby).await;

        router.send_private("alice", "bob", "psst").await;

        assert_eq!(drain(&mut bob), vec!["[from alice]: psst"]);
        assert!(drain(&mut alice).is_empty());
        assert!(drain(&mut carol).is_empty());
    }

    #[tokio::test]
    async fn test_private_send_to_unknown_target_notices_sender() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut dave = connect(&directory, "dave", Scope::Lobby).await;

        router.send_private("dave", "eve", "hello?").await;

        assert_eq!(drain(&mut dave), vec!["[error] Unknown target: eve"]);
    }

    #[tokio::test]
    async fn test_user_list_push_reflects_scope() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", group("g1")).await;
        let mut bob = connect(&directory, "bob", group("g1")).await;
        let mut carol = connect(&directory, "carol", Scope::Lobby).await;

        router.push_user_lists(&group("g1")).await;

        assert_eq!(drain(&mut alice), vec!["USERS|bob"]);
        assert_eq!(drain(&mut bob), vec!["USERS|alice"]);
        assert!(drain(&mut carol).is_empty());
    }

    #[tokio::test]
    async fn test_no_delivery_after_unregister() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let mut alice = connect(&directory, "alice", Scope::Lobby).await;
        let mut bob = connect(&directory, "bob", Scope::Lobby).await;

        directory.unregister("bob").await;
        router.send_scoped("alice", "anyone?").await;
        router.send_private("alice", "bob", "you there?").await;

        assert!(drain(&mut bob).is_empty());
        // The private send reports the departed target back to the sender
        assert_eq!(drain(&mut alice), vec!["[error] Unknown target: bob"]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_failing_others() {
        let directory = Arc::new(Directory::new());
        let router = Router::new(Arc::clone(&directory));

        let (tx, mut slow_rx) = mpsc::channel(1);
        directory
            .register(PeerHandle {
                identity: "slow".to_string(),
                scope: Scope::Lobby,
                outbound: tx,
                addr: "127.0.0.1:9999".parse().unwrap(),
                connected_at: current_timestamp(),
            })
            .await
            .unwrap();
        let mut bob = connect(&directory, "bob", Scope::Lobby).await;

        router.send_scoped("bob", "one").await;
        router.send_scoped("bob", "two").await;

        // The slow reader kept only the first line; bob's other peers (none
        // here) and the registry are unaffected
        assert_eq!(drain(&mut slow_rx), vec!["[bob]: one"]);
        assert!(drain(&mut bob).is_empty());
    }
}
