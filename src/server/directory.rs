//! Identity and group registry
//!
//! The directory is the single source of truth for routing decisions: it maps
//! each connected identity to its session handle and current scope, and each
//! group name to its member set. All multi-step mutations happen under one
//! write-lock acquisition so concurrent readers never observe a half-applied
//! move (a session in two groups, or in none while its scope says otherwise).

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::sync::RwLock;

use crate::error::{ChatError, Result};

/// A session's message-visibility context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// The default, ungrouped scope
    Lobby,
    /// A named group
    Group(String),
}

impl Scope {
    pub fn is_lobby(&self) -> bool {
        matches!(self, Scope::Lobby)
    }

    /// The group name, if this scope is a group
    pub fn group_name(&self) -> Option<&str> {
        match self {
            Scope::Lobby => None,
            Scope::Group(name) => Some(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Lobby => write!(f, "lobby"),
            Scope::Group(name) => write!(f, "group '{}'", name),
        }
    }
}

/// Routing handle for one live session
///
/// The directory references sessions, it never owns them: the handle carries
/// the bounded outbound sender bound to the session's writer task plus
/// routing metadata.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    /// The identity the session registered under
    pub identity: String,
    /// Current scope
    pub scope: Scope,
    /// Outbound line sink; delivery never blocks on the peer's socket
    pub outbound: mpsc::Sender<String>,
    /// Remote address (metadata, not used for routing)
    pub addr: SocketAddr,
    /// When the session connected, milliseconds since UNIX epoch
    pub connected_at: u64,
}

/// Registry state guarded by the directory's single lock
#[derive(Debug, Default)]
struct DirectoryState {
    /// Connected sessions indexed by identity
    peers: HashMap<String, PeerHandle>,
    /// Group member sets indexed by group name; pruned when empty
    groups: HashMap<String, HashSet<String>>,
}

impl DirectoryState {
    fn remove_from_group(&mut self, identity: &str, group: &str) {
        if let Some(members) = self.groups.get_mut(group) {
            members.remove(identity);
            if members.is_empty() {
                self.groups.remove(group);
            }
        }
    }

    fn apply_scope(&mut self, identity: &str, scope: Scope) {
        if let Some(name) = scope.group_name() {
            self.groups
                .entry(name.to_string())
                .or_default()
                .insert(identity.to_string());
        }
        if let Some(peer) = self.peers.get_mut(identity) {
            peer.scope = scope;
        }
    }
}

/// Process-wide identity/scope/group registry
///
/// Empty at server start, mutated only through [`register`](Self::register),
/// [`unregister`](Self::unregister) and [`set_scope`](Self::set_scope).
#[derive(Debug, Default)]
pub struct Directory {
    inner: RwLock<DirectoryState>,
    /// Connection cap; `None` means unbounded
    max_peers: Option<usize>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A directory that refuses registrations past `max_peers`
    pub fn with_limit(max_peers: usize) -> Self {
        Self {
            inner: RwLock::default(),
            max_peers: Some(max_peers),
        }
    }

    /// Register a new session under its identity.
    ///
    /// Fails with [`ChatError::DuplicateIdentity`] if the identity is already
    /// connected, or [`ChatError::ResourceLimit`] once the connection cap is
    /// reached; either way the caller must close the new connection without
    /// any peer-visible side effects. The cap is checked under the same
    /// write lock as the insert, so concurrent handshakes cannot both
    /// squeeze through the last slot. A handle carrying a group scope is
    /// entered into that group atomically with registration.
    pub async fn register(&self, handle: PeerHandle) -> Result<()> {
        let mut state = self.inner.write().await;
        if state.peers.contains_key(&handle.identity) {
            return Err(ChatError::duplicate_identity(&handle.identity));
        }
        if let Some(max) = self.max_peers {
            if state.peers.len() >= max {
                return Err(ChatError::resource_limit(format!(
                    "maximum connections reached: {}",
                    max
                )));
            }
        }
        let identity = handle.identity.clone();
        let scope = handle.scope.clone();
        state.peers.insert(identity.clone(), handle);
        state.apply_scope(&identity, scope);
        Ok(())
    }

    /// Remove an identity from the registry and from its group, if any.
    ///
    /// Idempotent: returns the removed handle (whose scope tells the caller
    /// who could see the departure), or `None` if the identity was absent.
    pub async fn unregister(&self, identity: &str) -> Option<PeerHandle> {
        let mut state = self.inner.write().await;
        let handle = state.peers.remove(identity)?;
        if let Some(group) = handle.scope.group_name().map(str::to_string) {
            state.remove_from_group(identity, &group);
        }
        Some(handle)
    }

    /// Move a session between the lobby and named groups.
    ///
    /// All-or-nothing under the write lock: the old membership is removed,
    /// the new one added, and the recorded scope updated in one step.
    /// Returns the previous scope when a move happened, `None` when nothing
    /// changed (unknown identity, or already in the requested scope) so
    /// callers can skip notices for idempotent transitions.
    pub async fn set_scope(&self, identity: &str, scope: Scope) -> Option<Scope> {
        let mut state = self.inner.write().await;
        let previous = state.peers.get(identity)?.scope.clone();
        if previous == scope {
            return None;
        }
        if let Some(group) = previous.group_name().map(str::to_string) {
            state.remove_from_group(identity, &group);
        }
        state.apply_scope(identity, scope);
        Some(previous)
    }

    /// Current scope of an identity
    pub async fn scope_of(&self, identity: &str) -> Option<Scope> {
        let state = self.inner.read().await;
        state.peers.get(identity).map(|p| p.scope.clone())
    }

    /// Snapshot of the identities currently in a scope, sorted
    pub async fn members_of(&self, scope: &Scope) -> Vec<String> {
        let state = self.inner.read().await;
        let mut members: Vec<String> = match scope {
            Scope::Lobby => state
                .peers
                .values()
                .filter(|p| p.scope.is_lobby())
                .map(|p| p.identity.clone())
                .collect(),
            Scope::Group(name) => state
                .groups
                .get(name)
                .map(|m| m.iter().cloned().collect())
                .unwrap_or_default(),
        };
        members.sort();
        members
    }

    /// Snapshot of every connected identity, sorted
    pub async fn all_identities(&self) -> Vec<String> {
        let state = self.inner.read().await;
        let mut identities: Vec<String> = state.peers.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Outbound sink of a single identity, if connected
    pub async fn sink_of(&self, identity: &str) -> Option<mpsc::Sender<String>> {
        let state = self.inner.read().await;
        state.peers.get(identity).map(|p| p.outbound.clone())
    }

    /// Outbound sinks of every member of a scope, excluding one identity.
    ///
    /// Computed in one lock acquisition and returned as clones so delivery
    /// happens after the lock is released.
    pub async fn sinks_in_scope(
        &self,
        scope: &Scope,
        exclude: Option<&str>,
    ) -> Vec<mpsc::Sender<String>> {
        let state = self.inner.read().await;
        match scope {
            Scope::Lobby => state
                .peers
                .values()
                .filter(|p| p.scope.is_lobby() && Some(p.identity.as_str()) != exclude)
                .map(|p| p.outbound.clone())
                .collect(),
            Scope::Group(name) => state
                .groups
                .get(name)
                .map(|members| {
                    members
                        .iter()
                        .filter(|m| Some(m.as_str()) != exclude)
                        .filter_map(|m| state.peers.get(m))
                        .map(|p| p.outbound.clone())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Member roster of a group with sinks, sorted by identity.
    ///
    /// Used by group sends, which need to know whether the sender is a
    /// member (for the self-confirmation variant).
    pub async fn group_roster(&self, group: &str) -> Vec<(String, mpsc::Sender<String>)> {
        let state = self.inner.read().await;
        let mut roster: Vec<(String, mpsc::Sender<String>)> = state
            .groups
            .get(group)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| state.peers.get(m))
                    .map(|p| (p.identity.clone(), p.outbound.clone()))
                    .collect()
            })
            .unwrap_or_default();
        roster.sort_by(|a, b| a.0.cmp(&b.0));
        roster
    }

    /// Outbound sinks of every connected session except one
    pub async fn all_sinks_except(&self, exclude: &str) -> Vec<mpsc::Sender<String>> {
        let state = self.inner.read().await;
        state
            .peers
            .values()
            .filter(|p| p.identity != exclude)
            .map(|p| p.outbound.clone())
            .collect()
    }

    /// Per-recipient visibility snapshot for a scope.
    ///
    /// For each member: their sink and the sorted list of the *other*
    /// members they can see. One lock acquisition, so every snapshot in the
    /// batch reflects the same instant.
    pub async fn visibility_updates(
        &self,
        scope: &Scope,
    ) -> Vec<(mpsc::Sender<String>, Vec<String>)> {
        let state = self.inner.read().await;
        let members: Vec<&PeerHandle> = match scope {
            Scope::Lobby => state.peers.values().filter(|p| p.scope.is_lobby()).collect(),
            Scope::Group(name) => state
                .groups
                .get(name)
                .map(|m| m.iter().filter_map(|id| state.peers.get(id)).collect())
                .unwrap_or_default(),
        };
        members
            .iter()
            .map(|peer| {
                let mut visible: Vec<String> = members
                    .iter()
                    .filter(|other| other.identity != peer.identity)
                    .map(|other| other.identity.clone())
                    .collect();
                visible.sort();
                (peer.outbound.clone(), visible)
            })
            .collect()
    }

    /// Number of connected sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.peers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
