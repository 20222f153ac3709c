//! Outbound line construction
//!
//! Every line the server pushes to a client is built here so the framing
//! stays in one place and tests can assert exact strings.

use crate::error::ChatError;

/// Visible-peer snapshot: `USERS|a,b,c` (sorted, excluding the recipient)
pub fn user_list(peers: &[String]) -> String {
    format!("USERS|{}", peers.join(","))
}

/// Scope-routed chat as seen by peers
pub fn scoped_chat(sender: &str, text: &str) -> String {
    format!("[{}]: {}", sender, text)
}

/// Group message as seen by members other than the sender
pub fn group_chat(sender: &str, group: &str, text: &str) -> String {
    format!("[{} -> {}]: {}", sender, group, text)
}

/// Self-confirmation a sending member receives for their own group message
pub fn group_echo(group: &str, text: &str) -> String {
    format!("[you -> {}]: {}", group, text)
}

/// Server-wide broadcast
pub fn global_chat(sender: &str, text: &str) -> String {
    format!("[global] [{}]: {}", sender, text)
}

/// Private message as seen by the target
pub fn private_chat(sender: &str, text: &str) -> String {
    format!("[from {}]: {}", sender, text)
}

/// Presence notice pushed to the peers who can see the new arrival
pub fn joined(identity: &str) -> String {
    format!("[join] {} has joined", identity)
}

/// Departure notice pushed to the peers who could see the session
pub fn left(identity: &str) -> String {
    format!("[leave] {} has left", identity)
}

/// Informational notice to a single session
pub fn info(msg: &str) -> String {
    format!("[info] {}", msg)
}

/// Empty-delivery notice for a group send with no members. Framed as info,
/// not error: an empty group is a signal, not a failure.
pub fn no_members(group: &str) -> String {
    info(&ChatError::empty_group(group).to_string())
}

/// Error notice to the offending session
pub fn error(err: &ChatError) -> String {
    format!("[error] {}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_framing_matches_protocol() {
        assert_eq!(group_chat("alice", "g1", "hi"), "[alice -> g1]: hi");
        assert_eq!(group_echo("g1", "hi"), "[you -> g1]: hi");
    }

    #[test]
    fn test_user_list_framing() {
        let peers = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(user_list(&peers), "USERS|alice,bob");
        assert_eq!(user_list(&[]), "USERS|");
    }

    #[test]
    fn test_error_framing() {
        let line = error(&ChatError::unknown_target("eve"));
        assert_eq!(line, "[error] Unknown target: eve");
    }

    #[test]
    fn test_empty_group_is_framed_as_info() {
        assert_eq!(no_members("g1"), "[info] Group has no members: g1");
    }
}
