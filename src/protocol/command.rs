//! Inbound command parsing
//!
//! Each inbound line is classified exactly once, at the protocol boundary,
//! into a closed [`Command`] variant; everything past this point dispatches
//! on the variant, never on tag strings.

use crate::error::{ChatError, Result};

/// Prefix inside an `ALL` send that escalates it to a server-wide broadcast
const GLOBAL_PREFIX: &str = "[GLOBAL]";

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain chat text, routed per the sender's current scope
    Chat(String),
    /// Broadcast to every connected identity, bypassing scope filtering
    Global(String),
    /// Send to the members of a named group
    Group { group: String, text: String },
    /// Send to a single identity
    Private { to: String, text: String },
    /// Join a named group (leaving the current one, if any)
    Join(String),
    /// Leave a named group; a no-op if not currently a member
    Leave(String),
    /// Explicit disconnect
    Quit,
}

/// A validated handshake line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// The identity the connection registers under
    pub identity: String,
    /// Initial group to join, if any (absent or empty field = lobby)
    pub group: Option<String>,
}

/// Parse the handshake line: `<identity>` or `<identity>|<group>`.
///
/// Returns `None` for an empty identity or an identity containing characters
/// the wire format reserves (`|` is the field separator, `,` delimits the
/// `USERS|` snapshot). The caller closes the connection silently.
pub fn parse_handshake(line: &str) -> Option<Handshake> {
    let mut fields = line.trim().splitn(2, '|');
    let identity = fields.next().unwrap_or("").trim();
    if identity.is_empty() || identity.contains(',') {
        return None;
    }
    let group = fields
        .next()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from);
    Some(Handshake {
        identity: identity.to_string(),
        group,
    })
}

/// Parse one inbound line into a [`Command`].
///
/// A line without a pipe, or whose first field is not a recognized tag, is
/// plain chat text. A recognized tag with a missing required field is a
/// [`ChatError::MalformedCommand`], reported to the sender only.
pub fn parse_command(line: &str) -> Result<Command> {
    if !line.contains('|') {
        return Ok(Command::Chat(line.to_string()));
    }

    let mut fields = line.splitn(3, '|');
    let tag = fields.next().unwrap_or("");
    let target = fields.next().unwrap_or("").trim();
    let text = fields.next().unwrap_or("");

    match tag {
        "ALL" => {
            if let Some(rest) = text.strip_prefix(GLOBAL_PREFIX) {
                Ok(Command::Global(rest.trim_start().to_string()))
            } else {
                Ok(Command::Chat(text.to_string()))
            }
        }
        "PRIVATE" => {
            if target.is_empty() {
                return Err(ChatError::malformed_command(line));
            }
            Ok(Command::Private {
                to: target.to_string(),
                text: text.to_string(),
            })
        }
        "GROUP" => {
            if target.is_empty() {
                return Err(ChatError::malformed_command(line));
            }
            Ok(Command::Group {
                group: target.to_string(),
                text: text.to_string(),
            })
        }
        "JOIN" => {
            if target.is_empty() {
                return Err(ChatError::malformed_command(line));
            }
            Ok(Command::Join(target.to_string()))
        }
        "LEAVE" => {
            if target.is_empty() {
                return Err(ChatError::malformed_command(line));
            }
            Ok(Command::Leave(target.to_string()))
        }
        "QUIT" => Ok(Command::Quit),
        // Unrecognized tag: the line is ordinary chat that happens to
        // contain a pipe
        _ => Ok(Command::Chat(line.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_chat() {
        assert_eq!(
            parse_command("hello there").unwrap(),
            Command::Chat("hello there".to_string())
        );
        // An empty line is an empty chat message, not a skip
        assert_eq!(parse_command("").unwrap(), Command::Chat(String::new()));
    }

    #[test]
    fn test_all_routes_per_scope() {
        assert_eq!(
            parse_command("ALL||hi everyone").unwrap(),
            Command::Chat("hi everyone".to_string())
        );
    }

    #[test]
    fn test_all_with_global_prefix() {
        assert_eq!(
            parse_command("ALL||[GLOBAL] fire drill").unwrap(),
            Command::Global("fire drill".to_string())
        );
    }

    #[test]
    fn test_private_group_join_leave_quit() {
        assert_eq!(
            parse_command("PRIVATE|bob|psst").unwrap(),
            Command::Private {
                to: "bob".to_string(),
                text: "psst".to_string()
            }
        );
        assert_eq!(
            parse_command("GROUP|g1|hi").unwrap(),
            Command::Group {
                group: "g1".to_string(),
                text: "hi".to_string()
            }
        );
        assert_eq!(parse_command("JOIN|g1|").unwrap(), Command::Join("g1".to_string()));
        assert_eq!(parse_command("LEAVE|g1|").unwrap(), Command::Leave("g1".to_string()));
        assert_eq!(parse_command("QUIT||").unwrap(), Command::Quit);
    }

    #[test]
    fn test_missing_target_is_malformed() {
        assert!(matches!(
            parse_command("PRIVATE||psst"),
            Err(ChatError::MalformedCommand(_))
        ));
        assert!(matches!(
            parse_command("JOIN||"),
            Err(ChatError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_unknown_tag_with_pipe_is_chat() {
        assert_eq!(
            parse_command("this|is|chat").unwrap(),
            Command::Chat("this|is|chat".to_string())
        );
    }

    #[test]
    fn test_handshake_forms() {
        assert_eq!(
            parse_handshake("alice"),
            Some(Handshake {
                identity: "alice".to_string(),
                group: None
            })
        );
        assert_eq!(
            parse_handshake("alice|g1"),
            Some(Handshake {
                identity: "alice".to_string(),
                group: Some("g1".to_string())
            })
        );
        assert_eq!(
            parse_handshake("alice|"),
            Some(Handshake {
                identity: "alice".to_string(),
                group: None
            })
        );
        assert_eq!(parse_handshake(""), None);
        assert_eq!(parse_handshake("   "), None);
        assert_eq!(parse_handshake("a,b"), None);
    }
}
