//! Error handling for the chat server

use std::fmt;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat server error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Transport read/write failures; tears down the owning session
    Transport(String),
    /// Registration refused because the identity is already connected
    DuplicateIdentity(String),
    /// Inbound line did not parse as a command; reported to the sender only
    MalformedCommand(String),
    /// Private-send target is not connected; reported to the sender only
    UnknownTarget(String),
    /// Group send to a group with no members; informational, not fatal
    EmptyGroup(String),
    /// Connection limit reached
    ResourceLimit(String),
    /// Configuration error
    Config(String),
}

impl ChatError {
    /// Create a transport error
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        ChatError::Transport(msg.into())
    }

    /// Create a duplicate identity error
    pub fn duplicate_identity<T: Into<String>>(identity: T) -> Self {
        ChatError::DuplicateIdentity(identity.into())
    }

    /// Create a malformed command error
    pub fn malformed_command<T: Into<String>>(line: T) -> Self {
        ChatError::MalformedCommand(line.into())
    }

    /// Create an unknown target error
    pub fn unknown_target<T: Into<String>>(target: T) -> Self {
        ChatError::UnknownTarget(target.into())
    }

    /// Create an empty group notice
    pub fn empty_group<T: Into<String>>(group: T) -> Self {
        ChatError::EmptyGroup(group.into())
    }

    /// Create a resource limit error
    pub fn resource_limit<T: Into<String>>(msg: T) -> Self {
        ChatError::ResourceLimit(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        ChatError::Config(msg.into())
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Transport(msg) => write!(f, "Transport error: {}", msg),
            ChatError::DuplicateIdentity(name) => write!(f, "Identity already in use: {}", name),
            ChatError::MalformedCommand(line) => write!(f, "Malformed command: {}", line),
            ChatError::UnknownTarget(target) => write!(f, "Unknown target: {}", target),
            ChatError::EmptyGroup(group) => write!(f, "Group has no members: {}", group),
            ChatError::ResourceLimit(msg) => write!(f, "Resource limit exceeded: {}", msg),
            ChatError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Transport(format!("IO error: {}", err))
    }
}
