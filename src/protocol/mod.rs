//! Wire protocol: line-delimited UTF-8 text frames
//!
//! Inbound lines are pipe-delimited commands (`TAG|target|text`) or plain
//! chat text; outbound lines are tagged human-readable notices plus the
//! `USERS|` visible-peer snapshot.

pub mod command;
pub mod wire;

pub use command::{parse_command, parse_handshake, Command, Handshake};
