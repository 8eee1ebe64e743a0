//! Frame parsing and formatting
//!
//! Frames are UTF-8 text with fields separated by `|`. Two inbound shapes exist:
//!
//! ```text
//! JOIN|<room>|<userId>
//! <userId>|<timestamp>|<type>|<content>
//! ```
//!
//! The delimiter is reserved. Inbound, an embedded `|` shows up as a field count
//! mismatch and the frame is rejected; outbound, encoding refuses any field that
//! contains it.

use std::fmt;

use thiserror::Error;

/// Field separator
pub const DELIMITER: char = '|';

/// Leading token of a join frame
pub const JOIN_COMMAND: &str = "JOIN";

/// Content prefix that turns a message into a unicast
pub const UNICAST_SIGIL: &str = "/msg ";

/// Sender name used for relay-generated frames
pub const SYSTEM_SENDER: &str = "System";

/// Message type of unicast frames
pub const UNICAST_TYPE: &str = "unicast";

/// Message type of relay error frames
pub const ERROR_TYPE: &str = "error";

/// Body of the frame sent back when a unicast target is unknown
pub const TARGET_NOT_FOUND: &str = "Target user not found.";

const JOIN_FIELDS: usize = 3;
const MESSAGE_FIELDS: usize = 4;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} frame expects {expected} fields, got {actual}")]
    FieldCount {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Field '{0}' cannot be empty")]
    EmptyField(&'static str),

    #[error("Field '{0}' contains the reserved delimiter '|'")]
    EmbeddedDelimiter(&'static str),

    #[error("Field '{0}' contains a line break")]
    EmbeddedLineBreak(&'static str),

    #[error("Malformed unicast: {0}")]
    MalformedUnicast(String),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Inbound Commands
// ============================================================================

/// A parsed inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Take a seat in a room under a user identifier
    Join { room: String, user_id: String },

    /// Broadcast or unicast message
    Message(MessageFrame),
}

impl Command {
    /// Parse one inbound frame
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let fields: Vec<&str> = text.split(DELIMITER).collect();

        if fields[0] == JOIN_COMMAND {
            if fields.len() != JOIN_FIELDS {
                return Err(ProtocolError::FieldCount {
                    command: JOIN_COMMAND,
                    expected: JOIN_FIELDS,
                    actual: fields.len(),
                });
            }
            let room = require_non_empty("room", fields[1])?;
            let user_id = require_non_empty("userId", fields[2])?;
            return Ok(Command::Join {
                room: room.to_string(),
                user_id: user_id.to_string(),
            });
        }

        match fields.len() {
            MESSAGE_FIELDS => Ok(Command::Message(MessageFrame::new(
                fields[0], fields[1], fields[2], fields[3],
            ))),
            1 => Err(ProtocolError::UnknownCommand(fields[0].to_string())),
            actual => Err(ProtocolError::FieldCount {
                command: "message",
                expected: MESSAGE_FIELDS,
                actual,
            }),
        }
    }
}

fn require_non_empty<'a>(name: &'static str, value: &'a str) -> ProtocolResult<&'a str> {
    if value.is_empty() {
        return Err(ProtocolError::EmptyField(name));
    }
    Ok(value)
}

// ============================================================================
// Message Frames
// ============================================================================

/// A four-field message frame, used both inbound and outbound
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
    pub user_id: String,
    pub timestamp: String,
    pub kind: String,
    pub content: String,
}

impl MessageFrame {
    /// Create a message frame
    pub fn new(
        user_id: impl Into<String>,
        timestamp: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp: timestamp.into(),
            kind: kind.into(),
            content: content.into(),
        }
    }

    /// Whether the content asks for point-to-point delivery
    pub fn is_unicast(&self) -> bool {
        self.content.starts_with(UNICAST_SIGIL)
    }

    /// Frame echoed to the sender of a delivered unicast
    pub fn unicast_to_sender(
        sender: &str,
        timestamp: &str,
        target: &str,
        text: &str,
    ) -> Self {
        Self::new(sender, timestamp, UNICAST_TYPE, format!("To {}: {}", target, text))
    }

    /// Frame delivered to the target of a unicast
    pub fn unicast_to_target(sender: &str, timestamp: &str, text: &str) -> Self {
        Self::new(sender, timestamp, UNICAST_TYPE, format!("From {}: {}", sender, text))
    }

    /// Frame sent back when the unicast target cannot be resolved
    pub fn target_not_found(timestamp: &str) -> Self {
        Self::new(SYSTEM_SENDER, timestamp, ERROR_TYPE, TARGET_NOT_FOUND)
    }

    fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("userId", self.user_id.as_str()),
            ("timestamp", self.timestamp.as_str()),
            ("type", self.kind.as_str()),
            ("content", self.content.as_str()),
        ]
    }

    /// Validate that no field carries the delimiter
    pub fn validate(&self) -> ProtocolResult<()> {
        for (name, value) in self.fields() {
            if value.contains(DELIMITER) {
                return Err(ProtocolError::EmbeddedDelimiter(name));
            }
        }
        Ok(())
    }

    /// Validate that the frame fits on one line of a line-oriented stream
    pub fn ensure_single_line(&self) -> ProtocolResult<()> {
        for (name, value) in self.fields() {
            if value.contains(['\r', '\n']) {
                return Err(ProtocolError::EmbeddedLineBreak(name));
            }
        }
        Ok(())
    }

    /// Encode to wire text
    pub fn encode(&self) -> ProtocolResult<String> {
        self.validate()?;
        Ok(self.to_string())
    }
}

impl fmt::Display for MessageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{d}{}{d}{}{d}{}",
            self.user_id,
            self.timestamp,
            self.kind,
            self.content,
            d = DELIMITER
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
