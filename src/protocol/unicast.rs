//! Unicast request parsing
//!
//! Message content of the form `/msg <target> <text>` addresses a single user.
//! The target is the first whitespace-delimited token after the sigil and the
//! rest, with its inner spacing intact, is the body.

use super::{ProtocolError, ProtocolResult, UNICAST_SIGIL};

/// A point-to-point request extracted from message content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastRequest {
    pub target: String,
    pub text: String,
}

impl UnicastRequest {
    /// Parse unicast content
    ///
    /// Fails if the sigil is absent or if the target or body is missing.
    pub fn parse(content: &str) -> ProtocolResult<Self> {
        let rest = content.strip_prefix(UNICAST_SIGIL).ok_or_else(|| {
            ProtocolError::MalformedUnicast(format!("missing '{}' prefix", UNICAST_SIGIL.trim_end()))
        })?;

        let rest = rest.trim_start();
        let (target, text) = rest
            .split_once(char::is_whitespace)
            .map(|(target, text)| (target, text.trim_start()))
            .unwrap_or((rest, ""));

        if target.is_empty() {
            return Err(ProtocolError::MalformedUnicast("missing target".to_string()));
        }
        if text.is_empty() {
            return Err(ProtocolError::MalformedUnicast("missing body".to_string()));
        }

        Ok(Self {
            target: target.to_string(),
            text: text.to_string(),
        })
    }
}
