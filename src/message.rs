//! Chat message envelope.
//!
//! On the wire a message is plain text: `[<sender>] <payload>`. There is no
//! structured encoding; the sender can only be recovered by inspecting the
//! prefix.

use crate::identity::Identity;

/// A message as published by one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Identity,
    pub payload: String,
}

impl ChatMessage {
    pub fn new(sender: Identity, payload: impl Into<String>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }

    /// The value handed to the bus.
    pub fn wire_value(&self) -> String {
        format!("[{}] {}", self.sender, self.payload)
    }

    /// Bus key: the sender identity.
    pub fn key(&self) -> &str {
        self.sender.as_str()
    }

    /// Split a wire value back into sender and payload.
    ///
    /// Returns `None` for values published without the sender prefix, such
    /// as those from the seeding tool.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.strip_prefix('[')?;
        let (sender, payload) = rest.split_once("] ")?;
        Some(Self::new(Identity::new(sender), payload))
    }
}
