//! Participant identity.

use std::fmt;

use uuid::Uuid;

use crate::config::CLIENT_ID_ENV_VAR;

/// Identity used by the broker handler.
pub const AUDITOR_IDENTITY: &str = "broker";

/// Which kind of participant is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Ordinary chat client. Waits for the topic, never creates it.
    Participant,
    /// Broker handler. May create the topic and audits every message.
    Auditor,
}

/// Sender tag embedded in every published message. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Resolve the identity for `role` from the process environment.
    pub fn resolve(role: Role) -> Self {
        Self::resolve_with(role, std::env::var(CLIENT_ID_ENV_VAR).ok())
    }

    /// Resolve from an explicitly supplied id. Blank ids fall back to a
    /// generated one.
    pub fn resolve_with(role: Role, explicit: Option<String>) -> Self {
        match role {
            Role::Auditor => Self::new(AUDITOR_IDENTITY),
            Role::Participant => match explicit.filter(|id| !id.trim().is_empty()) {
                Some(id) => Self(id),
                None => Self(Uuid::new_v4().to_string()),
            },
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
