use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ParleyError, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Opaque identifier of the current user.
///
/// Resolved once per widget activation and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Build an identity from a raw value, rejecting blank strings.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ParleyError::InvalidIdentity(
                "identity must not be blank".to_string(),
            ));
        }
        Ok(Self(value))
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

/// Server-assigned conversation identifier (`chatId` on the wire).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Author of a transcript message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single transcript entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// In-memory conversation owned by one widget activation.
///
/// `session_id` stays `None` until the conversation service assigns one.
/// While bound to a session id the transcript is only ever appended to
/// locally; wholesale replacement happens only with a server transcript.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<SessionId>,
    pub identity: Option<Identity>,
    pub transcript: Vec<Message>,
}

impl Session {
    /// Create an empty, unbound session for the given identity.
    pub fn new(identity: Option<Identity>) -> Self {
        Self {
            session_id: None,
            identity,
            transcript: Vec::new(),
        }
    }

    /// Create a session adopted from a server-provided transcript.
    pub fn hydrated(
        identity: Option<Identity>,
        session_id: SessionId,
        transcript: Vec<Message>,
    ) -> Self {
        Self {
            session_id: Some(session_id),
            identity,
            transcript,
        }
    }

    /// Whether the conversation service has assigned an id yet.
    pub fn is_bound(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    /// Drop the transcript and session id, keeping the identity.
    pub fn clear(&mut self) {
        self.session_id = None;
        self.transcript.clear();
    }
}
