//! Conversation state and the send state machine.
//!
//! Valid exchange transitions:
//! - Idle -> Sending (message submitted)
//! - Sending -> Idle (reply reconciled, send failed, or result discarded)

use std::fmt;

use parley_core::types::{Identity, Session};

use crate::error::ChatError;

/// Phase of the message exchange. At most one send is in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExchangePhase {
    /// Ready to send.
    #[default]
    Idle,
    /// A request is outstanding; the send affordance is disabled.
    Sending,
}

impl fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangePhase::Idle => write!(f, "Idle"),
            ExchangePhase::Sending => write!(f, "Sending"),
        }
    }
}

impl ExchangePhase {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &ExchangePhase) -> bool {
        matches!(
            (self, target),
            (ExchangePhase::Idle, ExchangePhase::Sending)
                | (ExchangePhase::Sending, ExchangePhase::Idle)
        )
    }
}

/// Mutable state of one widget activation.
///
/// `epoch` changes whenever the session is discarded (reset, activation,
/// deactivation); results of requests issued under an older epoch are
/// dropped instead of applied.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub session: Session,
    /// Committed input buffer: typed text plus final speech fragments.
    pub input: String,
    /// Inline, non-fatal error line.
    pub error: Option<String>,
    /// Inline informational notice (e.g. voice input unsupported).
    pub notice: Option<String>,
    pub phase: ExchangePhase,
    pub epoch: u64,
}

impl ConversationState {
    pub fn new(identity: Option<Identity>, epoch: u64) -> Self {
        Self {
            session: Session::new(identity),
            epoch,
            ..Self::default()
        }
    }

    pub fn is_sending(&self) -> bool {
        self.phase == ExchangePhase::Sending
    }

    /// Attempt to move the exchange to `target`.
    pub fn transition(&mut self, target: ExchangePhase) -> Result<(), ChatError> {
        if !self.phase.can_transition_to(&target) {
            return Err(match target {
                ExchangePhase::Sending => ChatError::SendInFlight,
                ExchangePhase::Idle => ChatError::State(format!(
                    "Invalid exchange transition: {} -> {}",
                    self.phase, target
                )),
            });
        }
        tracing::debug!("Exchange phase: {} -> {}", self.phase, target);
        self.phase = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(ExchangePhase::Idle.to_string(), "Idle");
        assert_eq!(ExchangePhase::Sending.to_string(), "Sending");
    }

    #[test]
    fn test_valid_transitions() {
        assert!(ExchangePhase::Idle.can_transition_to(&ExchangePhase::Sending));
        assert!(ExchangePhase::Sending.can_transition_to(&ExchangePhase::Idle));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!ExchangePhase::Idle.can_transition_to(&ExchangePhase::Idle));
        assert!(!ExchangePhase::Sending.can_transition_to(&ExchangePhase::Sending));
    }

    #[test]
    fn test_second_send_is_rejected() {
        let mut state = ConversationState::default();
        state.transition(ExchangePhase::Sending).unwrap();
        assert!(state.is_sending());
        assert!(matches!(
            state.transition(ExchangePhase::Sending),
            Err(ChatError::SendInFlight)
        ));
        assert!(state.is_sending());
    }

    #[test]
    fn test_idle_to_idle_is_state_error() {
        let mut state = ConversationState::default();
        let err = state.transition(ExchangePhase::Idle).unwrap_err();
        match err {
            ChatError::State(msg) => {
                assert!(msg.contains("Idle -> Idle"));
            }
            other => panic!("Expected State error, got {:?}", other),
        }
    }

    #[test]
    fn test_new_state_is_idle_and_empty() {
        let identity = Identity::new("u1").unwrap();
        let state = ConversationState::new(Some(identity.clone()), 7);
        assert_eq!(state.phase, ExchangePhase::Idle);
        assert_eq!(state.epoch, 7);
        assert_eq!(state.session.identity, Some(identity));
        assert!(state.session.transcript.is_empty());
        assert!(state.input.is_empty());
        assert!(state.error.is_none());
    }
}
