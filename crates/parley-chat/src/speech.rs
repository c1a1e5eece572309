//! Speech input merging.
//!
//! The platform speech capability is modelled as a stream of tagged events
//! consumed by `SpeechInputMerger`, a small reducer over the committed input
//! buffer:
//! - `Final` fragments are appended to the input buffer as they arrive.
//! - `Interim` fragments only replace the provisional preview; they are
//!   never committed, sent, or persisted.
//! - `Ended` and `Error` switch listening off without raising an error.

use tracing::{debug, warn};

/// One event from a continuous speech-to-text capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    /// Settled text for a finished utterance.
    Final(String),
    /// Provisional text, subject to revision.
    Interim(String),
    /// The capability ended the stream on its own.
    Ended,
    /// The capability reported a runtime error.
    Error(String),
}

/// Platform-provided continuous speech recognition.
///
/// Implementations run in continuous mode with interim results enabled and
/// deliver their output as `SpeechEvent`s to the owning widget.
pub trait SpeechCapability: Send {
    /// Begin recognition in `locale`. Returns the platform's reason on refusal.
    fn start(&mut self, locale: &str) -> Result<(), String>;

    /// Stop recognition. Must be safe to call when already stopped.
    fn stop(&mut self);
}

/// What applying an event changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechUpdate {
    /// A final fragment was appended to the input buffer.
    Committed,
    /// The provisional preview changed.
    Preview,
    /// Listening switched off.
    Stopped,
    /// The event arrived while not listening and was dropped.
    Ignored,
}

/// Listening flag plus the provisional preview of the current utterance.
#[derive(Debug, Clone, Default)]
pub struct SpeechInputMerger {
    listening: bool,
    interim: Option<String>,
}

impl SpeechInputMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Provisional text of the utterance in progress, for display only.
    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    pub fn begin(&mut self) {
        self.listening = true;
        self.interim = None;
    }

    /// Stop listening, discarding any uncommitted interim text.
    pub fn end(&mut self) {
        self.listening = false;
        self.interim = None;
    }

    /// Apply one event to `input`.
    pub fn apply(&mut self, event: SpeechEvent, input: &mut String) -> SpeechUpdate {
        if !self.listening {
            debug!(event = ?event, "Speech event after capture stopped; dropped");
            return SpeechUpdate::Ignored;
        }

        match event {
            SpeechEvent::Final(text) => {
                self.interim = None;
                commit(input, &text);
                SpeechUpdate::Committed
            }
            SpeechEvent::Interim(text) => {
                let text = text.trim();
                self.interim = (!text.is_empty()).then(|| text.to_string());
                SpeechUpdate::Preview
            }
            SpeechEvent::Ended => {
                debug!("Speech capture ended");
                self.end();
                SpeechUpdate::Stopped
            }
            SpeechEvent::Error(reason) => {
                warn!(reason = %reason, "Speech recognition error; listening stopped");
                self.end();
                SpeechUpdate::Stopped
            }
        }
    }
}

/// Append a final fragment as recognized.
///
/// A single space is inserted only when neither side already has whitespace
/// at the join.
fn commit(input: &mut String, fragment: &str) {
    if fragment.is_empty() {
        return;
    }
    if !input.is_empty()
        && !input.ends_with(char::is_whitespace)
        && !fragment.starts_with(char::is_whitespace)
    {
        input.push(' ');
    }
    input.push_str(fragment);
}
