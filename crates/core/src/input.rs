//! Input Capture Adapter
//!
//! Merges typed edits and a streaming dictation source into one pending
//! buffer. Only finalized dictation segments ever reach the buffer; the
//! interim fragment is kept for display and dropped on submit or stop.

use crate::error::{DictationError, InputError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One result event from the dictation source.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DictationUpdate {
    /// Segments the recognizer will not revise any more.
    #[serde(default)]
    pub final_segments: Vec<String>,
    /// The current, still changing hypothesis.
    #[serde(default)]
    pub interim_text: String,
}

/// Snapshot of the pending input.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInput {
    pub buffer: String,
    pub interim: String,
    pub listening: bool,
}

#[derive(Debug, Default)]
pub struct InputCapture {
    pending: PendingInput,
    /// Set once the human has started dictation at least once.
    dictated: bool,
}

impl InputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &PendingInput {
        &self.pending
    }

    pub fn is_listening(&self) -> bool {
        self.pending.listening
    }

    /// True if the human has typed, dictated or is dictating.
    pub fn has_activity(&self) -> bool {
        self.dictated || self.pending.listening || !self.pending.buffer.is_empty()
    }

    /// Replaces the buffer with the full contents of the text box.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.pending.buffer = text.into();
    }

    /// Starts dictation. Returns false if it was already running.
    pub fn start_dictation(&mut self) -> bool {
        if self.pending.listening {
            return false;
        }
        self.pending.listening = true;
        self.dictated = true;
        debug!("Dictation started");
        true
    }

    /// Stops dictation, keeping finalized text. Returns false if it was not running.
    pub fn stop_dictation(&mut self) -> bool {
        self.pending.interim.clear();
        if !self.pending.listening {
            return false;
        }
        self.pending.listening = false;
        debug!("Dictation stopped");
        true
    }

    /// Applies a recognizer result. Ignored when dictation is off.
    pub fn apply_dictation(&mut self, update: DictationUpdate) -> bool {
        if !self.pending.listening {
            debug!("Ignoring dictation result while not listening");
            return false;
        }
        for segment in update.final_segments {
            self.pending.buffer.push_str(&segment);
        }
        self.pending.interim = update.interim_text;
        true
    }

    /// Handles a recognizer error. Anything but "no speech" switches dictation off.
    /// Returns true if the listening state changed.
    pub fn dictation_failed(&mut self, error: &DictationError) -> bool {
        match error {
            DictationError::NoSpeech => {
                debug!("Dictation heard no speech");
                false
            }
            DictationError::Other(code) => {
                warn!(%code, "Dictation error, stopping");
                self.stop_dictation()
            }
        }
    }

    /// Takes the buffer for submission.
    ///
    /// Blank input is rejected without touching any state. On success the
    /// buffer and interim are cleared and dictation is stopped.
    pub fn take_submission(&mut self) -> Result<String, InputError> {
        if self.pending.buffer.trim().is_empty() {
            return Err(InputError::EmptySubmit);
        }
        let text = std::mem::take(&mut self.pending.buffer);
        self.pending.interim.clear();
        self.pending.listening = false;
        Ok(text)
    }
}
