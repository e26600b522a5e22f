//! Error types shared across the discussion engine.
//!
//! None of these are fatal to a session: generation failures resolve the turn
//! as a no-op, dictation failures switch dictation off, and empty submits are
//! rejected before any state changes.

use thiserror::Error;

/// A provider or network failure while producing an autonomous contribution.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("Provider request failed: {0}")]
    Provider(String),
    #[error("Provider returned an empty reply")]
    EmptyReply,
    #[error("Missing prompt template: '{0}'")]
    MissingPrompt(String),
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        Self::Provider(format!("{:#}", err))
    }
}

/// An error reported by the dictation source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DictationError {
    /// The recognizer heard nothing. Not a reason to stop listening.
    #[error("No speech detected")]
    NoSpeech,
    #[error("Dictation failed: {0}")]
    Other(String),
}

impl DictationError {
    /// Maps a recognizer error code onto the taxonomy.
    pub fn from_code(code: &str) -> Self {
        match code.to_ascii_lowercase().replace('_', "-").as_str() {
            "no-speech" => Self::NoSpeech,
            _ => Self::Other(code.to_string()),
        }
    }
}

/// Rejections of human input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Cannot submit an empty message")]
    EmptySubmit,
    #[error("The session has already finished")]
    SessionFinished,
}

/// A roster that cannot host a discussion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("A roster needs at least one member")]
    Empty,
}

/// Guard violations inside the turn scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Speaker '{0}' cannot start while another turn is in flight")]
    Busy(String),
    #[error("The round ceiling has been reached")]
    CeilingReached,
    #[error("The session has finished")]
    Finished,
    #[error("No active turn with id {0}")]
    UnknownTurn(u64),
    #[error("Unknown participant '{0}'")]
    UnknownParticipant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictation_error_from_code() {
        assert_eq!(DictationError::from_code("no-speech"), DictationError::NoSpeech);
        assert_eq!(DictationError::from_code("NO_SPEECH"), DictationError::NoSpeech);
        assert_eq!(
            DictationError::from_code("network"),
            DictationError::Other("network".to_string())
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", InputError::EmptySubmit),
            "Cannot submit an empty message"
        );
        assert_eq!(
            format!("{}", SchedulerError::UnknownTurn(7)),
            "No active turn with id 7"
        );
        assert_eq!(
            format!("{}", GenerationError::Provider("timeout".to_string())),
            "Provider request failed: timeout"
        );
    }

    #[test]
    fn test_generation_error_from_anyhow() {
        let err: GenerationError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err, GenerationError::Provider("connection reset".to_string()));
    }
}
