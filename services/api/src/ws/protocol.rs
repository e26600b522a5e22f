//! Defines the WebSocket message protocol between the browser client and the API server.

use crate::models::RosterEntry;
use crossfire_core::{
    engine::{SessionInput, SessionUpdate},
    error::DictationError,
    feedback::FeedbackData,
    input::DictationUpdate,
    scheduler::TurnTrigger,
    transcript::Contribution,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from the client (browser) to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a discussion. This must be the first message.
    Init {
        /// The case under discussion.
        topic: String,
        /// The position the human is interviewing for.
        job_title: String,
    },
    /// The full contents of the text box after an edit.
    Typed { text: String },
    StartDictation,
    StopDictation,
    /// A result event from the browser's speech recognizer.
    DictationResult {
        #[serde(default)]
        final_segments: Vec<String>,
        #[serde(default)]
        interim_text: String,
    },
    /// An error event from the browser's speech recognizer, e.g. `no-speech`.
    DictationError { code: String },
    /// Submits the pending input.
    Submit,
    /// Ends the discussion and requests feedback.
    Finish,
}

impl ClientMessage {
    /// Converts a post-init message into engine input. `Init` has no equivalent.
    pub fn into_input(self) -> Option<SessionInput> {
        match self {
            ClientMessage::Init { .. } => None,
            ClientMessage::Typed { text } => Some(SessionInput::Typed(text)),
            ClientMessage::StartDictation => Some(SessionInput::StartDictation),
            ClientMessage::StopDictation => Some(SessionInput::StopDictation),
            ClientMessage::DictationResult {
                final_segments,
                interim_text,
            } => Some(SessionInput::Dictation(DictationUpdate {
                final_segments,
                interim_text,
            })),
            ClientMessage::DictationError { code } => Some(SessionInput::DictationFailed(
                DictationError::from_code(&code),
            )),
            ClientMessage::Submit => Some(SessionInput::Submit),
            ClientMessage::Finish => Some(SessionInput::Finish),
        }
    }
}

/// Messages sent from the server to the client (browser).
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the discussion has started.
    Initialized {
        session_id: Uuid,
        topic: String,
        job_title: String,
        roster: Vec<RosterEntry>,
        max_rounds: u32,
    },
    /// A panel member started producing a contribution.
    TurnStarted {
        turn_id: u64,
        speaker_id: String,
        trigger: TurnTrigger,
    },
    TurnEnded {
        turn_id: u64,
        speaker_id: String,
        succeeded: bool,
    },
    Contribution { contribution: Contribution },
    Rounds {
        round_count: u32,
        max_rounds: u32,
        ceiling_reached: bool,
    },
    /// The human talked over an in-flight speaker, or that signal expired.
    Interruption { occurred: bool, remaining_ms: u64 },
    /// Current pending input, including the display-only interim text.
    Input {
        buffer: String,
        interim: String,
        listening: bool,
    },
    /// A submit was refused.
    Rejected { reason: String },
    Finished {
        transcript: Vec<Contribution>,
        interruptions: u32,
        round_count: u32,
    },
    Feedback { feedback: FeedbackData },
    /// Reports an error to the client.
    Error { message: String },
}

impl From<SessionUpdate> for ServerMessage {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::TurnStarted { turn } => ServerMessage::TurnStarted {
                turn_id: turn.id,
                speaker_id: turn.speaker_id,
                trigger: turn.trigger,
            },
            SessionUpdate::TurnEnded {
                turn_id,
                speaker_id,
                succeeded,
            } => ServerMessage::TurnEnded {
                turn_id,
                speaker_id,
                succeeded,
            },
            SessionUpdate::Contribution { contribution } => {
                ServerMessage::Contribution { contribution }
            }
            SessionUpdate::Rounds {
                round_count,
                max_rounds,
                ceiling_reached,
            } => ServerMessage::Rounds {
                round_count,
                max_rounds,
                ceiling_reached,
            },
            SessionUpdate::Interruption { event } => ServerMessage::Interruption {
                occurred: event.occurred,
                remaining_ms: event.remaining_ms,
            },
            SessionUpdate::Input { pending } => ServerMessage::Input {
                buffer: pending.buffer,
                interim: pending.interim,
                listening: pending.listening,
            },
            SessionUpdate::Rejected { reason } => ServerMessage::Rejected { reason },
            SessionUpdate::Finished {
                transcript,
                interruptions,
                round_count,
            } => ServerMessage::Finished {
                transcript,
                interruptions,
                round_count,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossfire_core::input::PendingInput;

    #[test]
    fn test_client_messages_parse() {
        let init: ClientMessage =
            serde_json::from_str(r#"{"type":"init","topic":"定价","job_title":"产品经理"}"#)
                .unwrap();
        assert_eq!(
            init,
            ClientMessage::Init {
                topic: "定价".to_string(),
                job_title: "产品经理".to_string()
            }
        );
        assert!(init.into_input().is_none());

        let submit: ClientMessage = serde_json::from_str(r#"{"type":"submit"}"#).unwrap();
        assert_eq!(submit.into_input(), Some(SessionInput::Submit));

        let dictation: ClientMessage =
            serde_json::from_str(r#"{"type":"dictation_result","interim_text":"你"}"#).unwrap();
        assert_eq!(
            dictation.into_input(),
            Some(SessionInput::Dictation(DictationUpdate {
                final_segments: vec![],
                interim_text: "你".to_string(),
            }))
        );
    }

    #[test]
    fn test_dictation_error_codes_map() {
        let no_speech: ClientMessage =
            serde_json::from_str(r#"{"type":"dictation_error","code":"no-speech"}"#).unwrap();
        assert_eq!(
            no_speech.into_input(),
            Some(SessionInput::DictationFailed(DictationError::NoSpeech))
        );

        let denied: ClientMessage =
            serde_json::from_str(r#"{"type":"dictation_error","code":"not-allowed"}"#).unwrap();
        assert_eq!(
            denied.into_input(),
            Some(SessionInput::DictationFailed(DictationError::Other(
                "not-allowed".to_string()
            )))
        );
    }

    #[test]
    fn test_unknown_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"dance"}"#).is_err());
    }

    #[test]
    fn test_server_message_from_update() {
        let msg: ServerMessage = SessionUpdate::Input {
            pending: PendingInput {
                buffer: "你好".to_string(),
                interim: "世".to_string(),
                listening: true,
            },
        }
        .into();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "input");
        assert_eq!(json["buffer"], "你好");
        assert_eq!(json["interim"], "世");
        assert_eq!(json["listening"], true);

        let rounds: ServerMessage = SessionUpdate::Rounds {
            round_count: 3,
            max_rounds: 20,
            ceiling_reached: false,
        }
        .into();
        let json = serde_json::to_value(&rounds).unwrap();
        assert_eq!(json["type"], "rounds");
        assert_eq!(json["round_count"], 3);
    }
}
