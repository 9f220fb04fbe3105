use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::models::{ContentPart, Item, Response, Session};
use crate::error::ServerError;

/// Inbound frames, one variant per recognized `type` discriminator.
///
/// Frames whose `type` is not recognized, or whose body does not match the
/// expected shape, land in `Unknown` with the raw JSON preserved so that
/// callers can still observe them.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Error {
        event_id: Option<String>,
        error: ServerError,
    },
    SessionCreated {
        event_id: Option<String>,
        session: Session,
    },
    SessionUpdated {
        event_id: Option<String>,
        session: Session,
    },
    SpeechStarted {
        event_id: Option<String>,
        audio_start_ms: Option<u32>,
        item_id: Option<String>,
    },
    SpeechStopped {
        event_id: Option<String>,
        audio_end_ms: Option<u32>,
        item_id: Option<String>,
    },
    ResponseCreated {
        event_id: Option<String>,
        response: Response,
    },
    ResponseAudioDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        /// Base64-encoded PCM16 payload.
        delta: String,
    },
    ResponseAudioDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
    },
    ResponseAudioTranscriptDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        delta: String,
    },
    ResponseAudioTranscriptDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        transcript: String,
    },
    ResponseContentPartAdded {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        part: Option<ContentPart>,
    },
    ResponseContentPartDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        part: Option<ContentPart>,
    },
    ResponseOutputItemAdded {
        event_id: Option<String>,
        response_id: Option<String>,
        output_index: Option<u32>,
        item: Option<Item>,
    },
    ResponseOutputItemDone {
        event_id: Option<String>,
        response_id: Option<String>,
        output_index: Option<u32>,
        item: Option<Item>,
    },
    ResponseDone {
        event_id: Option<String>,
        response: Response,
    },
    ConversationItemCreated {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item: Option<Item>,
    },
    InputAudioTranscriptionCompleted {
        event_id: Option<String>,
        item_id: Option<String>,
        content_index: Option<u32>,
        transcript: String,
    },
    Unknown(Value),
}

impl ServerEvent {
    /// The frame's `type` discriminator, when one is present.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        match self {
            Self::Error { .. } => Some("error"),
            Self::SessionCreated { .. } => Some("session.created"),
            Self::SessionUpdated { .. } => Some("session.updated"),
            Self::SpeechStarted { .. } => Some("input_audio_buffer.speech_started"),
            Self::SpeechStopped { .. } => Some("input_audio_buffer.speech_stopped"),
            Self::ResponseCreated { .. } => Some("response.created"),
            Self::ResponseAudioDelta { .. } => Some("response.audio.delta"),
            Self::ResponseAudioDone { .. } => Some("response.audio.done"),
            Self::ResponseAudioTranscriptDelta { .. } => Some("response.audio_transcript.delta"),
            Self::ResponseAudioTranscriptDone { .. } => Some("response.audio_transcript.done"),
            Self::ResponseContentPartAdded { .. } => Some("response.content_part.added"),
            Self::ResponseContentPartDone { .. } => Some("response.content_part.done"),
            Self::ResponseOutputItemAdded { .. } => Some("response.output_item.added"),
            Self::ResponseOutputItemDone { .. } => Some("response.output_item.done"),
            Self::ResponseDone { .. } => Some("response.done"),
            Self::ConversationItemCreated { .. } => Some("conversation.item.created"),
            Self::InputAudioTranscriptionCompleted { .. } => {
                Some("conversation.item.input_audio_transcription.completed")
            }
            Self::Unknown(value) => value.get("type").and_then(Value::as_str),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ServerEventRepr {
    #[serde(rename = "error")]
    Error {
        event_id: Option<String>,
        error: ServerError,
    },
    #[serde(rename = "session.created")]
    SessionCreated {
        event_id: Option<String>,
        session: Session,
    },
    #[serde(rename = "session.updated")]
    SessionUpdated {
        event_id: Option<String>,
        session: Session,
    },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        event_id: Option<String>,
        audio_start_ms: Option<u32>,
        item_id: Option<String>,
    },
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        event_id: Option<String>,
        audio_end_ms: Option<u32>,
        item_id: Option<String>,
    },
    #[serde(rename = "response.created")]
    ResponseCreated {
        event_id: Option<String>,
        response: Response,
    },
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        delta: String,
    },
    #[serde(rename = "response.audio.done")]
    ResponseAudioDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
    },
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        delta: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        transcript: String,
    },
    #[serde(rename = "response.content_part.added")]
    ResponseContentPartAdded {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        part: Option<ContentPart>,
    },
    #[serde(rename = "response.content_part.done")]
    ResponseContentPartDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: Option<String>,
        output_index: Option<u32>,
        content_index: Option<u32>,
        part: Option<ContentPart>,
    },
    #[serde(rename = "response.output_item.added")]
    ResponseOutputItemAdded {
        event_id: Option<String>,
        response_id: Option<String>,
        output_index: Option<u32>,
        item: Option<Item>,
    },
    #[serde(rename = "response.output_item.done")]
    ResponseOutputItemDone {
        event_id: Option<String>,
        response_id: Option<String>,
        output_index: Option<u32>,
        item: Option<Item>,
    },
    #[serde(rename = "response.done")]
    ResponseDone {
        event_id: Option<String>,
        response: Response,
    },
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item: Option<Item>,
    },
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        event_id: Option<String>,
        item_id: Option<String>,
        content_index: Option<u32>,
        transcript: String,
    },
}

impl From<ServerEventRepr> for ServerEvent {
    fn from(repr: ServerEventRepr) -> Self {
        match repr {
            ServerEventRepr::Error { event_id, error } => Self::Error { event_id, error },
            ServerEventRepr::SessionCreated { event_id, session } => {
                Self::SessionCreated { event_id, session }
            }
            ServerEventRepr::SessionUpdated { event_id, session } => {
                Self::SessionUpdated { event_id, session }
            }
            ServerEventRepr::SpeechStarted { event_id, audio_start_ms, item_id } => {
                Self::SpeechStarted { event_id, audio_start_ms, item_id }
            }
            ServerEventRepr::SpeechStopped { event_id, audio_end_ms, item_id } => {
                Self::SpeechStopped { event_id, audio_end_ms, item_id }
            }
            ServerEventRepr::ResponseCreated { event_id, response } => {
                Self::ResponseCreated { event_id, response }
            }
            ServerEventRepr::ResponseAudioDelta {
                event_id, response_id, item_id, output_index, content_index, delta,
            } => Self::ResponseAudioDelta {
                event_id, response_id, item_id, output_index, content_index, delta,
            },
            ServerEventRepr::ResponseAudioDone {
                event_id, response_id, item_id, output_index, content_index,
            } => Self::ResponseAudioDone {
                event_id, response_id, item_id, output_index, content_index,
            },
            ServerEventRepr::ResponseAudioTranscriptDelta {
                event_id, response_id, item_id, output_index, content_index, delta,
            } => Self::ResponseAudioTranscriptDelta {
                event_id, response_id, item_id, output_index, content_index, delta,
            },
            ServerEventRepr::ResponseAudioTranscriptDone {
                event_id, response_id, item_id, output_index, content_index, transcript,
            } => Self::ResponseAudioTranscriptDone {
                event_id, response_id, item_id, output_index, content_index, transcript,
            },
            ServerEventRepr::ResponseContentPartAdded {
                event_id, response_id, item_id, output_index, content_index, part,
            } => Self::ResponseContentPartAdded {
                event_id, response_id, item_id, output_index, content_index, part,
            },
            ServerEventRepr::ResponseContentPartDone {
                event_id, response_id, item_id, output_index, content_index, part,
            } => Self::ResponseContentPartDone {
                event_id, response_id, item_id, output_index, content_index, part,
            },
            ServerEventRepr::ResponseOutputItemAdded {
                event_id, response_id, output_index, item,
            } => Self::ResponseOutputItemAdded { event_id, response_id, output_index, item },
            ServerEventRepr::ResponseOutputItemDone {
                event_id, response_id, output_index, item,
            } => Self::ResponseOutputItemDone { event_id, response_id, output_index, item },
            ServerEventRepr::ResponseDone { event_id, response } => {
                Self::ResponseDone { event_id, response }
            }
            ServerEventRepr::ConversationItemCreated { event_id, previous_item_id, item } => {
                Self::ConversationItemCreated { event_id, previous_item_id, item }
            }
            ServerEventRepr::InputAudioTranscriptionCompleted {
                event_id, item_id, content_index, transcript,
            } => Self::InputAudioTranscriptionCompleted {
                event_id, item_id, content_index, transcript,
            },
        }
    }
}

impl<'de> Deserialize<'de> for ServerEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match ServerEventRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("unrecognized server event: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}
