//! Typed builders for outbound protocol commands.
//!
//! One facade per resource, one method per verb; each builds a
//! [`ClientEvent`] and delegates to [`VoiceLiveClient::send`]. No local
//! validation beyond required fields — the backend is authoritative.

use crate::client::VoiceLiveClient;
use crate::error::Result;
use crate::protocol::client_events::ClientEvent;
use crate::protocol::models::{Item, ResponseParams, SessionConfig};

impl VoiceLiveClient {
    #[must_use]
    pub const fn session(&self) -> SessionResource<'_> {
        SessionResource { client: self }
    }

    #[must_use]
    pub const fn response(&self) -> ResponseResource<'_> {
        ResponseResource { client: self }
    }

    #[must_use]
    pub const fn input_audio_buffer(&self) -> InputAudioBufferResource<'_> {
        InputAudioBufferResource { client: self }
    }

    #[must_use]
    pub const fn output_audio_buffer(&self) -> OutputAudioBufferResource<'_> {
        OutputAudioBufferResource { client: self }
    }

    #[must_use]
    pub const fn conversation(&self) -> ConversationResource<'_> {
        ConversationResource { client: self }
    }
}

pub struct SessionResource<'a> {
    client: &'a VoiceLiveClient,
}

impl SessionResource<'_> {
    /// Send `session.update`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn update(&self, session: SessionConfig, event_id: Option<String>) -> Result<()> {
        self.client
            .send(ClientEvent::SessionUpdate {
                event_id,
                session: Box::new(session),
            })
            .await
    }
}

pub struct ResponseResource<'a> {
    client: &'a VoiceLiveClient,
}

impl ResponseResource<'_> {
    /// Send `response.create`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn create(
        &self,
        response: Option<ResponseParams>,
        event_id: Option<String>,
        additional_instructions: Option<String>,
    ) -> Result<()> {
        self.client
            .send(ClientEvent::ResponseCreate {
                event_id,
                response: response.map(Box::new),
                additional_instructions,
            })
            .await
    }

    /// Send `response.cancel`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn cancel(
        &self,
        response_id: Option<String>,
        event_id: Option<String>,
    ) -> Result<()> {
        self.client
            .send(ClientEvent::ResponseCancel {
                event_id,
                response_id,
            })
            .await
    }
}

pub struct InputAudioBufferResource<'a> {
    client: &'a VoiceLiveClient,
}

impl InputAudioBufferResource<'_> {
    /// Send `input_audio_buffer.append` with a base64 PCM16 payload.
    /// Requires the `Ready` state.
    ///
    /// # Errors
    /// Returns `NotConnected` before the session is ready, or a transport
    /// error if the send fails.
    pub async fn append(&self, audio: String, event_id: Option<String>) -> Result<()> {
        self.client
            .send(ClientEvent::InputAudioBufferAppend { event_id, audio })
            .await
    }

    /// Send `input_audio_buffer.commit`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn commit(&self, event_id: Option<String>) -> Result<()> {
        self.client
            .send(ClientEvent::InputAudioBufferCommit { event_id })
            .await
    }

    /// Send `input_audio_buffer.clear`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn clear(&self, event_id: Option<String>) -> Result<()> {
        self.client
            .send(ClientEvent::InputAudioBufferClear { event_id })
            .await
    }
}

pub struct OutputAudioBufferResource<'a> {
    client: &'a VoiceLiveClient,
}

impl OutputAudioBufferResource<'_> {
    /// Send `output_audio_buffer.clear`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn clear(&self, event_id: Option<String>) -> Result<()> {
        self.client
            .send(ClientEvent::OutputAudioBufferClear { event_id })
            .await
    }
}

pub struct ConversationResource<'a> {
    client: &'a VoiceLiveClient,
}

impl<'a> ConversationResource<'a> {
    #[must_use]
    pub const fn item(&self) -> ConversationItemResource<'a> {
        ConversationItemResource {
            client: self.client,
        }
    }
}

pub struct ConversationItemResource<'a> {
    client: &'a VoiceLiveClient,
}

impl ConversationItemResource<'_> {
    /// Send `conversation.item.create`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn create(
        &self,
        item: Item,
        previous_item_id: Option<String>,
        event_id: Option<String>,
    ) -> Result<()> {
        self.client
            .send(ClientEvent::ConversationItemCreate {
                event_id,
                previous_item_id,
                item: Box::new(item),
            })
            .await
    }

    /// Send `conversation.item.delete`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn delete(&self, item_id: String, event_id: Option<String>) -> Result<()> {
        self.client
            .send(ClientEvent::ConversationItemDelete { event_id, item_id })
            .await
    }

    /// Send `conversation.item.truncate`.
    ///
    /// # Errors
    /// Returns an error if the client is not connected or the send fails.
    pub async fn truncate(
        &self,
        item_id: String,
        audio_end_ms: u32,
        content_index: u32,
        event_id: Option<String>,
    ) -> Result<()> {
        self.client
            .send(ClientEvent::ConversationItemTruncate {
                event_id,
                item_id,
                content_index,
                audio_end_ms,
            })
            .await
    }
}
