//! High-level session facade.
//!
//! [`VoiceSession`] wires connection establishment, session
//! configuration, audio capture, and domain-level callbacks into an
//! initialize / start / end lifecycle. It owns its client explicitly;
//! there is no ambient singleton.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::audio::{AudioCapture, AudioSink, CaptureConfig};
use crate::client::{SessionEvent, VoiceLiveClient};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::protocol::models::{
    AudioFormat, InputAudioTranscription, Item, Modality, ResponseParams, SessionConfig,
    TurnDetection, VoiceSelection,
};
use crate::protocol::server_events::ServerEvent;
use crate::retry::{self, RetryPolicy};

const OVERLOAD_HINT: &str =
    "The voice backend appears to be overloaded. Please wait a moment and try again.";

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Domain-level callbacks, each a pure projection of one server event.
#[derive(Default)]
pub struct SessionCallbacks {
    on_agent_message: Option<Callback<String>>,
    on_user_speech: Option<Callback<bool>>,
    on_error: Option<Callback<String>>,
}

impl SessionCallbacks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the transcript of each completed agent utterance.
    #[must_use]
    pub fn on_agent_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_agent_message = Some(Box::new(callback));
        self
    }

    /// Called with `true` when the user starts speaking and `false` when
    /// they stop.
    #[must_use]
    pub fn on_user_speech<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.on_user_speech = Some(Box::new(callback));
        self
    }

    /// Called with the message text of backend and parse errors.
    #[must_use]
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    fn agent_message(&self, text: String) {
        if let Some(callback) = &self.on_agent_message {
            callback(text);
        }
    }

    fn user_speech(&self, speaking: bool) {
        if let Some(callback) = &self.on_user_speech {
            callback(speaking);
        }
    }

    fn error(&self, message: String) {
        if let Some(callback) = &self.on_error {
            callback(message);
        }
    }
}

/// One voice conversation, from connect to teardown.
pub struct VoiceSession {
    config: ConnectionConfig,
    policy: RetryPolicy,
    instructions: Option<String>,
    callbacks: Arc<SessionCallbacks>,
    client: Option<Arc<VoiceLiveClient>>,
    capture: Option<AudioCapture>,
    relay: Option<JoinHandle<()>>,
}

impl VoiceSession {
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            policy: RetryPolicy::default(),
            instructions: None,
            callbacks: Arc::new(SessionCallbacks::new()),
            client: None,
            capture: None,
            relay: None,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// System instructions applied through the initial `session.update`.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn callbacks(mut self, callbacks: SessionCallbacks) -> Self {
        self.callbacks = Arc::new(callbacks);
        self
    }

    /// The underlying client, when a session is live.
    #[must_use]
    pub fn client(&self) -> Option<&Arc<VoiceLiveClient>> {
        self.client.as_ref()
    }

    /// Establish a connection (with retry), wait for readiness, and apply
    /// the session configuration.
    ///
    /// # Errors
    /// Surfaces establishment failures after retries are exhausted; an
    /// overload hint goes to the error callback when the failure
    /// indicates backend resource exhaustion.
    pub async fn initialize(&mut self) -> Result<()> {
        let client = match retry::establish(&self.config, self.policy).await {
            Ok(client) => client,
            Err(err) => {
                if matches!(err, Error::RetriesExhausted { .. }) || err.is_resource_exhausted() {
                    self.callbacks.error(OVERLOAD_HINT.to_string());
                }
                return Err(err);
            }
        };

        client
            .session()
            .update(self.session_config(), None)
            .await?;

        let client = Arc::new(client);
        self.spawn_relay(&client);
        self.client = Some(client);
        tracing::info!("voice session initialized");
        Ok(())
    }

    /// Start (or resume) the session and begin streaming microphone
    /// audio. Idempotent: reconnects when no live client exists, waits
    /// for readiness, and leaves an already-running capture in place.
    ///
    /// # Errors
    /// Returns establishment, readiness, or audio device errors.
    pub async fn start(&mut self) -> Result<()> {
        let needs_connect = self.client.as_ref().is_none_or(|client| !client.connected());
        if needs_connect {
            self.end().await?;
            self.initialize().await?;
        }

        let Some(client) = self.client.clone() else {
            return Err(Error::ConnectionClosed);
        };
        client.wait_for_ready().await?;

        if self.capture.as_ref().is_none_or(AudioCapture::is_stopped) {
            let capture = AudioCapture::start(
                Arc::clone(&client) as Arc<dyn AudioSink>,
                client.renew_capture_control(),
                CaptureConfig::default(),
            )
            .await?;
            self.capture = Some(capture);
        }
        tracing::info!("voice session started");
        Ok(())
    }

    /// Stop audio capture, close the socket, and release the client.
    /// Safe to call at any point in the lifecycle.
    ///
    /// # Errors
    /// Returns a transport error if the close frame cannot be written.
    pub async fn end(&mut self) -> Result<()> {
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(relay) = self.relay.take() {
            relay.abort();
        }
        if let Some(client) = self.client.take() {
            client.close().await?;
            tracing::info!("voice session ended");
        }
        Ok(())
    }

    /// Alias for [`end`](Self::end).
    ///
    /// # Errors
    /// See [`end`](Self::end).
    pub async fn stop(&mut self) -> Result<()> {
        self.end().await
    }

    /// Add a user text message to the conversation and request a
    /// response.
    ///
    /// # Errors
    /// Returns an error if no session is live or a send fails.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        let client = self.require_client()?;
        client
            .conversation()
            .item()
            .create(Item::user_text(text), None, None)
            .await?;
        client.response().create(None, None, None).await
    }

    /// Inject an assistant message and have the backend speak it.
    ///
    /// # Errors
    /// Returns an error if no session is live or a send fails.
    pub async fn speak(&self, text: &str) -> Result<()> {
        let client = self.require_client()?;
        client
            .conversation()
            .item()
            .create(Item::assistant_text(text), None, None)
            .await?;
        let params = ResponseParams {
            modalities: Some(vec![Modality::Text, Modality::Audio]),
            ..Default::default()
        };
        client
            .response()
            .create(
                Some(params),
                None,
                Some(format!(
                    "Speak this exact message naturally and warmly: \"{text}\""
                )),
            )
            .await
    }

    /// Cancel the in-flight response and clear buffered output audio.
    ///
    /// # Errors
    /// Returns an error if no session is live or a send fails.
    pub async fn interrupt(&self) -> Result<()> {
        let client = self.require_client()?;
        client.response().cancel(None, None).await?;
        client.output_audio_buffer().clear(None).await
    }

    fn require_client(&self) -> Result<&Arc<VoiceLiveClient>> {
        self.client.as_ref().ok_or(Error::ConnectionClosed)
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = default_session_config(&self.config);
        config.instructions.clone_from(&self.instructions);
        config
    }

    fn spawn_relay(&mut self, client: &VoiceLiveClient) {
        let mut events = client.subscribe();
        let callbacks = Arc::clone(&self.callbacks);
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => project_event(&callbacks, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session event relay lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        if let Some(previous) = self.relay.replace(handle) {
            previous.abort();
        }
    }
}

/// The fixed session configuration applied on initialize.
fn default_session_config(config: &ConnectionConfig) -> SessionConfig {
    SessionConfig {
        modalities: Some(vec![Modality::Text, Modality::Audio]),
        voice: config
            .voice
            .as_ref()
            .map(|name| VoiceSelection::azure_standard(name.clone())),
        input_audio_format: Some(AudioFormat::Pcm16),
        output_audio_format: Some(AudioFormat::Pcm16),
        input_audio_transcription: Some(InputAudioTranscription {
            model: "whisper-1".to_string(),
        }),
        turn_detection: Some(TurnDetection {
            kind: "azure_semantic_vad".to_string(),
            threshold: Some(0.3),
            prefix_padding_ms: Some(200),
            silence_duration_ms: Some(500),
        }),
        max_response_output_tokens: Some(4096),
        temperature: Some(0.7),
        ..SessionConfig::default()
    }
}

fn project_event(callbacks: &SessionCallbacks, event: &SessionEvent) {
    match event {
        SessionEvent::Server(ServerEvent::SpeechStarted { .. }) => callbacks.user_speech(true),
        SessionEvent::Server(ServerEvent::SpeechStopped { .. }) => callbacks.user_speech(false),
        SessionEvent::Server(ServerEvent::ResponseAudioTranscriptDone { transcript, .. }) => {
            callbacks.agent_message(transcript.clone());
        }
        SessionEvent::Server(ServerEvent::Error { error, .. }) => {
            callbacks.error(error.message.clone());
        }
        SessionEvent::SerializationError { message } => callbacks.error(message.clone()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiErrorType, ServerError};
    use std::sync::Mutex;

    #[test]
    fn default_config_matches_the_fixed_profile() {
        let connection =
            ConnectionConfig::new("https://example", "key", "model").with_voice("en-US-AvaNeural");
        let session = default_session_config(&connection);

        assert_eq!(
            session.modalities,
            Some(vec![Modality::Text, Modality::Audio])
        );
        assert_eq!(session.input_audio_format, Some(AudioFormat::Pcm16));
        assert_eq!(session.output_audio_format, Some(AudioFormat::Pcm16));
        assert_eq!(
            session.voice,
            Some(VoiceSelection::azure_standard("en-US-AvaNeural"))
        );
        assert_eq!(
            session
                .input_audio_transcription
                .as_ref()
                .map(|t| t.model.as_str()),
            Some("whisper-1")
        );
        let turn = session.turn_detection.unwrap();
        assert_eq!(turn.kind, "azure_semantic_vad");
        assert_eq!(turn.threshold, Some(0.3));
        assert_eq!(turn.prefix_padding_ms, Some(200));
        assert_eq!(turn.silence_duration_ms, Some(500));
        assert_eq!(session.max_response_output_tokens, Some(4096));
        assert_eq!(session.temperature, Some(0.7));
    }

    #[test]
    fn voiceless_config_omits_the_selector() {
        let connection = ConnectionConfig::new("https://example", "key", "model");
        let session = default_session_config(&connection);
        assert!(session.voice.is_none());
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("voice").is_none());
    }

    fn recording_callbacks() -> (SessionCallbacks, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let agent_log = Arc::clone(&log);
        let speech_log = Arc::clone(&log);
        let error_log = Arc::clone(&log);
        let callbacks = SessionCallbacks::new()
            .on_agent_message(move |text| agent_log.lock().unwrap().push(format!("agent:{text}")))
            .on_user_speech(move |speaking| {
                speech_log.lock().unwrap().push(format!("speech:{speaking}"));
            })
            .on_error(move |message| error_log.lock().unwrap().push(format!("error:{message}")));
        (callbacks, log)
    }

    #[test]
    fn events_project_onto_domain_callbacks() {
        let (callbacks, log) = recording_callbacks();

        project_event(
            &callbacks,
            &SessionEvent::Server(ServerEvent::SpeechStarted {
                event_id: None,
                audio_start_ms: Some(10),
                item_id: None,
            }),
        );
        project_event(
            &callbacks,
            &SessionEvent::Server(ServerEvent::SpeechStopped {
                event_id: None,
                audio_end_ms: Some(900),
                item_id: None,
            }),
        );
        project_event(
            &callbacks,
            &SessionEvent::Server(ServerEvent::ResponseAudioTranscriptDone {
                event_id: None,
                response_id: None,
                item_id: None,
                output_index: None,
                content_index: None,
                transcript: "hello there".to_string(),
            }),
        );
        project_event(
            &callbacks,
            &SessionEvent::Server(ServerEvent::Error {
                event_id: None,
                error: ServerError {
                    error_type: ApiErrorType::ServerError,
                    code: None,
                    message: "backend hiccup".to_string(),
                    param: None,
                    event_id: None,
                },
            }),
        );

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "speech:true".to_string(),
                "speech:false".to_string(),
                "agent:hello there".to_string(),
                "error:backend hiccup".to_string(),
            ]
        );
    }

    #[test]
    fn unrelated_events_do_not_fire_callbacks() {
        let (callbacks, log) = recording_callbacks();
        project_event(
            &callbacks,
            &SessionEvent::Server(ServerEvent::Unknown(serde_json::json!({
                "type": "rate_limits.updated"
            }))),
        );
        project_event(
            &callbacks,
            &SessionEvent::Disconnected {
                code: 1000,
                reason: "Normal closure".to_string(),
            },
        );
        assert!(log.lock().unwrap().is_empty());
    }
}
