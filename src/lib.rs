#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Client SDK for the Azure Voice Live realtime API.
//!
//! A [`VoiceLiveClient`] owns one WebSocket session: it runs the protocol
//! state machine, fans inbound events out to subscribers, and exposes
//! typed command builders for every outbound verb. [`VoiceSession`] layers
//! the full lifecycle on top — connection establishment with backoff,
//! session configuration, microphone streaming, and domain callbacks.
//!
//! ```no_run
//! use voicelive_rs::{ConnectionConfig, SessionCallbacks, VoiceSession};
//!
//! # async fn run() -> voicelive_rs::Result<()> {
//! let config = ConnectionConfig::new(
//!     "https://my-resource.cognitiveservices.azure.com",
//!     std::env::var("VOICELIVE_API_KEY").unwrap_or_default(),
//!     "gpt-4o-realtime-preview",
//! )
//! .with_voice("en-US-AvaNeural");
//!
//! let mut session = VoiceSession::new(config).callbacks(
//!     SessionCallbacks::new()
//!         .on_agent_message(|text| println!("agent: {text}"))
//!         .on_user_speech(|speaking| println!("user speaking: {speaking}"))
//!         .on_error(|message| eprintln!("error: {message}")),
//! );
//!
//! session.start().await?;
//! // ... converse ...
//! session.end().await?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

pub use audio::{AudioCapture, AudioSink, CaptureConfig, CaptureControl, LevelReading};
pub use client::{ConnectionState, SessionEvent, VoiceLiveClient};
pub use config::ConnectionConfig;
pub use error::{ApiErrorType, ConnectionErrorKind, Error, Result, ServerError};
pub use protocol::client_events::ClientEvent;
pub use protocol::models::{
    AudioFormat, ContentPart, InputAudioTranscription, Item, Modality, ResponseParams, Role,
    SessionConfig, TurnDetection, VoiceSelection,
};
pub use protocol::server_events::ServerEvent;
pub use retry::{RetryPolicy, establish};
pub use session::{SessionCallbacks, VoiceSession};
