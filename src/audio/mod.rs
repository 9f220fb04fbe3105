//! Microphone capture pipeline.
//!
//! The cpal input callback is the realtime producer; it converts each
//! block to PCM16, measures input levels, and hands the results to the
//! network-facing consumer task over a bounded channel. The two sides
//! share no mutable state — the channel is the only synchronization
//! point.

mod capture;
mod pcm;

pub use capture::{AudioCapture, CaptureConfig, CaptureMessage};
pub use pcm::{ACTIVE_PEAK_THRESHOLD, LevelReading, block_levels, encode_pcm16, pad_to_even};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::client::VoiceLiveClient;
use crate::error::Result;

/// Network-side consumer of encoded audio blocks.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Append one base64-encoded PCM16 block to the input audio buffer.
    async fn append_audio(&self, audio: String) -> Result<()>;
}

#[async_trait]
impl AudioSink for VoiceLiveClient {
    async fn append_audio(&self, audio: String) -> Result<()> {
        self.input_audio_buffer().append(audio, None).await
    }
}

/// Idempotent stop switch for a capture pipeline.
///
/// Shared between the pipeline, the owning client (which trips it on
/// audio protocol violations and on close), and the application. Once
/// stopped it stays stopped.
#[derive(Debug, Clone)]
pub struct CaptureControl {
    tx: Arc<watch::Sender<bool>>,
}

impl CaptureControl {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trip the switch. Returns `true` only for the call that actually
    /// performed the transition, so side effects tied to stopping run
    /// exactly once.
    pub fn stop(&self) -> bool {
        let mut transitioned = false;
        self.tx.send_if_modified(|stopped| {
            if *stopped {
                false
            } else {
                *stopped = true;
                transitioned = true;
                true
            }
        });
        transitioned
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the switch has been tripped (immediately if it
    /// already was).
    pub async fn stopped(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CaptureControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_transitions_exactly_once() {
        let control = CaptureControl::new();
        assert!(!control.is_stopped());
        assert!(control.stop());
        assert!(!control.stop());
        assert!(control.is_stopped());
    }

    #[tokio::test]
    async fn stopped_wakes_waiters() {
        let control = CaptureControl::new();
        let waiter = {
            let control = control.clone();
            tokio::spawn(async move { control.stopped().await })
        };
        control.stop();
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Immediate completion once already stopped.
        tokio::time::timeout(std::time::Duration::from_millis(100), control.stopped())
            .await
            .unwrap();
    }
}
