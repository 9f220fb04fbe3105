use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::{broadcast, mpsc, oneshot};

use super::pcm::{LevelReading, block_levels, encode_pcm16, fold_to_mono, pad_to_even};
use super::{AudioSink, CaptureControl};
use crate::error::{Error, Result};

/// Level messages are produced every Nth block, not every block.
const LEVEL_BLOCK_INTERVAL: u64 = 5;
const LEVEL_CHANNEL_CAPACITY: usize = 32;

/// Fixed capture profile. The backend expects 24 kHz mono PCM16; devices
/// that cannot open an input stream at this rate are rejected rather than
/// resampled.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Bound on the producer/consumer channel. When the consumer falls
    /// behind, the realtime callback drops blocks instead of blocking.
    pub queue_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            channels: 1,
            queue_capacity: 32,
        }
    }
}

/// Messages crossing from the realtime callback to the consumer task.
#[derive(Debug, Clone)]
pub enum CaptureMessage {
    Level(LevelReading),
    Block {
        /// Monotonically increasing block counter, for diagnostics only;
        /// delivery order is already FIFO.
        seq: u64,
        /// PCM16 bytes, always even length.
        pcm: Vec<u8>,
    },
}

/// Running microphone capture pipeline.
///
/// Owns a dedicated thread that keeps the cpal input stream alive and a
/// tokio task that forwards encoded blocks to the [`AudioSink`]. Both
/// wind down when the shared [`CaptureControl`] trips.
#[derive(Debug)]
pub struct AudioCapture {
    control: CaptureControl,
    levels_tx: broadcast::Sender<LevelReading>,
}

impl AudioCapture {
    /// Acquire the default input device and start streaming to `sink`.
    ///
    /// # Errors
    /// Returns `AudioCapture` if no input device is available, the stream
    /// cannot be built at the capture profile, or `control` was already
    /// stopped.
    pub async fn start(
        sink: Arc<dyn AudioSink>,
        control: CaptureControl,
        config: CaptureConfig,
    ) -> Result<Self> {
        if control.is_stopped() {
            return Err(Error::AudioCapture(
                "capture control already stopped for this session".to_string(),
            ));
        }

        let (msg_tx, msg_rx) = mpsc::channel(config.queue_capacity);
        let (init_tx, init_rx) = oneshot::channel();
        let (park_tx, park_rx) = std::sync::mpsc::channel::<()>();

        // The cpal stream is not Send, so a dedicated thread builds it,
        // keeps it alive, and drops it when the control trips.
        {
            let control = control.clone();
            tokio::spawn(async move {
                control.stopped().await;
                let _ = park_tx.send(());
            });
        }

        let spawned = std::thread::Builder::new()
            .name("voicelive-capture".to_string())
            .spawn(move || match build_input_stream(&config, &msg_tx) {
                Ok(stream) => {
                    if let Err(err) = stream.play() {
                        let _ = init_tx.send(Err(Error::AudioCapture(err.to_string())));
                        return;
                    }
                    let _ = init_tx.send(Ok(()));
                    let _ = park_rx.recv();
                    drop(stream);
                    tracing::debug!("audio capture thread exited");
                }
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                }
            });
        if let Err(err) = spawned {
            control.stop();
            return Err(Error::AudioCapture(err.to_string()));
        }

        let init = match init_rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::AudioCapture(
                "capture thread died during startup".to_string(),
            )),
        };
        if let Err(err) = init {
            // Release the waker task parked on the control.
            control.stop();
            return Err(err);
        }

        let (levels_tx, _) = broadcast::channel(LEVEL_CHANNEL_CAPACITY);
        tokio::spawn(run_consumer(
            msg_rx,
            sink,
            control.clone(),
            levels_tx.clone(),
        ));

        tracing::info!("audio capture started");
        Ok(Self { control, levels_tx })
    }

    /// Input level readings, for UI metering.
    #[must_use]
    pub fn subscribe_levels(&self) -> broadcast::Receiver<LevelReading> {
        self.levels_tx.subscribe()
    }

    /// Stop capturing. Idempotent; safe to call any number of times.
    pub fn stop(&self) {
        if self.control.stop() {
            tracing::info!("audio capture stopped");
        }
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.control.stop();
    }
}

fn build_input_stream(
    config: &CaptureConfig,
    msg_tx: &mpsc::Sender<CaptureMessage>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::AudioCapture("no default input device".to_string()))?;
    tracing::debug!(
        device = %device.name().unwrap_or_else(|_| "<unknown>".to_string()),
        sample_rate = config.sample_rate,
        channels = config.channels,
        "opening input stream"
    );

    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let channels = usize::from(config.channels);
    let tx = msg_tx.clone();
    let mut seq: u64 = 0;
    let mut blocks: u64 = 0;
    let mut dropped: u64 = 0;

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                let folded;
                let samples = if channels > 1 {
                    folded = fold_to_mono(data, channels);
                    &folded[..]
                } else {
                    data
                };

                blocks += 1;
                if blocks % LEVEL_BLOCK_INTERVAL == 0 {
                    let _ = tx.try_send(CaptureMessage::Level(block_levels(samples)));
                }

                let mut pcm = encode_pcm16(samples);
                pad_to_even(&mut pcm);
                let message = CaptureMessage::Block { seq, pcm };
                seq = seq.wrapping_add(1);
                if tx.try_send(message).is_err() {
                    dropped += 1;
                    if dropped.is_power_of_two() {
                        tracing::warn!(dropped, "audio consumer behind; dropping blocks");
                    }
                }
            },
            |err| tracing::error!("audio input stream error: {err}"),
            None,
        )
        .map_err(|err| Error::AudioCapture(err.to_string()))?;

    Ok(stream)
}

/// Network-side half of the pipeline: encode each block to base64 and
/// append it through the sink. A not-connected failure stops the whole
/// pipeline so a dead session does not generate a flood of failed sends.
pub(crate) async fn run_consumer(
    mut rx: mpsc::Receiver<CaptureMessage>,
    sink: Arc<dyn AudioSink>,
    control: CaptureControl,
    levels_tx: broadcast::Sender<LevelReading>,
) {
    loop {
        tokio::select! {
            () = control.stopped() => break,
            msg = rx.recv() => match msg {
                Some(CaptureMessage::Level(level)) => {
                    tracing::trace!(
                        samples = level.samples,
                        average = level.average,
                        peak = level.peak,
                        active = level.active,
                        "input level"
                    );
                    let _ = levels_tx.send(level);
                }
                Some(CaptureMessage::Block { seq, pcm }) => {
                    let audio = STANDARD.encode(&pcm);
                    match sink.append_audio(audio).await {
                        Ok(()) => tracing::trace!(seq, bytes = pcm.len(), "appended audio block"),
                        Err(Error::NotConnected { .. }) => {
                            tracing::warn!("append failed while not connected; stopping capture");
                            control.stop();
                            break;
                        }
                        Err(err) => tracing::warn!("failed to append audio block: {err}"),
                    }
                }
                None => break,
            }
        }
    }
    tracing::debug!("audio consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ConnectionState;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    struct RecordingSink {
        appended: Mutex<Vec<String>>,
        fail_not_connected: bool,
    }

    #[async_trait]
    impl AudioSink for RecordingSink {
        async fn append_audio(&self, audio: String) -> Result<()> {
            if self.fail_not_connected {
                return Err(Error::NotConnected {
                    state: ConnectionState::Closed,
                });
            }
            self.appended.lock().unwrap().push(audio);
            Ok(())
        }
    }

    #[tokio::test]
    async fn consumer_encodes_blocks_and_forwards_levels() {
        let sink = Arc::new(RecordingSink {
            appended: Mutex::new(Vec::new()),
            fail_not_connected: false,
        });
        let control = CaptureControl::new();
        let (tx, rx) = mpsc::channel(8);
        let (levels_tx, mut levels_rx) = broadcast::channel(8);

        let consumer = tokio::spawn(run_consumer(
            rx,
            Arc::clone(&sink) as Arc<dyn AudioSink>,
            control.clone(),
            levels_tx,
        ));

        tx.send(CaptureMessage::Level(block_levels(&[0.5, -0.5])))
            .await
            .unwrap();
        tx.send(CaptureMessage::Block {
            seq: 0,
            pcm: vec![1, 2, 3, 4],
        })
        .await
        .unwrap();

        let level = timeout(Duration::from_secs(1), levels_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(level.active);

        drop(tx);
        timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();

        let appended = sink.appended.lock().unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended[0], STANDARD.encode([1u8, 2, 3, 4]));
    }

    #[tokio::test]
    async fn consumer_self_stops_when_sink_is_not_connected() {
        let sink = Arc::new(RecordingSink {
            appended: Mutex::new(Vec::new()),
            fail_not_connected: true,
        });
        let control = CaptureControl::new();
        let (tx, rx) = mpsc::channel(8);
        let (levels_tx, _) = broadcast::channel(8);

        let consumer = tokio::spawn(run_consumer(
            rx,
            sink as Arc<dyn AudioSink>,
            control.clone(),
            levels_tx,
        ));

        tx.send(CaptureMessage::Block {
            seq: 0,
            pcm: vec![0, 0],
        })
        .await
        .unwrap();

        timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(control.is_stopped());
    }

    #[tokio::test]
    async fn start_refuses_a_stopped_control() {
        let sink = Arc::new(RecordingSink {
            appended: Mutex::new(Vec::new()),
            fail_not_connected: false,
        });
        let control = CaptureControl::new();
        control.stop();

        let err = AudioCapture::start(sink, control, CaptureConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AudioCapture(_)));
    }
}
