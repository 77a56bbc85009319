//! Speech input: single-utterance capture and transcription
//!
//! A thin bridge over a capability that may be absent on the host: callers
//! get an [`Available`](SpeechCapture::Available)/[`Unavailable`](SpeechCapture::Unavailable)
//! value from [`SpeechCapture::detect`] and branch on that, never on a
//! platform global. One capture session runs at a time; it records until the
//! speaker falls silent, transcribes once, emits exactly one final
//! transcript, and returns to idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;
use tokio::sync::mpsc;

use crate::provider::ChatProvider;
use crate::{Error, Result};

/// Capture sample rate (16 kHz, standard for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Minimum RMS energy to classify a chunk as speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Speech required before an utterance can complete (samples at 16 kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that ends an utterance (samples)
const TRAILING_SILENCE_SAMPLES: usize = 9600; // 0.6 seconds

/// Hard cap on one capture session
const MAX_LISTEN: Duration = Duration::from_secs(12);

/// How often buffered samples are drained for endpointing
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Capture session notifications delivered to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent {
    /// Capture began; the bridge is listening
    Started,
    /// The single final transcript of the utterance
    Transcript(String),
    /// Capture ended (with or without a transcript); the bridge is idle
    Stopped,
}

/// RMS energy of a sample block
#[allow(clippy::cast_precision_loss)]
fn energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndpointState {
    /// Waiting for the utterance to begin
    Waiting,
    /// Speech heard, accumulating until trailing silence
    Capturing,
}

/// Energy-based single-utterance endpointing
struct Endpointer {
    state: EndpointState,
    buffer: Vec<f32>,
    speech_samples: usize,
    silence_samples: usize,
}

impl Endpointer {
    fn new() -> Self {
        Self {
            state: EndpointState::Waiting,
            buffer: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Feed captured samples; returns `true` once the utterance is complete
    fn feed(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }
        let is_speech = energy(samples) > ENERGY_THRESHOLD;

        match self.state {
            EndpointState::Waiting => {
                if is_speech {
                    self.state = EndpointState::Capturing;
                    self.buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_samples = 0;
                    tracing::trace!("utterance started");
                }
                false
            }
            EndpointState::Capturing => {
                self.buffer.extend_from_slice(samples);
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += samples.len();
                }

                self.silence_samples >= TRAILING_SILENCE_SAMPLES
                    && self.speech_samples >= MIN_SPEECH_SAMPLES
            }
        }
    }

    /// Whether enough speech was heard to bother transcribing
    fn has_speech(&self) -> bool {
        self.speech_samples >= MIN_SPEECH_SAMPLES
    }

    fn take_utterance(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.buffer)
    }
}

/// Encode captured samples as 16-bit mono WAV for the transcription call
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub(crate) fn utterance_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;
        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let quantized = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(quantized)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Whether a usable capture device exists on this host
fn input_available() -> bool {
    let host = cpal::default_host();
    let Some(device) = host.default_input_device() else {
        return false;
    };
    device
        .supported_input_configs()
        .map(|mut configs| {
            configs.any(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
            })
        })
        .unwrap_or(false)
}

/// Microphone capture on a dedicated worker thread
///
/// The cpal stream lives entirely on the worker; the handle only drains the
/// shared sample buffer. Dropping the handle ends capture.
pub struct Microphone {
    buffer: Arc<Mutex<Vec<f32>>>,
    stop: Arc<AtomicBool>,
}

impl Microphone {
    /// Open the default input device and start capturing
    ///
    /// # Errors
    ///
    /// Returns error if no device exists or the input stream cannot start
    pub fn open() -> Result<Self> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let worker_buffer = Arc::clone(&buffer);
        let worker_stop = Arc::clone(&stop);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        std::thread::spawn(move || {
            let stream = match build_input_stream(&worker_buffer) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            while !worker_stop.load(Ordering::Relaxed) {
                std::thread::sleep(POLL_INTERVAL);
            }
            drop(stream);
        });

        ready_rx
            .recv_timeout(Duration::from_secs(2))
            .map_err(|_| Error::Audio("capture worker did not start".to_string()))??;

        tracing::debug!(sample_rate = CAPTURE_SAMPLE_RATE, "microphone capture started");
        Ok(Self { buffer, stop })
    }

    /// Drain the samples captured since the last call
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Captured samples without draining
    #[must_use]
    pub fn peek(&self) -> Vec<f32> {
        self.buffer.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// Discard buffered samples
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        CAPTURE_SAMPLE_RATE
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn build_input_stream(buffer: &Arc<Mutex<Vec<f32>>>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(CAPTURE_SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(CAPTURE_SAMPLE_RATE)
        })
        .ok_or_else(|| Error::Audio("no suitable input config found".to_string()))?;

    let config = supported
        .with_sample_rate(SampleRate(CAPTURE_SAMPLE_RATE))
        .config();

    let buffer = Arc::clone(buffer);
    device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend_from_slice(data);
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))
}

/// Result of probing the host for speech input
pub enum SpeechCapture {
    /// Capture hardware exists; the bridge is usable
    Available(SpeechListener),
    /// No usable input device on this host
    Unavailable,
}

impl SpeechCapture {
    /// Probe the host and build the bridge if capture is possible
    ///
    /// Session events are delivered on `events`.
    #[must_use]
    pub fn detect(
        provider: Arc<dyn ChatProvider>,
        events: mpsc::UnboundedSender<ListenEvent>,
    ) -> Self {
        if input_available() {
            Self::Available(SpeechListener::new(provider, events))
        } else {
            tracing::debug!("no speech input device detected");
            Self::Unavailable
        }
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

/// The speech-to-text bridge: idle or listening, nothing else
pub struct SpeechListener {
    provider: Arc<dyn ChatProvider>,
    events: mpsc::UnboundedSender<ListenEvent>,
    listening: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
}

impl SpeechListener {
    fn new(provider: Arc<dyn ChatProvider>, events: mpsc::UnboundedSender<ListenEvent>) -> Self {
        Self {
            provider,
            events,
            listening: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Relaxed)
    }

    /// Begin one capture session; a no-op while already listening
    pub fn start(&self) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        let _ = self.events.send(ListenEvent::Started);

        let provider = Arc::clone(&self.provider);
        let events = self.events.clone();
        let listening = Arc::clone(&self.listening);
        let stop_requested = Arc::clone(&self.stop_requested);

        tokio::spawn(async move {
            run_capture(provider, &events, &stop_requested).await;
            listening.store(false, Ordering::SeqCst);
            let _ = events.send(ListenEvent::Stopped);
        });
    }

    /// End the current capture session early
    ///
    /// Audio heard so far is still transcribed if it contains speech.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

/// One capture session: record, endpoint, transcribe once
async fn run_capture(
    provider: Arc<dyn ChatProvider>,
    events: &mpsc::UnboundedSender<ListenEvent>,
    stop_requested: &AtomicBool,
) {
    let mic = match Microphone::open() {
        Ok(mic) => mic,
        Err(e) => {
            tracing::warn!(error = %e, "could not open microphone");
            return;
        }
    };

    let mut endpointer = Endpointer::new();
    let started = Instant::now();

    loop {
        tokio::time::sleep(POLL_INTERVAL).await;

        if endpointer.feed(&mic.take()) {
            break;
        }
        if stop_requested.load(Ordering::SeqCst) {
            break;
        }
        if started.elapsed() > MAX_LISTEN {
            tracing::debug!("capture session timed out");
            break;
        }
    }

    let sample_rate = mic.sample_rate();
    drop(mic);

    if !endpointer.has_speech() {
        tracing::debug!("no speech captured");
        return;
    }

    let wav = match utterance_to_wav(&endpointer.take_utterance(), sample_rate) {
        Ok(wav) => wav,
        Err(e) => {
            tracing::warn!(error = %e, "could not encode utterance");
            return;
        }
    };

    match provider.transcribe(&wav).await {
        Ok(transcript) => {
            let transcript = transcript.trim().to_string();
            if transcript.is_empty() {
                tracing::debug!("empty transcript");
            } else {
                tracing::info!(transcript = %transcript, "transcription complete");
                let _ = events.send(ListenEvent::Transcript(transcript));
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "speech recognition failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(duration_secs: f32) -> Vec<f32> {
        let samples = (CAPTURE_SAMPLE_RATE as f32 * duration_secs) as usize;
        (0..samples)
            .map(|i| {
                let t = i as f32 / CAPTURE_SAMPLE_RATE as f32;
                0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
            })
            .collect()
    }

    fn silence(duration_secs: f32) -> Vec<f32> {
        vec![0.0; (CAPTURE_SAMPLE_RATE as f32 * duration_secs) as usize]
    }

    #[test]
    fn energy_separates_speech_from_silence() {
        assert!(energy(&silence(0.1)) < ENERGY_THRESHOLD);
        assert!(energy(&speech(0.1)) > ENERGY_THRESHOLD);
    }

    #[test]
    fn silence_alone_never_completes() {
        let mut endpointer = Endpointer::new();
        for _ in 0..100 {
            assert!(!endpointer.feed(&silence(0.1)));
        }
        assert!(!endpointer.has_speech());
    }

    #[test]
    fn speech_then_silence_completes() {
        let mut endpointer = Endpointer::new();
        assert!(!endpointer.feed(&speech(0.5)));

        let mut complete = false;
        for _ in 0..10 {
            if endpointer.feed(&silence(0.1)) {
                complete = true;
                break;
            }
        }
        assert!(complete);
        assert!(endpointer.has_speech());
        assert!(!endpointer.take_utterance().is_empty());
    }

    #[test]
    fn short_blip_is_not_enough_speech() {
        let mut endpointer = Endpointer::new();
        endpointer.feed(&speech(0.1));
        for _ in 0..10 {
            assert!(!endpointer.feed(&silence(0.1)));
        }
        assert!(!endpointer.has_speech());
    }

    #[test]
    fn wav_encoding_produces_riff() {
        let wav = utterance_to_wav(&speech(0.2), CAPTURE_SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }
}
