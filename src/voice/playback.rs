//! Speech output: PCM decoding and gap-free sequential playback
//!
//! Clips are sequenced by a monotonic cursor rather than a queue of futures:
//! each clip starts at `max(clock_now, cursor)` and the cursor advances by
//! the clip's duration, so replies play strictly in schedule order without
//! overlap even when synthesis calls resolve out of order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::Engine as _;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use uuid::Uuid;

use crate::config::VoiceConfig;
use crate::provider::ChatProvider;
use crate::{Error, Result};

/// Reverse the provider's base64 audio transport encoding
///
/// # Errors
///
/// Returns error if the payload is not valid base64
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| Error::Tts(format!("invalid audio payload: {e}")))
}

/// Decoded audio, one normalized `f32` frame array per channel
#[derive(Debug, Clone)]
pub struct AudioClip {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioClip {
    /// Decode interleaved little-endian 16-bit signed PCM
    ///
    /// Samples are normalized to `[-1, 1]` by dividing by 32768 and
    /// de-interleaved into per-channel frames.
    ///
    /// # Errors
    ///
    /// Returns error on a zero channel count or a byte sequence that does
    /// not align to whole frames
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32, channel_count: usize) -> Result<Self> {
        if channel_count == 0 {
            return Err(Error::Audio("channel count must be non-zero".to_string()));
        }
        if bytes.len() % 2 != 0 {
            return Err(Error::Audio("PCM payload is not 16-bit aligned".to_string()));
        }
        let sample_count = bytes.len() / 2;
        if sample_count % channel_count != 0 {
            return Err(Error::Audio(
                "PCM payload does not align to whole frames".to_string(),
            ));
        }

        let frame_count = sample_count / channel_count;
        let mut channels = vec![Vec::with_capacity(frame_count); channel_count];

        for (index, pair) in bytes.chunks_exact(2).enumerate() {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            channels[index % channel_count].push(f32::from(sample) / 32768.0);
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Build a clip from already-decoded per-channel frames
    ///
    /// # Errors
    ///
    /// Returns error if no channels are given or channel lengths differ
    pub fn from_frames(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        let Some(first) = channels.first() else {
            return Err(Error::Audio("clip needs at least one channel".to_string()));
        };
        if channels.iter().any(|c| c.len() != first.len()) {
            return Err(Error::Audio("channel lengths differ".to_string()));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Frames per channel
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Playback length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }
}

/// The playback timeline: a monotonic cursor plus the set of clips that are
/// scheduled or playing
///
/// Pure bookkeeping, separated from the audio device so sequencing is
/// testable without hardware.
#[derive(Debug, Default)]
pub struct Timeline {
    cursor: f64,
    active: HashSet<Uuid>,
}

impl Timeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next playback slot for a clip of `duration` seconds
    ///
    /// Returns the clip handle and its start time: `max(now, cursor)`. The
    /// cursor advances to `start + duration`.
    pub fn schedule(&mut self, now: f64, duration: f64) -> (Uuid, f64) {
        let start = now.max(self.cursor);
        self.cursor = start + duration;

        let id = Uuid::new_v4();
        self.active.insert(id);
        (id, start)
    }

    /// Mark a clip as finished, removing it from the active set
    pub fn finish(&mut self, id: Uuid) {
        self.active.remove(&id);
    }

    /// Drop every active clip and reset the cursor to zero
    pub fn stop_all(&mut self) {
        self.active.clear();
        self.cursor = 0.0;
    }

    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Interleave a clip's frames for a device with `out_channels` channels
///
/// A mono clip is duplicated across output channels; a multi-channel clip
/// played to mono is averaged.
fn interleave(clip: &AudioClip, out_channels: usize) -> Vec<f32> {
    let frames = clip.frame_count();
    let channels = clip.channels();
    let mut out = Vec::with_capacity(frames * out_channels);

    #[allow(clippy::cast_precision_loss)]
    for frame in 0..frames {
        if out_channels == 1 && channels.len() > 1 {
            let sum: f32 = channels.iter().map(|c| c[frame]).sum();
            out.push(sum / channels.len() as f32);
        } else {
            for channel in 0..out_channels {
                let source = channel.min(channels.len() - 1);
                out.push(channels[source][frame]);
            }
        }
    }

    out
}

/// Plays decoded clips on the default output device
#[derive(Clone)]
pub struct AudioOutput {
    config: StreamConfig,
}

impl AudioOutput {
    /// Probe the default output device for a config at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no output device or no suitable config exists
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .or_else(|| {
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio output initialized"
        );

        Ok(Self { config })
    }

    /// Play one clip to completion, blocking the calling thread
    ///
    /// Setting `cancel` stops playback at the next buffer boundary.
    ///
    /// # Errors
    ///
    /// Returns error if the output stream cannot be built or started
    pub fn play(&self, clip: &AudioClip, cancel: &Arc<AtomicBool>) -> Result<()> {
        let samples = interleave(clip, usize::from(self.config.channels));
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let config = self.config.clone();
        let sample_rate = self.config.sample_rate.0;

        let samples = Arc::new(samples);
        let position = Arc::new(Mutex::new(0usize));
        let finished = Arc::new(AtomicBool::new(false));

        let samples_cb = Arc::clone(&samples);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);
        let cancel_cb = Arc::clone(cancel);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_cb.lock().unwrap();
                    if cancel_cb.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        finished_cb.store(true, Ordering::Relaxed);
                        return;
                    }
                    for out in data.iter_mut() {
                        if *pos < samples_cb.len() {
                            *out = samples_cb[*pos];
                            *pos += 1;
                        } else {
                            *out = 0.0;
                            finished_cb.store(true, Ordering::Relaxed);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (samples.len() as u64 * 1000) / u64::from(sample_rate).max(1);
        let timeout = Duration::from_millis(duration_ms + 500);
        let started = Instant::now();

        while !finished.load(Ordering::Relaxed) {
            if started.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        drop(stream);
        Ok(())
    }
}

/// The speech output pipeline: synthesis, decode, scheduled playback
///
/// Owns the playback timeline and its audio clock; scoped to one logged-in
/// user in one process.
pub struct Speaker {
    provider: Arc<dyn ChatProvider>,
    voice: String,
    sample_rate: u32,
    output: AudioOutput,
    epoch: Instant,
    timeline: Arc<Mutex<Timeline>>,
    cancels: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl Speaker {
    /// Create the pipeline, probing the output device
    ///
    /// # Errors
    ///
    /// Returns error if no usable output device exists
    pub fn new(provider: Arc<dyn ChatProvider>, voice: &VoiceConfig) -> Result<Self> {
        let output = AudioOutput::new(voice.sample_rate)?;

        Ok(Self {
            provider,
            voice: voice.tts_voice.clone(),
            sample_rate: voice.sample_rate,
            output,
            epoch: Instant::now(),
            timeline: Arc::new(Mutex::new(Timeline::new())),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Synthesize `text` and schedule it onto the playback timeline
    ///
    /// Best-effort: every failure is logged and swallowed.
    pub async fn speak(&self, text: &str) {
        let Some(encoded) = self.synthesize(text).await else {
            return;
        };

        let clip = decode_base64(&encoded)
            .and_then(|bytes| AudioClip::from_pcm16(&bytes, self.sample_rate, 1));
        match clip {
            Ok(clip) => self.schedule(clip),
            Err(e) => tracing::warn!(error = %e, "failed to decode synthesized audio"),
        }
    }

    /// Request synthesized audio for `text`
    ///
    /// Returns `None` on empty input and on any provider failure.
    async fn synthesize(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }

        match self.provider.synthesize(text, &self.voice).await {
            Ok(Some(encoded)) => Some(encoded),
            Ok(None) => {
                tracing::debug!("synthesis reply carried no audio");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                None
            }
        }
    }

    /// Reserve the next timeline slot for `clip` and play it when due
    pub fn schedule(&self, clip: AudioClip) {
        let now = self.clock();
        let (id, start) = self.timeline.lock().unwrap().schedule(now, clip.duration());

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels.lock().unwrap().insert(id, Arc::clone(&cancel));

        let output = self.output.clone();
        let epoch = self.epoch;
        let timeline = Arc::clone(&self.timeline);
        let cancels = Arc::clone(&self.cancels);

        tokio::spawn(async move {
            let wait = start - epoch.elapsed().as_secs_f64();
            if wait > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
            }

            if !cancel.load(Ordering::Relaxed) {
                let play_cancel = Arc::clone(&cancel);
                let played =
                    tokio::task::spawn_blocking(move || output.play(&clip, &play_cancel)).await;
                match played {
                    Ok(Err(e)) => tracing::warn!(error = %e, "clip playback failed"),
                    Err(e) => tracing::warn!(error = %e, "playback task failed"),
                    Ok(Ok(())) => {}
                }
            }

            timeline.lock().unwrap().finish(id);
            cancels.lock().unwrap().remove(&id);
        });
    }

    /// Halt every active clip, clear the active set, reset the cursor
    pub fn stop_all(&self) {
        for (_, cancel) in self.cancels.lock().unwrap().drain() {
            cancel.store(true, Ordering::Relaxed);
        }
        self.timeline.lock().unwrap().stop_all();
        tracing::debug!("playback stopped and timeline reset");
    }

    /// Clips currently scheduled or playing
    #[must_use]
    pub fn active_clips(&self) -> usize {
        self.timeline.lock().unwrap().active_count()
    }

    /// Wait until no clip is scheduled or playing
    pub async fn drain(&self) {
        while self.active_clips() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn clock(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}
