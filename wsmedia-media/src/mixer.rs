//! Software audio output graph
//!
//! [`MixerGraph`] is an [`OutputGraph`] driven by whoever pulls samples from
//! it: an audio device callback ([`CpalOutput`], behind the `cpal-output`
//! feature) or a test. Its clock is the number of frames rendered so far
//! divided by the output sample rate.

use crate::frames::AudioBuffer;
use crate::playback::{BufferId, CompletionSender, OutputGraph};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Output format of the mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Output channel count
    pub channels: u16,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

struct Voice {
    id: BufferId,
    start_frame: u64,
    planes: Vec<Vec<f32>>,
    on_ended: CompletionSender,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.planes.first().map(Vec::len).unwrap_or(0) as u64
    }

    /// Sample for output channel `channel` at voice-relative index `index`
    fn sample(&self, channel: usize, output_channels: usize, index: usize) -> f32 {
        let source_channels = self.planes.len();
        if output_channels == 1 && source_channels > 1 {
            let sum: f32 = self.planes.iter().map(|plane| plane[index]).sum();
            return sum / source_channels as f32;
        }
        if channel < source_channels {
            self.planes[channel][index]
        } else if source_channels == 1 {
            self.planes[0][index]
        } else {
            0.0
        }
    }
}

struct MixerState {
    position: u64,
    voices: Vec<Voice>,
    gain: f32,
    next_id: BufferId,
}

/// Mixes scheduled buffers into an interleaved output stream
#[derive(Clone)]
pub struct MixerGraph {
    config: MixerConfig,
    inner: Arc<Mutex<MixerState>>,
}

impl MixerGraph {
    /// Create a mixer with its clock at zero
    pub fn new(config: MixerConfig) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(MixerState {
                position: 0,
                voices: Vec::new(),
                gain: 1.0,
                next_id: 0,
            })),
        }
    }

    /// Output format
    pub fn config(&self) -> MixerConfig {
        self.config
    }

    /// Frames rendered so far
    pub fn position(&self) -> u64 {
        self.inner.lock().position
    }

    /// Buffers scheduled and not yet finished
    pub fn active_voices(&self) -> usize {
        self.inner.lock().voices.len()
    }

    /// Current gain
    pub fn gain(&self) -> f32 {
        self.inner.lock().gain
    }

    /// Mix the next `out.len() / channels` frames into `out` and advance the clock
    pub fn render(&self, out: &mut [f32]) {
        let channels = self.config.channels.max(1) as usize;
        let frames = out.len() / channels;
        out.fill(0.0);

        let mut state = self.inner.lock();
        let window_start = state.position;
        let window_end = window_start + frames as u64;
        let gain = state.gain;

        for voice in &state.voices {
            let from = voice.start_frame.max(window_start);
            let to = voice.end_frame().min(window_end);
            for frame in from..to {
                let out_index = (frame - window_start) as usize;
                let voice_index = (frame - voice.start_frame) as usize;
                for channel in 0..channels {
                    out[out_index * channels + channel] +=
                        voice.sample(channel, channels, voice_index);
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }

        state.position = window_end;
        state.voices.retain(|voice| {
            if voice.end_frame() <= window_end {
                trace!(id = voice.id, "Audio buffer finished");
                let _ = voice.on_ended.send(voice.id);
                false
            } else {
                true
            }
        });
    }

    /// Stretch `buffer` to exactly `length` output frames
    fn resample(&self, buffer: AudioBuffer, length: usize) -> Vec<Vec<f32>> {
        let source_frames = buffer.frames();
        if buffer.sample_rate == self.config.sample_rate
            || buffer.sample_rate == 0
            || source_frames == 0
        {
            return buffer.channels;
        }
        let step = source_frames as f64 / length.max(1) as f64;
        buffer
            .channels
            .into_iter()
            .map(|plane| {
                (0..length)
                    .map(|i| {
                        let source = (i as f64 * step) as usize;
                        plane.get(source).copied().unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect()
    }
}

impl OutputGraph for MixerGraph {
    fn current_time(&self) -> f64 {
        self.position() as f64 / self.config.sample_rate as f64
    }

    fn start_buffer(
        &mut self,
        buffer: AudioBuffer,
        when: Option<f64>,
        on_ended: CompletionSender,
    ) -> BufferId {
        let sample_rate = self.config.sample_rate as f64;
        let duration = buffer.duration();
        let mut state = self.inner.lock();
        state.next_id += 1;
        let id = state.next_id;

        // Start and end are each rounded from seconds: a buffer starting at
        // the previous buffer's end time begins on that buffer's end frame.
        let start_secs = when.unwrap_or(state.position as f64 / sample_rate);
        let start = (start_secs * sample_rate).round().max(0.0) as u64;
        let end = ((start_secs + duration) * sample_rate).round().max(0.0) as u64;
        let planes = self.resample(buffer, end.saturating_sub(start) as usize);
        let start_frame = start.max(state.position);
        state.voices.push(Voice {
            id,
            start_frame,
            planes,
            on_ended,
        });
        id
    }

    fn stop_buffer(&mut self, id: BufferId) {
        self.inner.lock().voices.retain(|voice| voice.id != id);
    }

    fn set_gain(&mut self, gain: f32) {
        self.inner.lock().gain = gain;
    }
}

/// Plays a [`MixerGraph`] on the default audio output device
#[cfg(feature = "cpal-output")]
pub struct CpalOutput {
    _stream: cpal::Stream,
}

#[cfg(feature = "cpal-output")]
impl CpalOutput {
    /// Open the default output device and start pulling from `mixer`
    pub fn start(mixer: MixerGraph) -> crate::MediaResult<Self> {
        use crate::MediaError;
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device =
            host.default_output_device()
                .ok_or_else(|| MediaError::HardwareAccelerationNotAvailable {
                    reason: "no default output device".to_string(),
                })?;

        let config = mixer.config();
        let stream_config = cpal::StreamConfig {
            channels: config.channels as cpal::ChannelCount,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
                move |err| tracing::error!("Audio output stream error: {}", err),
                None,
            )
            .map_err(|e| MediaError::InvalidConfiguration {
                message: format!("Failed to build output stream: {}", e),
            })?;

        stream.play().map_err(|e| MediaError::InvalidConfiguration {
            message: format!("Failed to start stream: {}", e),
        })?;

        Ok(Self { _stream: stream })
    }
}
