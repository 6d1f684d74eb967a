//! Gapless audio playback scheduling
//!
//! Decoded audio is converted to per-channel buffers and queued back to back
//! on the output graph's clock. `next_buffer_time` marks where the queued
//! audio ends: a buffer arriving before that point starts exactly there, a
//! buffer arriving after it starts immediately and leaves a gap rather than
//! an overlap.

use crate::error::{MediaError, MediaResult};
use crate::frames::{AudioBuffer, DecodedAudioFrame, SampleLayout};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Identifier of a buffer started on an output graph
pub type BufferId = u64;

/// Channel the output graph reports finished buffers on
pub type CompletionSender = mpsc::UnboundedSender<BufferId>;

/// Audio output graph: a clock, buffer sources and one shared gain stage
pub trait OutputGraph: Send {
    /// Output clock in seconds; advances monotonically
    fn current_time(&self) -> f64;

    /// Start `buffer` at `when` on the output clock, or immediately for `None`.
    ///
    /// The graph sends the returned id on `on_ended` once playback finishes.
    fn start_buffer(
        &mut self,
        buffer: AudioBuffer,
        when: Option<f64>,
        on_ended: CompletionSender,
    ) -> BufferId;

    /// Stop a buffer early
    fn stop_buffer(&mut self, id: BufferId);

    /// Set the gain applied to every buffer
    fn set_gain(&mut self, gain: f32);
}

/// In-flight buffers and the end of the queued audio
#[derive(Debug, Clone, Default)]
pub struct AudioScheduleState {
    pending: HashSet<BufferId>,
    next_buffer_time: f64,
}

impl AudioScheduleState {
    /// Buffers started and not yet finished
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Output clock time at which queued audio ends
    pub fn next_buffer_time(&self) -> f64 {
        self.next_buffer_time
    }

    /// Whether `id` is still in flight
    pub fn is_pending(&self, id: BufferId) -> bool {
        self.pending.contains(&id)
    }
}

/// When a buffer should start
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartAt {
    /// The clock already passed the queued audio
    Now,
    /// Directly after the queued audio
    At(f64),
}

/// Plan the start of a buffer of `duration` seconds at clock time `now`,
/// advancing `state.next_buffer_time`. Returns the plan and the start time.
pub fn plan_start(state: &mut AudioScheduleState, now: f64, duration: f64) -> (StartAt, f64) {
    if now > state.next_buffer_time {
        state.next_buffer_time = now + duration;
        (StartAt::Now, now)
    } else {
        let start = state.next_buffer_time;
        state.next_buffer_time += duration;
        (StartAt::At(start), start)
    }
}

/// Convert a decoded frame into one plane per channel
pub fn deinterleave(frame: &DecodedAudioFrame) -> MediaResult<AudioBuffer> {
    let channels = frame.channels as usize;
    let expected = frame.frames * channels;
    if frame.samples.len() != expected {
        return Err(MediaError::InvalidFrameData {
            expected,
            actual: frame.samples.len(),
        });
    }
    if channels == 0 {
        return Err(MediaError::InvalidConfiguration {
            message: "audio frame without channels".to_string(),
        });
    }

    let planes = match frame.layout {
        SampleLayout::Planar if frame.frames == 0 => vec![Vec::new(); channels],
        SampleLayout::Planar => frame
            .samples
            .chunks(frame.frames)
            .map(<[f32]>::to_vec)
            .collect(),
        SampleLayout::Interleaved => (0..channels)
            .map(|channel| {
                frame
                    .samples
                    .iter()
                    .skip(channel)
                    .step_by(channels)
                    .copied()
                    .collect()
            })
            .collect(),
    };

    Ok(AudioBuffer {
        sample_rate: frame.sample_rate,
        channels: planes,
    })
}

/// A buffer handed to the output graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledBuffer {
    /// Graph-assigned id
    pub id: BufferId,
    /// Start time on the output clock
    pub start_time: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Whether the clock had already passed the queued audio
    pub late: bool,
}

/// Audio scheduling statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStats {
    /// Buffers handed to the output graph
    pub buffers_scheduled: u64,
    /// Buffers that finished playing
    pub buffers_completed: u64,
    /// Buffers stopped by `close`
    pub buffers_stopped: u64,
    /// Buffers started immediately because the clock overtook the queue
    pub late_starts: u64,
}

/// Queues decoded audio on an output graph without gaps or overlaps
pub struct AudioPlaybackScheduler {
    graph: Box<dyn OutputGraph>,
    state: AudioScheduleState,
    volume: f32,
    completions_tx: CompletionSender,
    completions_rx: mpsc::UnboundedReceiver<BufferId>,
    stats: AudioStats,
}

impl AudioPlaybackScheduler {
    /// Create a scheduler over `graph`, applying `initial_volume` to its gain stage
    pub fn new(mut graph: Box<dyn OutputGraph>, initial_volume: f32) -> Self {
        let volume = sanitize_volume(initial_volume).unwrap_or(1.0);
        graph.set_gain(volume);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            graph,
            state: AudioScheduleState::default(),
            volume,
            completions_tx,
            completions_rx,
            stats: AudioStats::default(),
        }
    }

    /// Convert and schedule one decoded frame
    pub fn schedule_frame(&mut self, frame: &DecodedAudioFrame) -> MediaResult<ScheduledBuffer> {
        let buffer = deinterleave(frame)?;
        Ok(self.schedule_buffer(buffer))
    }

    /// Schedule one buffer directly after the queued audio
    pub fn schedule_buffer(&mut self, buffer: AudioBuffer) -> ScheduledBuffer {
        let duration = buffer.duration();
        let now = self.graph.current_time();
        let (start_at, start_time) = plan_start(&mut self.state, now, duration);
        let late = start_at == StartAt::Now;
        let when = match start_at {
            StartAt::Now => None,
            StartAt::At(at) => Some(at),
        };

        let id = self
            .graph
            .start_buffer(buffer, when, self.completions_tx.clone());
        self.state.pending.insert(id);

        self.stats.buffers_scheduled += 1;
        if late {
            self.stats.late_starts += 1;
            debug!(now, "Audio queue ran dry, starting buffer immediately");
        }
        trace!(id, start_time, duration, "Scheduled audio buffer");

        ScheduledBuffer {
            id,
            start_time,
            duration,
            late,
        }
    }

    /// Forget a finished buffer; returns whether it was still pending
    pub fn on_buffer_ended(&mut self, id: BufferId) -> bool {
        let removed = self.state.pending.remove(&id);
        if removed {
            self.stats.buffers_completed += 1;
        }
        removed
    }

    /// Wait for the next buffer completion reported by the graph
    pub async fn next_completion(&mut self) -> BufferId {
        match self.completions_rx.recv().await {
            Some(id) => id,
            // The scheduler holds a sender, so the channel never closes while it lives
            None => std::future::pending().await,
        }
    }

    /// Take an already-reported completion without waiting
    pub fn try_next_completion(&mut self) -> Option<BufferId> {
        self.completions_rx.try_recv().ok()
    }

    /// Set the shared gain; values are clamped to `0.0..=1.0`, NaN is ignored
    pub fn set_volume(&mut self, volume: f32) {
        if let Some(volume) = sanitize_volume(volume) {
            self.volume = volume;
            self.graph.set_gain(volume);
        }
    }

    /// Current volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Stop every in-flight buffer and forget it
    pub fn close(&mut self) {
        let stopped = self.state.pending.len();
        for id in self.state.pending.drain() {
            self.graph.stop_buffer(id);
        }
        self.stats.buffers_stopped += stopped as u64;
        if stopped > 0 {
            debug!(stopped, "Stopped pending audio buffers");
        }
    }

    /// Scheduling state
    pub fn state(&self) -> &AudioScheduleState {
        &self.state
    }

    /// Statistics
    pub fn stats(&self) -> &AudioStats {
        &self.stats
    }
}

fn sanitize_volume(volume: f32) -> Option<f32> {
    if volume.is_nan() {
        None
    } else {
        Some(volume.clamp(0.0, 1.0))
    }
}
