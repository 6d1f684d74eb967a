//! Video backpressure policy
//!
//! Decoding can outpace presentation. When the decoder still has more than
//! `max_pending` units queued at the moment a frame comes out, that frame is
//! dropped instead of rendered, which bounds end-to-end latency.

/// Default pending-depth threshold
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 10;

/// What to do with a freshly decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Hand the frame to the renderer
    Render,
    /// Release the frame without rendering
    Drop {
        /// Decoder depth observed when the frame was dropped
        pending: usize,
    },
}

/// Stateless drop policy keyed on decoder queue depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackpressurePolicy {
    max_pending: usize,
}

impl Default for BackpressurePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING_FRAMES)
    }
}

impl BackpressurePolicy {
    /// Policy dropping frames while more than `max_pending` units are queued
    pub fn new(max_pending: usize) -> Self {
        Self { max_pending }
    }

    /// Threshold in use
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Decide the fate of a frame given the decoder depth
    pub fn evaluate(&self, pending: usize) -> FrameDisposition {
        if pending > self.max_pending {
            FrameDisposition::Drop { pending }
        } else {
            FrameDisposition::Render
        }
    }
}
