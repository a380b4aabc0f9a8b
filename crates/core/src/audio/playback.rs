use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::decode::DecodedAudio;

/// Loop window in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

impl LoopRegion {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// The default region spanning the whole track.
    pub fn full(duration: f64) -> Self {
        Self::new(0.0, duration)
    }

    /// Length in seconds; negative for inverted bounds.
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }

    /// Half-open membership test, `start <= time < end`.
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// One-shot playback of a buffer that loops natively between its bounds.
///
/// The playhead is never stored; it is derived from the clock reading and the
/// segment origin. Changing the bounds re-bases the origin at the current
/// position so the playhead does not jump.
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    id: u64,
    buffer: Arc<DecodedAudio>,
    loop_region: LoopRegion,
    origin_time: f64,
    origin_position: f64,
}

impl PlaybackUnit {
    pub(crate) fn start(
        id: u64,
        buffer: Arc<DecodedAudio>,
        loop_region: LoopRegion,
        offset: f64,
        now: f64,
    ) -> Self {
        Self {
            id,
            buffer,
            loop_region,
            origin_time: now,
            origin_position: offset,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Playhead position in seconds at clock time `now`, in `[0, duration)`.
    pub fn position_at(&self, now: f64) -> f64 {
        let elapsed = (now - self.origin_time).max(0.0);
        self.wrap(self.origin_position + elapsed)
    }

    /// Pushes new loop bounds into the running unit without restarting it.
    pub(crate) fn set_loop_region(&mut self, loop_region: LoopRegion, now: f64) {
        self.origin_position = self.position_at(now);
        self.origin_time = now;
        self.loop_region = loop_region;
    }

    /// Mono samples of the `len` frames that ended at clock time `now`.
    pub(crate) fn window_ending_at(&self, now: f64, len: usize, gain: f32) -> Vec<f32> {
        let rate = self.buffer.sample_rate() as f64;
        let end = (self.position_at(now) * rate) as usize;
        let start = end.saturating_sub(len);
        let mut window = vec![0.0; len - (end - start)];
        window.extend((start..end).map(|index| self.buffer.mono_sample(index) * gain));
        window
    }

    fn wrap(&self, position: f64) -> f64 {
        let duration = self.buffer.duration();
        let LoopRegion { start, end } = self.loop_region;
        // A playhead that begins past the loop end runs to the end of the
        // buffer before it first wraps.
        let boundary = if self.origin_position < end {
            end
        } else {
            duration
        };

        if position < boundary {
            return position;
        }
        if self.loop_region.is_empty() {
            return start.clamp(0.0, duration);
        }
        start + (position - boundary) % self.loop_region.len()
    }
}
