//! Time sources and the per-frame scheduling primitives.
//!
//! The audio clock is the only authority on playback time. Frame tasks read it
//! every frame but never drive it.

use std::{
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Whether the hardware clock is currently advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Running,
    /// Autoplay policies can leave a clock suspended until a user gesture.
    Suspended,
}

/// Monotonic time reference of the audio subsystem, in seconds.
pub trait AudioClock: Send + Sync {
    fn now(&self) -> f64;

    fn state(&self) -> ClockState {
        ClockState::Running
    }

    fn resume(&self) {}
}

/// Clock backed by [`Instant`], starting at zero when created.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Simulated clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<ManualState>,
}

#[derive(Debug, Clone, Copy)]
struct ManualState {
    now: f64,
    state: ClockState,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            inner: Mutex::new(ManualState {
                now: start,
                state: ClockState::Running,
            }),
        }
    }

    /// Creates a clock that reports [`ClockState::Suspended`] until resumed.
    pub fn suspended(start: f64) -> Self {
        let clock = Self::new(start);
        clock.with_state(|inner| inner.state = ClockState::Suspended);
        clock
    }

    pub fn advance(&self, seconds: f64) {
        self.with_state(|inner| inner.now += seconds.max(0.0));
    }

    pub fn set(&self, now: f64) {
        self.with_state(|inner| inner.now = now);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ManualState) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        self.with_state(|inner| inner.now)
    }

    fn state(&self) -> ClockState {
        self.with_state(|inner| inner.state)
    }

    fn resume(&self) {
        self.with_state(|inner| inner.state = ClockState::Running);
    }
}

/// Returned by a frame task to decide whether it runs again next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameControl {
    Continue,
    Stop,
}

/// A callback that runs once per animation frame.
pub trait FrameTask: Send {
    fn on_frame(&mut self, timestamp: f64) -> FrameControl;
}

impl<F> FrameTask for F
where
    F: FnMut(f64) -> FrameControl + Send,
{
    fn on_frame(&mut self, timestamp: f64) -> FrameControl {
        self(timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// Cooperative animation-frame scheduler.
///
/// Each call to [`FrameScheduler::run_frame`] runs every queued task once;
/// tasks returning [`FrameControl::Continue`] are queued for the next frame.
#[derive(Default)]
pub struct FrameScheduler {
    queued: Vec<(TaskId, Box<dyn FrameTask>)>,
    next_id: u64,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, task: impl FrameTask + 'static) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.queued.push((id, Box::new(task)));
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.queued.len();
        self.queued.retain(|(queued, _)| *queued != id);
        self.queued.len() != before
    }

    /// Runs one frame and returns how many tasks executed.
    pub fn run_frame(&mut self, timestamp: f64) -> usize {
        let tasks = std::mem::take(&mut self.queued);
        let executed = tasks.len();
        for (id, mut task) in tasks {
            if task.on_frame(timestamp) == FrameControl::Continue {
                self.queued.push((id, task));
            }
        }
        self.frames += 1;
        executed
    }

    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("pending", &self.queued.len())
            .field("frames", &self.frames)
            .finish()
    }
}

/// Trailing-edge debounce polled from the frame loop instead of a timer.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: f64,
    last_trigger: Option<f64>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay: delay.as_secs_f64(),
            last_trigger: None,
        }
    }

    pub fn trigger(&mut self, now: f64) {
        self.last_trigger = Some(now);
    }

    /// Fires once, after no trigger has arrived for the full delay.
    pub fn poll(&mut self, now: f64) -> bool {
        match self.last_trigger {
            Some(last) if now - last >= self.delay => {
                self.last_trigger = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.last_trigger.is_some()
    }
}
