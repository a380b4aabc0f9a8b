//! Audio graph, transport and loop state.
//!
//! The engine is the single authority on "what time is it in the track" and
//! "which region loops". Current time is always derived from the hardware
//! clock and a recorded anchor; it is never stored by a timer.

mod decode;
mod playback;

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

pub use decode::{decode_audio, DecodedAudio};
pub use playback::{LoopRegion, PlaybackUnit};

use crate::{
    analysis::{Analyser, FrequencySnapshot},
    timeline::{AudioClock, ClockState},
    AudioConfig, PlayerError, Result,
};

/// Transport bookkeeping. While playing `anchor_wall_time` is authoritative,
/// otherwise `paused_offset` is.
///
/// The anchor is the clock time at which the running unit would have been at
/// track position zero. It is refreshed on every (re)start and whenever the
/// loop bounds change, so `now - anchor` is the position until the next wrap.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TransportState {
    pub is_playing: bool,
    pub anchor_wall_time: f64,
    pub paused_offset: f64,
}

/// Output gain applied ahead of the analyser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    value: f32,
}

impl GainStage {
    /// Linear gain in `[0, 1]`.
    pub fn value(&self) -> f32 {
        self.value
    }
}

/// Source-less audio graph: gain feeding the analyser feeding the sink.
#[derive(Debug)]
struct AudioGraph {
    gain: GainStage,
    analyser: Analyser,
}

/// High level audio engine façade.
pub struct AudioEngine {
    config: AudioConfig,
    clock: Arc<dyn AudioClock>,
    graph: Option<AudioGraph>,
    buffer: Option<Arc<DecodedAudio>>,
    unit: Option<PlaybackUnit>,
    next_unit_id: u64,
    transport: TransportState,
    loop_region: LoopRegion,
    previous_volume: f32,
}

impl AudioEngine {
    /// Creates an engine without a graph; see [`AudioEngine::initialize`].
    pub fn new(config: AudioConfig, clock: Arc<dyn AudioClock>) -> Self {
        let previous_volume = config.default_volume;
        Self {
            config,
            clock,
            graph: None,
            buffer: None,
            unit: None,
            next_unit_id: 0,
            transport: TransportState::default(),
            loop_region: LoopRegion::full(0.0),
            previous_volume,
        }
    }

    /// Lazily builds the audio graph. Calling it again is a no-op.
    pub fn initialize(&mut self) -> Result<()> {
        if self.graph.is_some() {
            return Ok(());
        }

        let analyser = Analyser::new(&self.config)?;
        let volume = self.config.default_volume.clamp(0.0, 1.0);
        tracing::debug!(
            fft_size = analyser.fft_size(),
            volume,
            "audio graph initialised"
        );
        self.graph = Some(AudioGraph {
            gain: GainStage { value: volume },
            analyser,
        });
        Ok(())
    }

    /// Whether the gain and analyser stages exist yet.
    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    /// Decodes `bytes` and makes the result the current buffer.
    ///
    /// On failure the previous buffer and transport state stay untouched.
    pub fn load_buffer(&mut self, bytes: &[u8], extension: Option<&str>) -> Result<Arc<DecodedAudio>> {
        self.initialize()?;
        let audio = decode_audio(bytes, extension)?;
        Ok(self.load_decoded(audio))
    }

    /// Installs already decoded audio, discarding any previous buffer.
    pub fn load_decoded(&mut self, audio: DecodedAudio) -> Arc<DecodedAudio> {
        self.teardown_unit();
        let audio = Arc::new(audio);
        let duration = audio.duration();

        self.buffer = Some(audio.clone());
        self.loop_region = LoopRegion::full(duration);
        self.transport = TransportState::default();
        if let Some(graph) = self.graph.as_mut() {
            graph.analyser.reset();
        }

        tracing::info!(
            duration,
            channels = audio.channel_count(),
            sample_rate = audio.sample_rate(),
            "audio buffer loaded"
        );
        audio
    }

    /// The decoded track, if one is loaded.
    pub fn buffer(&self) -> Option<&Arc<DecodedAudio>> {
        self.buffer.as_ref()
    }

    /// True once a track has been decoded successfully.
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    /// Track duration in seconds, 0 when nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.buffer.as_ref().map(|audio| audio.duration()).unwrap_or(0.0)
    }

    /// Whether a playback unit is currently running.
    pub fn is_playing(&self) -> bool {
        self.transport.is_playing
    }

    /// Copy of the transport bookkeeping.
    pub fn transport(&self) -> TransportState {
        self.transport
    }

    /// Starts looping playback from the paused offset.
    pub fn play(&mut self) -> Result<()> {
        let Some(buffer) = self.buffer.clone() else {
            tracing::debug!("play ignored, no buffer loaded");
            return Ok(());
        };
        if self.transport.is_playing {
            return Ok(());
        }
        self.initialize()?;

        if self.clock.state() == ClockState::Suspended {
            tracing::debug!("resuming suspended audio clock");
            self.clock.resume();
        }

        self.start_unit(buffer);
        tracing::debug!(
            offset = self.transport.paused_offset,
            anchor = self.transport.anchor_wall_time,
            "playback started"
        );
        Ok(())
    }

    /// Stops playback and remembers the exact position.
    pub fn pause(&mut self) {
        if !self.transport.is_playing {
            return;
        }
        self.transport.paused_offset = self.current_time();
        self.teardown_unit();
        self.transport.is_playing = false;
        tracing::debug!(offset = self.transport.paused_offset, "playback paused");
    }

    /// Stops playback and rewinds to the start.
    pub fn stop(&mut self) {
        self.teardown_unit();
        self.transport = TransportState::default();
    }

    /// Moves the playhead, clamped to the track. Playback keeps running.
    pub fn seek(&mut self, time: f64) {
        let target = if time.is_nan() {
            0.0
        } else {
            time.clamp(0.0, self.duration())
        };
        self.transport.paused_offset = target;

        if self.transport.is_playing {
            // Restart in place; no caller can observe a paused state between.
            if let Some(buffer) = self.buffer.clone() {
                self.teardown_unit();
                self.start_unit(buffer);
            }
        }
    }

    /// Seeks by `delta` seconds from the current position.
    pub fn seek_relative(&mut self, delta: f64) {
        self.seek(self.current_time() + delta);
    }

    /// Updates the loop window. A running unit takes the new bounds live.
    pub fn set_loop_points(&mut self, start: f64, end: f64) -> Result<()> {
        let invalid = PlayerError::InvalidLoopRegion { start, end };
        if !start.is_finite() || !end.is_finite() || start < 0.0 {
            return Err(invalid);
        }
        // Tolerates float noise from slider values sitting exactly on the gap.
        if end - start < self.config.min_loop_duration - 1e-9 {
            return Err(invalid);
        }
        if self.buffer.is_some() && end > self.duration() {
            return Err(invalid);
        }

        self.apply_loop_region(LoopRegion::new(start, end));
        Ok(())
    }

    /// Restores the loop to the whole track and returns it.
    ///
    /// Not subject to the minimum loop length, so clips shorter than it still
    /// loop over their full duration.
    pub fn reset_loop(&mut self) -> LoopRegion {
        self.apply_loop_region(LoopRegion::full(self.duration()));
        self.loop_region
    }

    /// The loop window the next playback unit will use.
    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Bounds currently used by the running playback unit, if any.
    pub fn playback_loop_region(&self) -> Option<LoopRegion> {
        self.unit.as_ref().map(PlaybackUnit::loop_region)
    }

    /// Identifier of the running playback unit; changes on every restart.
    pub fn playback_id(&self) -> Option<u64> {
        self.unit.as_ref().map(PlaybackUnit::id)
    }

    /// Sets the output gain, clamped to `[0, 1]`. Ignored before
    /// [`AudioEngine::initialize`].
    pub fn set_volume(&mut self, level: f32) {
        let Some(graph) = self.graph.as_mut() else {
            tracing::debug!(level, "volume ignored, graph not initialised");
            return;
        };
        graph.gain.value = if level.is_nan() { 0.0 } else { level.clamp(0.0, 1.0) };
    }

    /// Current gain, 0 before the graph exists.
    pub fn volume(&self) -> f32 {
        self.graph.as_ref().map(|graph| graph.gain.value()).unwrap_or(0.0)
    }

    /// Mutes, or restores the gain remembered by the last mute.
    pub fn toggle_mute(&mut self) -> Result<f32> {
        self.initialize()?;
        let current = self.volume();
        if current > 0.0 {
            self.previous_volume = current;
            self.set_volume(0.0);
        } else {
            self.set_volume(self.previous_volume);
        }
        Ok(self.volume())
    }

    /// Position in the track, in seconds.
    ///
    /// While playing this is the loop-aware playhead derived from the clock;
    /// otherwise it is the paused offset.
    pub fn current_time(&self) -> f64 {
        match (&self.unit, self.transport.is_playing) {
            (Some(unit), true) => unit.position_at(self.clock.now()),
            _ => self.transport.paused_offset,
        }
    }

    /// Latest bin magnitudes, or `None` before the graph exists.
    pub fn frequency_snapshot(&mut self) -> Option<FrequencySnapshot> {
        let now = self.clock.now();
        let graph = self.graph.as_mut()?;
        let len = graph.analyser.fft_size();
        let gain = graph.gain.value();

        let window = match (&self.unit, self.transport.is_playing) {
            (Some(unit), true) => unit.window_ending_at(now, len, gain),
            _ => vec![0.0; len],
        };

        match graph.analyser.analyse(&window) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(%err, "frequency analysis failed");
                None
            }
        }
    }

    /// Mean of a fresh snapshot, 0 when analysis is unavailable.
    pub fn average_frequency(&mut self) -> f32 {
        self.frequency_snapshot()
            .map(|snapshot| snapshot.average())
            .unwrap_or(0.0)
    }

    fn apply_loop_region(&mut self, region: LoopRegion) {
        self.loop_region = region;
        let now = self.clock.now();
        if let Some(unit) = self.unit.as_mut() {
            unit.set_loop_region(region, now);
            self.transport.anchor_wall_time = now - unit.position_at(now);
        }
    }

    fn start_unit(&mut self, buffer: Arc<DecodedAudio>) {
        let duration = buffer.duration();
        let offset = self.transport.paused_offset.rem_euclid(duration);
        let now = self.clock.now();

        self.unit = Some(PlaybackUnit::start(
            self.next_unit_id,
            buffer,
            self.loop_region,
            offset,
            now,
        ));
        self.next_unit_id += 1;
        self.transport.anchor_wall_time = now - offset;
        self.transport.is_playing = true;
    }

    fn teardown_unit(&mut self) {
        if let Some(unit) = self.unit.take() {
            tracing::trace!(id = unit.id(), "playback unit stopped");
        }
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("initialized", &self.graph.is_some())
            .field("duration", &self.duration())
            .field("transport", &self.transport)
            .field("loop_region", &self.loop_region)
            .finish()
    }
}

/// Shared, thread-safe view over an [`AudioEngine`].
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Mutex<AudioEngine>>,
}

impl EngineHandle {
    /// Wraps an engine for sharing between the controller and frame tasks.
    pub fn new(engine: AudioEngine) -> Self {
        Self {
            shared: Arc::new(Mutex::new(engine)),
        }
    }

    /// Locks the engine; a poisoned lock becomes [`PlayerError::Message`].
    pub fn lock(&self) -> Result<MutexGuard<'_, AudioEngine>> {
        self.shared
            .lock()
            .map_err(|_| PlayerError::msg("audio engine has been poisoned"))
    }

    /// Locks and samples the analyser once.
    pub fn frequency_snapshot(&self) -> Result<Option<FrequencySnapshot>> {
        Ok(self.lock()?.frequency_snapshot())
    }

    /// Locks and reads the playhead.
    pub fn current_time(&self) -> Result<f64> {
        Ok(self.lock()?.current_time())
    }

    pub fn volume(&self) -> Result<f32> {
        Ok(self.lock()?.volume())
    }

    pub fn seek(&self, time: f64) -> Result<()> {
        self.lock()?.seek(time);
        Ok(())
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::ManualClock;

    fn engine_with_clock() -> (AudioEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(100.0));
        let engine = AudioEngine::new(AudioConfig::default(), clock.clone());
        (engine, clock)
    }

    fn tone(seconds: usize, sample_rate: u32) -> DecodedAudio {
        let samples = (0..seconds * sample_rate as usize)
            .map(|i| (i as f32 * 0.3).sin() * 0.5)
            .collect();
        DecodedAudio::from_channels(vec![samples], sample_rate).unwrap()
    }

    #[test]
    fn initialize_is_idempotent_and_keeps_volume() {
        let (mut engine, _) = engine_with_clock();
        assert!(!engine.is_initialized());
        assert!(engine.frequency_snapshot().is_none());
        engine.initialize().unwrap();
        assert!(engine.is_initialized());
        engine.set_volume(0.2);
        engine.initialize().unwrap();
        assert_eq!(engine.volume(), 0.2);
        assert_eq!(engine.frequency_snapshot().unwrap().len(), 128);
    }

    #[test]
    fn loading_resets_loop_and_offset() {
        let (mut engine, _) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        engine.seek(4.0);
        engine.set_loop_points(1.0, 2.0).unwrap();

        engine.load_decoded(tone(6, 800));
        assert_eq!(engine.loop_region(), LoopRegion::full(6.0));
        assert_eq!(engine.current_time(), 0.0);
    }

    #[test]
    fn play_without_buffer_is_a_no_op() {
        let (mut engine, _) = engine_with_clock();
        engine.play().unwrap();
        assert!(!engine.is_playing());
        engine.pause();
        assert_eq!(engine.current_time(), 0.0);
    }

    #[test]
    fn play_resumes_a_suspended_clock() {
        let clock = Arc::new(ManualClock::suspended(0.0));
        let mut engine = AudioEngine::new(AudioConfig::default(), clock.clone());
        engine.load_decoded(tone(2, 800));
        engine.play().unwrap();
        assert_eq!(clock.state(), ClockState::Running);
    }

    #[test]
    fn anchor_tracks_resume_offset() {
        let (mut engine, clock) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        engine.seek(3.0);
        engine.play().unwrap();

        let transport = engine.transport();
        assert!(transport.is_playing);
        assert_eq!(transport.anchor_wall_time, 97.0);

        clock.advance(2.0);
        assert_eq!(engine.current_time(), 5.0);
        engine.pause();
        assert_eq!(engine.current_time(), 5.0);
        assert!(engine.playback_id().is_none());
    }

    #[test]
    fn seek_while_playing_restarts_at_target() {
        let (mut engine, clock) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        engine.play().unwrap();
        let first = engine.playback_id();

        engine.seek(7.5);
        assert!(engine.is_playing());
        assert_ne!(engine.playback_id(), first);
        clock.advance(1.0);
        assert_eq!(engine.current_time(), 8.5);
    }

    #[test]
    fn seek_clamps_to_track() {
        let (mut engine, _) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        engine.seek(42.0);
        assert_eq!(engine.current_time(), 10.0);
        engine.seek(-1.0);
        assert_eq!(engine.current_time(), 0.0);
    }

    #[test]
    fn loop_points_update_live_unit() {
        let (mut engine, clock) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        engine.play().unwrap();
        let id = engine.playback_id();

        clock.advance(1.0);
        engine.set_loop_points(0.5, 1.5).unwrap();
        assert_eq!(engine.playback_id(), id);
        assert_eq!(
            engine.playback_loop_region(),
            Some(LoopRegion::new(0.5, 1.5))
        );
        clock.advance(0.75);
        assert!((engine.current_time() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn loop_change_refreshes_the_anchor() {
        let (mut engine, clock) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        engine.seek(5.0);
        engine.play().unwrap();
        clock.advance(1.0);

        engine.set_loop_points(1.0, 3.0).unwrap();
        let anchor = engine.transport().anchor_wall_time;
        assert!((clock.now() - anchor - engine.current_time()).abs() < 1e-9);
    }

    #[test]
    fn reset_loop_covers_clips_shorter_than_the_minimum() {
        let (mut engine, _) = engine_with_clock();
        let samples = vec![0.1; 40];
        engine.load_decoded(DecodedAudio::from_channels(vec![samples], 800).unwrap());
        assert!(engine.set_loop_points(0.0, 0.05).is_err());
        assert_eq!(engine.reset_loop(), LoopRegion::new(0.0, 0.05));
    }

    #[test]
    fn rejects_loops_that_are_too_short_or_out_of_range() {
        let (mut engine, _) = engine_with_clock();
        engine.load_decoded(tone(10, 800));
        assert!(engine.set_loop_points(2.0, 2.05).is_err());
        assert!(engine.set_loop_points(3.0, 2.0).is_err());
        assert!(engine.set_loop_points(-1.0, 2.0).is_err());
        assert!(engine.set_loop_points(9.0, 11.0).is_err());
        assert_eq!(engine.loop_region(), LoopRegion::full(10.0));
        assert!(engine.set_loop_points(2.0, 2.1).is_ok());
    }

    #[test]
    fn mute_toggles_back_to_previous_level() {
        let (mut engine, _) = engine_with_clock();
        engine.initialize().unwrap();
        engine.set_volume(0.7);
        assert_eq!(engine.toggle_mute().unwrap(), 0.0);
        assert_eq!(engine.toggle_mute().unwrap(), 0.7);
    }

    #[test]
    fn unmuting_from_silence_uses_default_level() {
        let (mut engine, _) = engine_with_clock();
        engine.initialize().unwrap();
        engine.set_volume(0.0);
        assert_eq!(engine.toggle_mute().unwrap(), 0.5);
    }

    #[test]
    fn playing_audio_produces_energy_and_silence_when_paused() {
        let (mut engine, clock) = engine_with_clock();
        engine.load_decoded(tone(4, 8000));
        engine.set_volume(1.0);
        engine.play().unwrap();
        clock.advance(1.0);
        assert!(engine.average_frequency() > 0.0);

        engine.pause();
        engine.set_volume(0.0);
        for _ in 0..200 {
            engine.frequency_snapshot();
        }
        assert_eq!(engine.average_frequency(), 0.0);
    }

    #[test]
    fn handle_reports_poisoned_engine() {
        let (engine, _) = engine_with_clock();
        let handle = EngineHandle::new(engine);
        let poisoned = handle.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoned.lock().unwrap();
            panic!("poison the engine");
        })
        .join();
        assert!(handle.current_time().is_err());
    }
}
