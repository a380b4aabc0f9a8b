//! Property-based tests for transport, loop and waveform invariants.

use std::sync::Arc;

use cadenzio_core::{
    audio::DecodedAudio, format_time, AudioConfig, AudioEngine, ManualClock, WaveformEnvelope,
};
use proptest::prelude::*;

fn loaded_engine(seconds: usize) -> (AudioEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(0.0));
    let mut engine = AudioEngine::new(AudioConfig::default(), clock.clone());
    engine.initialize().unwrap();
    let samples = vec![0.1; seconds * 100];
    engine.load_decoded(DecodedAudio::from_channels(vec![samples], 100).unwrap());
    (engine, clock)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Seeking while paused lands exactly on the clamped target.
    #[test]
    fn paused_seek_is_exact(target in -20.0f64..40.0) {
        let (mut engine, _) = loaded_engine(20);
        engine.seek(target);
        prop_assert_eq!(engine.current_time(), target.clamp(0.0, 20.0));
    }

    /// Muting twice restores whatever audible level was set.
    #[test]
    fn double_mute_restores_volume(level in 0.01f32..=1.0) {
        let (mut engine, _) = loaded_engine(1);
        engine.set_volume(level);
        prop_assert_eq!(engine.toggle_mute().unwrap(), 0.0);
        prop_assert_eq!(engine.toggle_mute().unwrap(), level);
    }

    /// Once inside the loop the playhead stays inside it for any elapsed time.
    #[test]
    fn playhead_stays_in_loop(
        start in 0.0f64..15.0,
        len in 0.1f64..5.0,
        into in 0.0f64..1.0,
        elapsed in 0.0f64..500.0,
    ) {
        let (mut engine, clock) = loaded_engine(20);
        let end = start + len;
        engine.set_loop_points(start, end).unwrap();
        engine.seek(start + len * into);
        engine.play().unwrap();

        clock.advance(elapsed);
        let time = engine.current_time();
        prop_assert!(time >= start - 1e-9 && time <= end + 1e-9,
            "time {} outside [{}, {}]", time, start, end);
    }

    /// Loops shorter than the minimum are rejected and leave state untouched.
    #[test]
    fn short_loops_are_rejected(start in 0.0f64..19.0, len in 0.0f64..0.099) {
        let (mut engine, _) = loaded_engine(20);
        let before = engine.loop_region();
        prop_assert!(engine.set_loop_points(start, start + len).is_err());
        prop_assert_eq!(engine.loop_region(), before);
    }

    /// Envelopes have one value per pixel, all within `[0, 1]`, peaking at 1
    /// whenever any sample is audible.
    #[test]
    fn envelope_is_normalised(
        samples in prop::collection::vec(-1.0f32..=1.0, 0..4000),
        width in 1usize..600,
    ) {
        let envelope = WaveformEnvelope::from_samples(&samples, width);
        prop_assert_eq!(envelope.len(), width);
        prop_assert!(envelope.values().iter().all(|value| (0.0..=1.0).contains(value)));

        let peak = envelope.values().iter().copied().fold(0.0f32, f32::max);
        if samples.iter().any(|sample| sample.abs() > 1e-6) {
            prop_assert!((peak - 1.0).abs() < 1e-6, "audible input peaked at {}", peak);
        } else {
            prop_assert!(peak == 0.0 || (peak - 1.0).abs() < 1e-6);
        }
    }

    /// The envelope is a pure function of its input.
    #[test]
    fn envelope_is_deterministic(
        samples in prop::collection::vec(-1.0f32..=1.0, 0..4000),
        width in 1usize..600,
    ) {
        prop_assert_eq!(
            WaveformEnvelope::from_samples(&samples, width),
            WaveformEnvelope::from_samples(&samples, width)
        );
    }

    /// Formatted times always read as minutes and two-digit seconds.
    #[test]
    fn time_labels_are_well_formed(seconds in prop::num::f64::ANY) {
        let label = format_time(seconds);
        let (minutes, secs) = label.split_once(':').unwrap();
        prop_assert!(minutes.parse::<u64>().is_ok());
        prop_assert_eq!(secs.len(), 2);
        prop_assert!(secs.parse::<u8>().unwrap() < 60);
    }
}
