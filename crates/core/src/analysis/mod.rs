use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{AudioConfig, PlayerError, Result};

/// One frame of byte-scaled frequency magnitudes, one entry per bin.
///
/// Snapshots are produced fresh on every pull and never retained by the
/// analyser.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrequencySnapshot {
    bins: Vec<u8>,
}

impl FrequencySnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Mean bin magnitude in `0..=255`, or 0 for an empty snapshot.
    pub fn average(&self) -> f32 {
        if self.bins.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.bins.iter().map(|bin| u32::from(*bin)).sum();
        sum as f32 / self.bins.len() as f32
    }
}

/// Real-time spectral analyser node.
///
/// Blackman-windowed FFT, linear magnitudes smoothed over time, then mapped
/// from the `[min_decibels, max_decibels]` range onto `0..=255`.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    smoothed: Vec<f32>,
    window: Vec<f32>,
    fft: FftResources,
}

impl Analyser {
    pub fn new(config: &AudioConfig) -> Result<Self> {
        let fft_size = config.fft_size;
        if fft_size < 32 || !fft_size.is_power_of_two() {
            return Err(PlayerError::InvalidInput(
                "fft size must be a power of two of at least 32",
            ));
        }
        if config.max_decibels <= config.min_decibels {
            return Err(PlayerError::InvalidInput(
                "max decibels must exceed min decibels",
            ));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(fft_size);
        let fft = FftResources {
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        };

        Ok(Self {
            fft_size,
            smoothing: config.smoothing_time_constant.clamp(0.0, 1.0),
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            smoothed: vec![0.0; fft_size / 2],
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            fft,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins in every snapshot, half the FFT size.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Forgets the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|value| *value = 0.0);
    }

    /// Analyses the most recent `fft_size` time-domain samples.
    pub fn analyse(&mut self, samples: &[f32]) -> Result<FrequencySnapshot> {
        if samples.len() != self.fft_size {
            return Err(PlayerError::InvalidInput(
                "analysis window must match the fft size",
            ));
        }

        for ((slot, sample), weight) in self.fft.input.iter_mut().zip(samples).zip(&self.window) {
            *slot = sample * weight;
        }
        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let scale = 1.0 / self.fft_size as f32;
        let smoothing = self.smoothing;
        let min_decibels = self.min_decibels;
        let range = self.max_decibels - min_decibels;
        let bins = self
            .smoothed
            .iter_mut()
            .zip(&self.fft.spectrum)
            .map(|(smoothed, bin)| {
                let magnitude = bin.norm() * scale;
                *smoothed = smoothing * *smoothed + (1.0 - smoothing) * magnitude;
                let decibels = 20.0 * smoothed.log10();
                let scaled = 255.0 * (decibels - min_decibels) / range;
                // -inf for silent bins clamps to zero.
                scaled.clamp(0.0, 255.0) as u8
            })
            .collect();

        Ok(FrequencySnapshot::new(bins))
    }
}

struct FftResources {
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

fn blackman_value(index: usize, len: usize) -> f32 {
    let phase = 2.0 * PI * index as f32 / len as f32;
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}
