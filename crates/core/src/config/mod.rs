use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub waveform: WaveformConfig,
    pub visualizer: VisualizerConfig,
    pub files: FileConfig,
    pub ui: UiConfig,
}

impl AppConfig {
    /// Parses a configuration document. Missing sections keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Configuration specific to the audio engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Analysis window length; must be a power of two.
    pub fft_size: usize,
    pub min_loop_duration: f64,
    pub seek_step: f64,
    pub default_volume: f32,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: 256,
            min_loop_duration: 0.1,
            seek_step: 5.0,
            default_volume: 0.5,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Fraction of the half height a full-scale block reaches.
    pub amplitude_scale: f32,
    pub height: f32,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            amplitude_scale: 0.8,
            height: 120.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub particle_count: usize,
    pub fade_alpha: f32,
    pub bar_width_multiplier: f32,
    pub bar_height_scale: f32,
    pub hue_base: f32,
    pub hue_range: f32,
    pub particle_size_min: f32,
    pub particle_size_max: f32,
    pub particle_velocity_range: f32,
    pub glow_blur: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            particle_count: 50,
            fade_alpha: 0.25,
            bar_width_multiplier: 2.5,
            bar_height_scale: 0.7,
            hue_base: 280.0,
            hue_range: 60.0,
            particle_size_min: 1.0,
            particle_size_max: 3.0,
            particle_velocity_range: 0.5,
            glow_blur: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub max_file_size: u64,
    pub supported_formats: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        let supported_formats = [
            "audio/mpeg",
            "audio/mp3",
            "audio/wav",
            "audio/ogg",
            "audio/mp4",
            "audio/aac",
            "audio/flac",
            "audio/webm",
        ]
        .iter()
        .map(|format| format.to_string())
        .collect();

        Self {
            max_file_size: 100 * 1024 * 1024,
            supported_formats,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub resize_debounce_ms: u64,
    pub error_notice_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            resize_debounce_ms: 250,
            error_notice_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_keep_defaults() {
        let config = AppConfig::from_json_str(r#"{ "audio": { "seek_step": 2.5 } }"#).unwrap();
        assert_eq!(config.audio.seek_step, 2.5);
        assert_eq!(config.audio.fft_size, 256);
        assert_eq!(config.visualizer.particle_count, 50);
        assert_eq!(config.files.max_file_size, 100 * 1024 * 1024);
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(AppConfig::from_json_str("{ audio: ").is_err());
    }
}
