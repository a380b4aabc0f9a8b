//! Core library for the Cadenzio loop player.
//!
//! Each module owns one subsystem: file intake, decoding and transport,
//! spectral analysis, waveform and visualiser rendering, and the controller
//! that wires them to a host user interface. Nothing here talks to a window
//! system or audio device directly; hosts implement [`render::Surface`],
//! [`timeline::AudioClock`] and [`controller::UiController`].

pub mod analysis;
pub mod audio;
pub mod config;
pub mod controller;
pub mod error;
pub mod files;
pub mod render;
pub mod timeline;
pub mod visualizer;
pub mod waveform;

pub use analysis::{Analyser, FrequencySnapshot};
pub use audio::{AudioEngine, DecodedAudio, EngineHandle, LoopRegion, TransportState};
pub use config::{AppConfig, AudioConfig, FileConfig, UiConfig, VisualizerConfig, WaveformConfig};
pub use controller::{format_time, App, HeadlessUi, KeyEvent, UiController};
pub use error::{PlayerError, Result};
pub use files::{AudioFile, FileManager};
pub use render::{DrawCommand, RecordingSurface, Surface, Viewport};
pub use timeline::{AudioClock, FrameScheduler, ManualClock, SystemClock};
pub use visualizer::Visualizer;
pub use waveform::{WaveformEnvelope, WaveformRenderer};
