//! Audio-reactive background visualiser.
//!
//! Runs on its own frame task, independent of the playback tick. Bar heights,
//! particle speed, particle brightness and particle size all key off the same
//! average magnitude so the whole field reacts to one loudness signal.

use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::FrequencySnapshot,
    audio::EngineHandle,
    render::{Color, DrawCommand, Glow, GradientStop, Paint, Point, Rect, Surface},
    timeline::{FrameControl, FrameTask},
    PlayerError, Result, VisualizerConfig,
};

const BACKDROP: (u8, u8, u8) = (15, 15, 35);
const BAR_GAP: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Point,
    pub velocity: Point,
    pub size: f32,
    pub hue: f32,
    pub brightness: f32,
}

/// Particles live as long as the visualiser; they wrap instead of dying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParticleField {
    particles: Vec<Particle>,
}

impl ParticleField {
    /// Scatters `particle_count` particles over a `width` x `height` canvas.
    pub fn spawn(config: &VisualizerConfig, width: f32, height: f32, rng: &mut impl Rng) -> Self {
        let particles = (0..config.particle_count)
            .map(|_| Particle {
                position: Point::new(rng.gen::<f32>() * width, rng.gen::<f32>() * height),
                velocity: Point::new(
                    (rng.gen::<f32>() - 0.5) * config.particle_velocity_range,
                    (rng.gen::<f32>() - 0.5) * config.particle_velocity_range,
                ),
                size: rng.gen::<f32>() * (config.particle_size_max - config.particle_size_min)
                    + config.particle_size_min,
                hue: rng.gen::<f32>() * config.hue_range + (config.hue_base - config.hue_range),
                brightness: 50.0,
            })
            .collect();
        Self { particles }
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Moves every particle one frame; louder audio drifts faster.
    pub fn advance(&mut self, average: f32, width: f32, height: f32) {
        let speed = 1.0 + average / 100.0;
        for particle in &mut self.particles {
            particle.position.x += particle.velocity.x * speed;
            particle.position.y += particle.velocity.y * speed;

            if particle.position.x < 0.0 {
                particle.position.x = width;
            }
            if particle.position.x > width {
                particle.position.x = 0.0;
            }
            if particle.position.y < 0.0 {
                particle.position.y = height;
            }
            if particle.position.y > height {
                particle.position.y = 0.0;
            }

            particle.brightness = 50.0 + (average / 255.0) * 50.0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// No analysis data yet; nothing drawn, particles untouched.
    Skipped,
}

pub struct Visualizer<S> {
    surface: Option<S>,
    config: VisualizerConfig,
    field: ParticleField,
    rng: StdRng,
    engine: Option<EngineHandle>,
    running: bool,
    generation: u64,
}

impl<S: Surface> Visualizer<S> {
    /// Visualiser with an entropy-seeded particle layout.
    pub fn new(surface: Option<S>, config: VisualizerConfig) -> Self {
        Self::with_rng(surface, config, StdRng::from_entropy())
    }

    /// Deterministic particle layout for reproducible output.
    pub fn with_seed(surface: Option<S>, config: VisualizerConfig, seed: u64) -> Self {
        Self::with_rng(surface, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(surface: Option<S>, config: VisualizerConfig, rng: StdRng) -> Self {
        let mut visualizer = Self {
            surface,
            config,
            field: ParticleField::default(),
            rng,
            engine: None,
            running: false,
            generation: 0,
        };
        visualizer.respawn();
        visualizer
    }

    /// Matches the backing store to the window and reseeds the particles.
    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(surface) = self.surface.as_mut() {
            surface.set_size(width, height);
        }
        self.respawn();
    }

    /// Begins rendering against `engine`. Returns `false` when already running
    /// or when there is nothing to draw on.
    pub fn start(&mut self, engine: EngineHandle) -> bool {
        if self.surface.is_none() || self.running {
            return false;
        }
        self.engine = Some(engine);
        self.running = true;
        self.generation += 1;
        tracing::debug!(generation = self.generation, "visualiser started");
        true
    }

    /// Stops rendering and clears the canvas.
    pub fn stop(&mut self) {
        self.running = false;
        if let Some(surface) = self.surface.as_mut() {
            surface.draw(DrawCommand::Clear);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Incremented on every successful start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn particles(&self) -> &ParticleField {
        &self.field
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    /// Renders one frame from the engine's current analysis.
    pub fn render_frame(&mut self) -> Result<FrameOutcome> {
        let engine = self.engine.as_ref().ok_or(PlayerError::AnalysisUnavailable)?;
        let Some(snapshot) = engine.frequency_snapshot()? else {
            return Ok(FrameOutcome::Skipped);
        };
        let volume = engine.volume()?;
        Ok(self.paint(&snapshot, volume))
    }

    /// Draws a frame for an already sampled snapshot.
    pub fn paint(&mut self, snapshot: &FrequencySnapshot, volume: f32) -> FrameOutcome {
        let Some(surface) = self.surface.as_mut() else {
            return FrameOutcome::Skipped;
        };
        let (width, height) = surface.size();
        let (width, height) = (width as f32, height as f32);
        let average = snapshot.average();

        let (r, g, b) = BACKDROP;
        surface.draw(DrawCommand::FillRect {
            rect: Rect::new(0.0, 0.0, width, height),
            paint: Paint::Solid(Color::rgba(r, g, b, self.config.fade_alpha)),
        });

        draw_bars(surface, &self.config, snapshot, width, height, volume);

        self.field.advance(average, width, height);
        let radius_scale = 1.0 + average / 200.0;
        for particle in self.field.particles() {
            let Particle {
                position,
                size,
                hue,
                brightness,
                ..
            } = *particle;
            surface.draw(DrawCommand::Circle {
                center: position,
                radius: size * radius_scale,
                fill: Color::hsla(hue, 70.0, brightness, 0.5),
                glow: Some(Glow {
                    blur: self.config.glow_blur,
                    color: Color::hsla(hue, 70.0, brightness, 0.3),
                }),
            });
        }

        FrameOutcome::Drawn
    }

    fn respawn(&mut self) {
        let (width, height) = self
            .surface
            .as_ref()
            .map(S::size)
            .unwrap_or((0, 0));
        self.field = ParticleField::spawn(&self.config, width as f32, height as f32, &mut self.rng);
    }
}

fn draw_bars<S: Surface>(
    surface: &mut S,
    config: &VisualizerConfig,
    snapshot: &FrequencySnapshot,
    width: f32,
    height: f32,
    volume: f32,
) {
    if snapshot.is_empty() {
        return;
    }
    // Bars are deliberately wider than their slot and overlap.
    let bar_width = width / snapshot.len() as f32 * config.bar_width_multiplier;
    let mut x = 0.0;

    for (index, bin) in snapshot.bins().iter().enumerate() {
        let bar_height = f32::from(*bin) / 255.0 * height * config.bar_height_scale * volume;
        let hue = config.hue_base - index as f32 * 0.5;

        surface.draw(DrawCommand::FillRect {
            rect: Rect::new(x, height - bar_height, bar_width - BAR_GAP, bar_height),
            paint: Paint::LinearGradient {
                from: Point::new(0.0, height - bar_height),
                to: Point::new(0.0, height),
                stops: vec![
                    GradientStop {
                        offset: 0.0,
                        color: Color::hsla(hue, 70.0, 60.0, 0.8),
                    },
                    GradientStop {
                        offset: 1.0,
                        color: Color::hsla(hue, 70.0, 40.0, 0.3),
                    },
                ],
            },
        });
        surface.draw(DrawCommand::FillRect {
            rect: Rect::new(x, 0.0, bar_width - BAR_GAP, bar_height * 0.3),
            paint: Paint::Solid(Color::hsla(hue, 70.0, 50.0, 0.1)),
        });

        x += bar_width;
    }
}

impl<S> std::fmt::Debug for Visualizer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("particles", &self.field.len())
            .field("running", &self.running)
            .field("generation", &self.generation)
            .finish()
    }
}

pub type SharedVisualizer<S> = Arc<Mutex<Visualizer<S>>>;

/// Frame task driving a shared visualiser until it is stopped or restarted.
pub struct VisualizerLoop<S> {
    visualizer: SharedVisualizer<S>,
    generation: u64,
}

impl<S: Surface + 'static> VisualizerLoop<S> {
    /// Binds to the visualiser's current run; an older loop stops on its own
    /// once the visualiser is restarted.
    pub fn new(visualizer: SharedVisualizer<S>) -> Result<Self> {
        let generation = visualizer
            .lock()
            .map_err(|_| PlayerError::msg("visualiser has been poisoned"))?
            .generation();
        Ok(Self {
            visualizer,
            generation,
        })
    }
}

impl<S: Surface + 'static> FrameTask for VisualizerLoop<S> {
    fn on_frame(&mut self, _timestamp: f64) -> FrameControl {
        let Ok(mut visualizer) = self.visualizer.lock() else {
            tracing::warn!("visualiser poisoned, stopping its loop");
            return FrameControl::Stop;
        };
        if !visualizer.is_running() || visualizer.generation() != self.generation {
            return FrameControl::Stop;
        }

        if let Err(err) = visualizer.render_frame() {
            tracing::trace!(%err, "visualiser frame skipped");
        }
        FrameControl::Continue
    }
}
