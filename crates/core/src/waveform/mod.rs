//! Waveform envelope generation, drawing and overlay placement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    audio::DecodedAudio,
    render::{Color, DrawCommand, Overlay, Point, Stroke, Surface, Viewport},
    WaveformConfig,
};

const FILL: Color = Color::rgba(94, 75, 182, 0.3);
const OUTLINE: Color = Color::rgba(255, 255, 255, 0.7);

/// Callback invoked with a target time when the waveform is clicked.
pub type SeekCallback = Box<dyn FnMut(f64) + Send>;

/// Per-pixel mean absolute amplitude, normalised to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WaveformEnvelope {
    values: Vec<f32>,
}

impl WaveformEnvelope {
    /// Splits `samples` into `width` near-equal blocks covering every sample
    /// and normalises their mean absolute amplitude by the loudest block.
    /// Silence yields all zeros. With fewer samples than pixels each sample
    /// is stretched over several columns.
    pub fn from_samples(samples: &[f32], width: usize) -> Self {
        if width == 0 {
            return Self::default();
        }

        let len = samples.len();
        let means: Vec<f32> = (0..width)
            .map(|pixel| {
                let start = pixel * len / width;
                let end = ((pixel + 1) * len / width).max(start + 1).min(len);
                let block = &samples[start.min(end)..end];
                if block.is_empty() {
                    return 0.0;
                }
                block.iter().map(|sample| sample.abs()).sum::<f32>() / block.len() as f32
            })
            .collect();

        let max = means.iter().copied().fold(0.0_f32, f32::max);
        let values = if max > 0.0 {
            means.iter().map(|mean| mean / max).collect()
        } else {
            vec![0.0; width]
        };

        Self { values }
    }

    /// One normalised value per pixel column.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Draws the track envelope and positions the playhead and loop overlays.
///
/// The renderer never talks to the engine; clicks are reported through the
/// seek callback.
pub struct WaveformRenderer<S> {
    surface: Option<S>,
    viewport: Viewport,
    config: WaveformConfig,
    source: Option<Arc<DecodedAudio>>,
    envelope: Option<WaveformEnvelope>,
    duration: f64,
    playhead: Overlay,
    loop_region: Overlay,
    on_seek: Option<SeekCallback>,
}

impl<S: Surface> WaveformRenderer<S> {
    /// A renderer without a surface accepts every call and does nothing.
    pub fn new(surface: Option<S>, viewport: Viewport, config: WaveformConfig) -> Self {
        let mut renderer = Self {
            surface,
            viewport,
            config,
            source: None,
            envelope: None,
            duration: 0.0,
            playhead: Overlay::default(),
            loop_region: Overlay::default(),
            on_seek: None,
        };
        renderer.apply_viewport();
        renderer
    }

    /// Registers the handler that receives click-to-seek targets.
    pub fn set_seek_callback(&mut self, callback: impl FnMut(f64) + Send + 'static) {
        self.on_seek = Some(Box::new(callback));
    }

    /// Builds a fresh envelope from the first channel and redraws.
    pub fn generate(&mut self, audio: Arc<DecodedAudio>) {
        let Some(surface) = self.surface.as_ref() else {
            return;
        };
        let width = surface.size().0 as usize;
        let samples = audio.channel(0).unwrap_or(&[]);

        self.duration = audio.duration();
        self.envelope = Some(WaveformEnvelope::from_samples(samples, width));
        self.source = Some(audio);
        tracing::debug!(width, duration = self.duration, "waveform generated");
        self.draw();
    }

    /// Mirrored filled outline, one column per envelope value.
    pub fn draw(&mut self) {
        let (Some(surface), Some(envelope)) = (self.surface.as_mut(), self.envelope.as_ref())
        else {
            return;
        };

        let half_height = surface.size().1 as f32 / 2.0;
        let scale = half_height * self.config.amplitude_scale;
        let values = envelope.values();

        let mut points = Vec::with_capacity(values.len() * 2 + 1);
        points.push(Point::new(0.0, half_height));
        points.extend(
            values
                .iter()
                .enumerate()
                .map(|(x, value)| Point::new(x as f32, half_height - value * scale)),
        );
        points.extend(
            values
                .iter()
                .enumerate()
                .rev()
                .map(|(x, value)| Point::new(x as f32, half_height + value * scale)),
        );

        surface.draw(DrawCommand::Clear);
        surface.draw(DrawCommand::Polygon {
            points,
            fill: Some(FILL),
            stroke: Some(Stroke {
                color: OUTLINE,
                width: 1.0,
            }),
        });
    }

    /// Adopts a new on-screen size. An existing envelope is rebuilt from the
    /// source audio because its resolution follows the pixel width.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.apply_viewport();
        if self.envelope.is_some() {
            if let Some(source) = self.source.clone() {
                self.generate(source);
            }
        }
    }

    /// Moves the playhead overlay to `current_time` and shows it.
    pub fn update_playhead(&mut self, current_time: f64) {
        if self.surface.is_none() || self.duration <= 0.0 {
            return;
        }
        self.playhead.left = self.time_to_offset(current_time);
        self.playhead.visible = true;
    }

    /// Hides the playhead, e.g. while paused.
    pub fn hide_playhead(&mut self) {
        self.playhead.visible = false;
    }

    /// Places the loop overlay over `[start, end]` seconds.
    pub fn update_loop_region(&mut self, start: f64, end: f64) {
        if self.surface.is_none() || self.duration <= 0.0 {
            return;
        }
        let left = self.time_to_offset(start);
        self.loop_region = Overlay {
            left,
            width: self.time_to_offset(end) - left,
            visible: true,
        };
    }

    /// Maps a click `offset_x` CSS pixels from the canvas' left edge to a
    /// time and reports it through the seek callback.
    pub fn handle_click(&mut self, offset_x: f32) -> Option<f64> {
        let width = self.viewport.css_width;
        if self.duration <= 0.0 || width <= 0.0 {
            return None;
        }
        let callback = self.on_seek.as_mut()?;
        let time = f64::from(offset_x / width) * self.duration;
        callback(time);
        Some(time)
    }

    /// Envelope of the last generated track, if any.
    pub fn envelope(&self) -> Option<&WaveformEnvelope> {
        self.envelope.as_ref()
    }

    /// Playhead overlay in CSS pixels.
    pub fn playhead(&self) -> Overlay {
        self.playhead
    }

    /// Loop region overlay in CSS pixels.
    pub fn loop_overlay(&self) -> Overlay {
        self.loop_region
    }

    /// Current on-screen size.
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// The drawing target, absent for a detached renderer.
    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    fn apply_viewport(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            let (width, height) = self.viewport.backing_size();
            surface.set_size(width, height);
        }
    }

    fn time_to_offset(&self, time: f64) -> f32 {
        ((time / self.duration) * f64::from(self.viewport.css_width)) as f32
    }
}

impl<S> std::fmt::Debug for WaveformRenderer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveformRenderer")
            .field("viewport", &self.viewport)
            .field("envelope", &self.envelope.as_ref().map(WaveformEnvelope::len))
            .field("duration", &self.duration)
            .field("playhead", &self.playhead)
            .field("loop_region", &self.loop_region)
            .finish()
    }
}
