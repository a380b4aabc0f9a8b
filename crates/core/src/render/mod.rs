//! Drawing targets shared by the waveform and the visualiser.
//!
//! Rendering is expressed as [`DrawCommand`]s pushed into a [`Surface`]. The
//! bundled [`RecordingSurface`] keeps the display list so hosts can rasterise
//! it (or inspect it in tests).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Color {
    Rgba { r: u8, g: u8, b: u8, a: f32 },
    /// Hue in degrees, saturation and lightness in percent.
    Hsla { h: f32, s: f32, l: f32, a: f32 },
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self::Rgba { r, g, b, a }
    }

    pub const fn hsla(h: f32, s: f32, l: f32, a: f32) -> Self {
        Self::Hsla { h, s, l, a }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Paint {
    Solid(Color),
    LinearGradient {
        from: Point,
        to: Point,
        stops: Vec<GradientStop>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
}

/// Blurred halo drawn around a shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Glow {
    pub blur: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawCommand {
    Clear,
    FillRect {
        rect: Rect,
        paint: Paint,
    },
    /// Closed polygon, optionally filled and stroked.
    Polygon {
        points: Vec<Point>,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Circle {
        center: Point,
        radius: f32,
        fill: Color,
        glow: Option<Glow>,
    },
}

/// A 2D drawing target with a pixel backing store.
pub trait Surface: Send {
    /// Backing store size in device pixels.
    fn size(&self) -> (u32, u32);

    fn set_size(&mut self, width: u32, height: u32);

    fn draw(&mut self, command: DrawCommand);
}

/// Surface that keeps every command since the last clear.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingSurface {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        // Resizing a canvas wipes its contents.
        self.width = width;
        self.height = height;
        self.commands.clear();
    }

    fn draw(&mut self, command: DrawCommand) {
        if command == DrawCommand::Clear {
            self.commands.clear();
        }
        self.commands.push(command);
    }
}

/// On-screen size of a canvas in CSS pixels plus the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub css_width: f32,
    pub css_height: f32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    pub fn new(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
        Self {
            css_width: css_width.max(0.0),
            css_height: css_height.max(0.0),
            device_pixel_ratio: if device_pixel_ratio > 0.0 {
                device_pixel_ratio
            } else {
                1.0
            },
        }
    }

    /// Backing store dimensions in device pixels.
    pub fn backing_size(&self) -> (u32, u32) {
        (
            (self.css_width * self.device_pixel_ratio).round() as u32,
            (self.css_height * self.device_pixel_ratio).round() as u32,
        )
    }
}

/// Absolutely positioned element laid over a canvas (playhead, loop region).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Overlay {
    /// Left offset in CSS pixels.
    pub left: f32,
    /// Width in CSS pixels; unused for the playhead line.
    pub width: f32,
    pub visible: bool,
}
