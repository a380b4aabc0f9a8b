use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Dismissible error message that expires on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub ttl: Duration,
}

/// Everything the core asks of the host's user interface. The host owns all
/// widgets and translates raw input into calls on [`super::App`].
pub trait UiController: Send {
    fn set_file_name(&mut self, name: &str);
    fn show_player(&mut self);
    fn hide_player(&mut self);
    fn clear_file_input(&mut self);
    fn update_duration(&mut self, label: &str);
    fn update_current_time(&mut self, label: &str);
    /// Progress in percent of the track.
    fn update_progress(&mut self, percent: f64);
    fn update_play_button(&mut self, playing: bool);
    fn update_volume_slider(&mut self, volume: f32);
    fn update_mute_button(&mut self, muted: bool);
    /// Sets up the dual-handle loop slider over `[0, duration]`.
    fn initialize_loop_slider(&mut self, duration: f64);
    fn reset_loop_slider(&mut self, duration: f64);
    fn update_loop_display(&mut self, start: f64, end: f64);
    fn show_error(&mut self, notice: Notice);
}

/// UI state kept in plain fields, for command line hosts and tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadlessUi {
    pub file_name: Option<String>,
    pub player_visible: bool,
    pub duration_label: String,
    pub current_time_label: String,
    pub progress: f64,
    pub playing: bool,
    pub volume: f32,
    pub muted: bool,
    pub loop_slider: Option<(f64, f64)>,
    pub loop_display: Option<(f64, f64)>,
    pub notices: Vec<Notice>,
}

impl UiController for HeadlessUi {
    fn set_file_name(&mut self, name: &str) {
        self.file_name = Some(name.to_string());
    }

    fn show_player(&mut self) {
        self.player_visible = true;
    }

    fn hide_player(&mut self) {
        self.player_visible = false;
    }

    fn clear_file_input(&mut self) {
        self.file_name = None;
    }

    fn update_duration(&mut self, label: &str) {
        self.duration_label = label.to_string();
    }

    fn update_current_time(&mut self, label: &str) {
        self.current_time_label = label.to_string();
    }

    fn update_progress(&mut self, percent: f64) {
        self.progress = percent;
    }

    fn update_play_button(&mut self, playing: bool) {
        self.playing = playing;
    }

    fn update_volume_slider(&mut self, volume: f32) {
        self.volume = volume;
    }

    fn update_mute_button(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn initialize_loop_slider(&mut self, duration: f64) {
        self.loop_slider = Some((0.0, duration));
    }

    fn reset_loop_slider(&mut self, duration: f64) {
        self.loop_slider = Some((0.0, duration));
    }

    fn update_loop_display(&mut self, start: f64, end: f64) {
        self.loop_display = Some((start, end));
        if let Some(slider) = self.loop_slider.as_mut() {
            *slider = (start, end);
        }
    }

    fn show_error(&mut self, notice: Notice) {
        tracing::warn!(message = %notice.message, "error notice shown");
        self.notices.push(notice);
    }
}
