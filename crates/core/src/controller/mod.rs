//! Thin orchestrator wiring file intake, the engine and both renderers to the
//! host's user interface.

mod keys;
mod ui;

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

pub use keys::{Key, KeyAction, KeyEvent};
pub use ui::{HeadlessUi, Notice, UiController};

use crate::{
    audio::{AudioEngine, DecodedAudio, EngineHandle, LoopRegion},
    files::{AudioFile, FileManager},
    render::{Surface, Viewport},
    timeline::{AudioClock, Debouncer, FrameControl, FrameScheduler, FrameTask},
    visualizer::{SharedVisualizer, Visualizer, VisualizerLoop},
    waveform::WaveformRenderer,
    AppConfig, PlayerError, Result,
};

pub type SharedWaveform<S> = Arc<Mutex<WaveformRenderer<S>>>;
pub type SharedUi<U> = Arc<Mutex<U>>;

/// `m:ss`, with `0:00` for zero or invalid input.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let whole = seconds.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

/// Capabilities the host must provide before a session can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSupport {
    pub audio_clock: bool,
    pub file_access: bool,
    pub animation_frames: bool,
}

impl PlatformSupport {
    /// Everything a native headless host has.
    pub fn native() -> Self {
        Self {
            audio_clock: true,
            file_access: true,
            animation_frames: true,
        }
    }

    pub fn missing(&self) -> Vec<String> {
        [
            (self.audio_clock, "audio clock"),
            (self.file_access, "file access"),
            (self.animation_frames, "animation frames"),
        ]
        .iter()
        .filter(|(present, _)| !present)
        .map(|(_, name)| name.to_string())
        .collect()
    }

    pub fn check(&self) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PlayerError::BackendUnsupported { missing })
        }
    }
}

/// Application controller. The only layer that surfaces errors to the user.
pub struct App<U, S> {
    config: AppConfig,
    engine: EngineHandle,
    waveform: SharedWaveform<S>,
    visualizer: SharedVisualizer<S>,
    ui: SharedUi<U>,
    files: FileManager,
    scheduler: FrameScheduler,
    resize: Debouncer,
    pending_viewport: Option<Viewport>,
}

impl<U, S> App<U, S>
where
    U: UiController + 'static,
    S: Surface + 'static,
{
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn AudioClock>,
        ui: U,
        waveform: WaveformRenderer<S>,
        visualizer: Visualizer<S>,
    ) -> Result<Self> {
        let mut engine = AudioEngine::new(config.audio.clone(), clock);
        engine.initialize()?;
        let volume = engine.volume();
        let engine = EngineHandle::new(engine);

        let mut waveform = waveform;
        let seek_target = engine.clone();
        waveform.set_seek_callback(move |time| {
            if let Err(err) = seek_target.seek(time) {
                tracing::warn!(%err, "waveform seek failed");
            }
        });

        let mut ui = ui;
        ui.update_volume_slider(volume);

        let mut app = Self {
            files: FileManager::new(config.files.clone()),
            resize: Debouncer::new(Duration::from_millis(config.ui.resize_debounce_ms)),
            config,
            engine,
            waveform: Arc::new(Mutex::new(waveform)),
            visualizer: Arc::new(Mutex::new(visualizer)),
            ui: Arc::new(Mutex::new(ui)),
            scheduler: FrameScheduler::new(),
            pending_viewport: None,
        };
        app.scheduler.request(ProgressTick {
            engine: app.engine.clone(),
            waveform: app.waveform.clone(),
            ui: app.ui.clone(),
        });
        Ok(app)
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn waveform(&self) -> &SharedWaveform<S> {
        &self.waveform
    }

    pub fn visualizer(&self) -> &SharedVisualizer<S> {
        &self.visualizer
    }

    pub fn ui(&self) -> &SharedUi<U> {
        &self.ui
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Reads, validates and loads a file from disk.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        match self.files.load_path(path) {
            Ok(file) => self.handle_file_load(file),
            Err(err) => {
                self.notify(&err);
                Err(err)
            }
        }
    }

    /// Validates and loads bytes the host already read.
    pub fn load_bytes(&mut self, name: &str, mime: &str, bytes: Vec<u8>) -> Result<()> {
        match self.files.load_bytes(name, mime, bytes) {
            Ok(file) => self.handle_file_load(file),
            Err(err) => {
                self.notify(&err);
                Err(err)
            }
        }
    }

    fn handle_file_load(&mut self, file: AudioFile) -> Result<()> {
        self.stop_visualizer()?;
        let loaded = {
            let mut engine = self.engine.lock()?;
            engine.load_buffer(&file.bytes, file.extension().as_deref())
        };
        let audio = match loaded {
            Ok(audio) => audio,
            Err(err) => {
                self.notify(&err);
                self.clear_file()?;
                return Err(err);
            }
        };

        if let Err(err) = self.present_loaded(&file.name, audio) {
            self.notify(&err);
            self.clear_file()?;
            return Err(err);
        }
        Ok(())
    }

    /// Shows a freshly decoded track with the loop the engine reset it to.
    fn present_loaded(&mut self, name: &str, audio: Arc<DecodedAudio>) -> Result<()> {
        let duration = audio.duration();
        {
            let mut ui = lock(&self.ui, "ui")?;
            ui.set_file_name(name);
            ui.show_player();
            ui.update_duration(&format_time(duration));
            ui.update_play_button(false);
            ui.initialize_loop_slider(duration);
        }
        lock(&self.waveform, "waveform")?.generate(audio);
        let region = self.engine.lock()?.loop_region();
        self.show_loop(region)
    }

    /// Forwards a `[start, end]` pair from the loop slider.
    pub fn handle_loop_update(&mut self, start: f64, end: f64) -> Result<()> {
        if let Err(err) = self.engine.lock()?.set_loop_points(start, end) {
            tracing::warn!(%err, "loop update rejected");
            return Err(err);
        }
        self.show_loop(LoopRegion::new(start, end))
    }

    /// Returns the loop to the whole track.
    pub fn reset_loop(&mut self) -> Result<()> {
        let region = {
            let mut engine = self.engine.lock()?;
            if !engine.has_buffer() {
                return Ok(());
            }
            engine.reset_loop()
        };
        lock(&self.ui, "ui")?.reset_loop_slider(region.end);
        self.show_loop(region)
    }

    fn show_loop(&mut self, region: LoopRegion) -> Result<()> {
        lock(&self.ui, "ui")?.update_loop_display(region.start, region.end);
        lock(&self.waveform, "waveform")?.update_loop_region(region.start, region.end);
        Ok(())
    }

    /// Drops the current file and returns to the pre-load state.
    pub fn clear_file(&mut self) -> Result<()> {
        self.engine.lock()?.stop();
        self.stop_visualizer()?;
        self.files.clear();
        {
            let mut ui = lock(&self.ui, "ui")?;
            ui.hide_player();
            ui.clear_file_input();
            ui.update_play_button(false);
        }
        lock(&self.waveform, "waveform")?.hide_playhead();
        Ok(())
    }

    pub fn toggle_play_pause(&mut self) -> Result<()> {
        let (loaded, playing) = {
            let engine = self.engine.lock()?;
            (engine.has_buffer(), engine.is_playing())
        };
        match (loaded, playing) {
            (false, _) => Ok(()),
            (true, true) => self.pause(),
            (true, false) => self.play(),
        }
    }

    pub fn play(&mut self) -> Result<()> {
        let playing = {
            let mut engine = self.engine.lock()?;
            engine.play()?;
            engine.is_playing()
        };
        if !playing {
            return Ok(());
        }
        lock(&self.ui, "ui")?.update_play_button(true);

        let started = lock(&self.visualizer, "visualiser")?.start(self.engine.clone());
        if started {
            self.scheduler
                .request(VisualizerLoop::new(self.visualizer.clone())?);
        }
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.engine.lock()?.pause();
        lock(&self.ui, "ui")?.update_play_button(false);
        self.stop_visualizer()
    }

    /// Seeks to a fraction of the track, as from a progress bar click.
    pub fn seek_to_fraction(&mut self, fraction: f64) -> Result<()> {
        let mut engine = self.engine.lock()?;
        if !engine.has_buffer() {
            return Ok(());
        }
        let time = fraction.clamp(0.0, 1.0) * engine.duration();
        engine.seek(time);
        Ok(())
    }

    pub fn seek_relative(&mut self, delta: f64) -> Result<()> {
        self.engine.lock()?.seek_relative(delta);
        Ok(())
    }

    pub fn set_volume(&mut self, level: f32) -> Result<()> {
        self.engine.lock()?.set_volume(level);
        lock(&self.ui, "ui")?.update_mute_button(level <= 0.0);
        Ok(())
    }

    pub fn toggle_mute(&mut self) -> Result<f32> {
        let volume = self.engine.lock()?.toggle_mute()?;
        let mut ui = lock(&self.ui, "ui")?;
        ui.update_volume_slider(volume);
        ui.update_mute_button(volume == 0.0);
        Ok(volume)
    }

    /// Applies the keyboard contract. Returns whether the key was consumed.
    pub fn handle_key(&mut self, event: KeyEvent) -> Result<bool> {
        let Some(action) = event.action(self.config.audio.seek_step) else {
            return Ok(false);
        };
        match action {
            KeyAction::TogglePlay => self.toggle_play_pause()?,
            KeyAction::SeekBy(delta) => self.seek_relative(delta)?,
            KeyAction::ToggleMute => {
                self.toggle_mute()?;
            }
        }
        Ok(true)
    }

    /// Click on the waveform, `offset_x` CSS pixels from its left edge.
    pub fn waveform_click(&mut self, offset_x: f32) -> Result<Option<f64>> {
        Ok(lock(&self.waveform, "waveform")?.handle_click(offset_x))
    }

    /// The visualiser canvas follows the window immediately.
    pub fn on_window_resize(&mut self, width: u32, height: u32) -> Result<()> {
        lock(&self.visualizer, "visualiser")?.resize(width, height);
        Ok(())
    }

    /// Waveform resizes are debounced; the last viewport wins.
    pub fn on_waveform_resize(&mut self, viewport: Viewport, now: f64) {
        self.pending_viewport = Some(viewport);
        self.resize.trigger(now);
    }

    /// Runs one animation frame: pending resize, progress tick, visualiser.
    pub fn run_frame(&mut self, now: f64) -> Result<()> {
        if self.resize.poll(now) {
            if let Some(viewport) = self.pending_viewport.take() {
                tracing::debug!(width = viewport.css_width, "applying waveform resize");
                lock(&self.waveform, "waveform")?.resize(viewport);
            }
        }
        self.scheduler.run_frame(now);
        Ok(())
    }

    fn stop_visualizer(&mut self) -> Result<()> {
        lock(&self.visualizer, "visualiser")?.stop();
        Ok(())
    }

    fn notify(&self, err: &PlayerError) {
        tracing::warn!(%err, "file load failed");
        let notice = Notice {
            message: err.user_message(),
            ttl: Duration::from_millis(self.config.ui.error_notice_ms),
        };
        match lock(&self.ui, "ui") {
            Ok(mut ui) => ui.show_error(notice),
            Err(lock_err) => tracing::error!(%lock_err, "could not show error notice"),
        }
    }
}

impl<U, S> std::fmt::Debug for App<U, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("engine", &self.engine)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

/// Per-frame playback UI refresh. Keeps running for the app's lifetime and
/// hides the playhead whenever nothing is playing.
struct ProgressTick<U, S> {
    engine: EngineHandle,
    waveform: SharedWaveform<S>,
    ui: SharedUi<U>,
}

impl<U, S> ProgressTick<U, S>
where
    U: UiController,
    S: Surface,
{
    fn refresh(&self) -> Result<()> {
        let (playing, time, duration) = {
            let engine = self.engine.lock()?;
            (engine.is_playing(), engine.current_time(), engine.duration())
        };

        if playing && duration > 0.0 {
            {
                let mut ui = lock(&self.ui, "ui")?;
                ui.update_current_time(&format_time(time));
                ui.update_progress(time / duration * 100.0);
            }
            lock(&self.waveform, "waveform")?.update_playhead(time);
        } else {
            lock(&self.waveform, "waveform")?.hide_playhead();
        }
        Ok(())
    }
}

impl<U, S> FrameTask for ProgressTick<U, S>
where
    U: UiController + 'static,
    S: Surface + 'static,
{
    fn on_frame(&mut self, _timestamp: f64) -> FrameControl {
        if let Err(err) = self.refresh() {
            tracing::warn!(%err, "progress refresh failed");
        }
        FrameControl::Continue
    }
}

fn lock<'a, T>(shared: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    shared
        .lock()
        .map_err(|_| PlayerError::msg(format!("{name} has been poisoned")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{render::RecordingSurface, timeline::ManualClock};

    type TestApp = App<HeadlessUi, RecordingSurface>;

    fn app() -> (TestApp, Arc<ManualClock>) {
        let config = AppConfig::default();
        let clock = Arc::new(ManualClock::new(10.0));
        let waveform = WaveformRenderer::new(
            Some(RecordingSurface::default()),
            Viewport::new(200.0, 120.0, 1.0),
            config.waveform.clone(),
        );
        let visualizer =
            Visualizer::with_seed(Some(RecordingSurface::new(320, 200)), config.visualizer.clone(), 1);
        let app = App::new(config, clock.clone(), HeadlessUi::default(), waveform, visualizer)
            .unwrap();
        (app, clock)
    }

    fn wav(seconds: u32, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..seconds * sample_rate {
                let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn ui_state(app: &TestApp) -> HeadlessUi {
        app.ui().lock().unwrap().clone()
    }

    #[test]
    fn formats_times() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(65.9), "1:05");
        assert_eq!(format_time(600.0), "10:00");
    }

    #[test]
    fn reports_missing_capabilities() {
        assert!(PlatformSupport::native().check().is_ok());
        let err = PlatformSupport {
            audio_clock: false,
            ..PlatformSupport::native()
        }
        .check()
        .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn volume_ui_is_ready_before_any_file() {
        let (app, _) = app();
        assert_eq!(ui_state(&app).volume, 0.5);
    }

    #[test]
    fn loading_a_file_shows_the_player_and_default_loop() {
        let (mut app, _) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();

        let ui = ui_state(&app);
        assert_eq!(ui.file_name.as_deref(), Some("beat.wav"));
        assert!(ui.player_visible);
        assert_eq!(ui.duration_label, "0:10");
        assert_eq!(ui.loop_display, Some((0.0, 10.0)));

        let waveform = app.waveform().lock().unwrap();
        assert_eq!(waveform.envelope().unwrap().len(), 200);
        assert_eq!(waveform.loop_overlay().width, 200.0);
    }

    #[test]
    fn clips_shorter_than_the_minimum_loop_still_load() {
        let (mut app, _) = app();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..400 {
                writer.write_sample(((i % 16) * 1000) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }

        app.load_bytes("click.wav", "audio/wav", cursor.into_inner())
            .unwrap();
        let ui = ui_state(&app);
        assert!(ui.player_visible);
        assert!(ui.notices.is_empty());
        assert_eq!(ui.loop_display, Some((0.0, 0.05)));
        assert_eq!(
            app.engine().lock().unwrap().loop_region(),
            LoopRegion::new(0.0, 0.05)
        );

        app.reset_loop().unwrap();
        assert_eq!(ui_state(&app).loop_slider, Some((0.0, 0.05)));
    }

    #[test]
    fn undecodable_files_revert_to_the_pre_load_state() {
        let (mut app, _) = app();
        let err = app
            .load_bytes("broken.wav", "audio/wav", b"RIFF garbage".to_vec())
            .unwrap_err();
        assert!(matches!(err, PlayerError::Decode(_)));

        let ui = ui_state(&app);
        assert!(!ui.player_visible);
        assert_eq!(ui.notices.len(), 1);
        assert_eq!(ui.notices[0].ttl, Duration::from_millis(5000));
        assert!(app.files().current_file().is_none());
    }

    #[test]
    fn wrong_type_is_reported_without_state_change() {
        let (mut app, _) = app();
        let err = app.load_bytes("notes.txt", "text/plain", vec![0; 4]).unwrap_err();
        assert!(matches!(err, PlayerError::UnsupportedFileType { .. }));
        assert_eq!(ui_state(&app).notices[0].message, err.user_message());
    }

    #[test]
    fn play_pause_drives_visualiser_and_progress() {
        let (mut app, clock) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();

        app.handle_key(KeyEvent::new(Key::Space)).unwrap();
        assert!(app.visualizer().lock().unwrap().is_running());
        assert_eq!(app.scheduler().pending(), 2);

        clock.advance(2.0);
        app.run_frame(clock.now()).unwrap();
        let ui = ui_state(&app);
        assert!(ui.playing);
        assert_eq!(ui.current_time_label, "0:02");
        assert!((ui.progress - 20.0).abs() < 1e-9);
        assert!(app.waveform().lock().unwrap().playhead().visible);

        app.toggle_play_pause().unwrap();
        app.run_frame(clock.now()).unwrap();
        assert!(!app.visualizer().lock().unwrap().is_running());
        assert!(!app.waveform().lock().unwrap().playhead().visible);
        assert_eq!(app.scheduler().pending(), 1);
        assert_eq!(app.engine().current_time().unwrap(), 2.0);
    }

    #[test]
    fn arrow_keys_seek_by_the_step_and_clamp() {
        let (mut app, _) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();
        app.seek_to_fraction(0.2).unwrap();

        app.handle_key(KeyEvent::new(Key::ArrowLeft)).unwrap();
        assert_eq!(app.engine().current_time().unwrap(), 0.0);
        app.handle_key(KeyEvent::new(Key::ArrowRight)).unwrap();
        assert_eq!(app.engine().current_time().unwrap(), 5.0);

        let typing = KeyEvent {
            key: Key::ArrowRight,
            in_text_input: true,
        };
        assert!(!app.handle_key(typing).unwrap());
        assert_eq!(app.engine().current_time().unwrap(), 5.0);
    }

    #[test]
    fn mute_key_toggles_volume() {
        let (mut app, _) = app();
        app.handle_key(KeyEvent::new(Key::Character('M'))).unwrap();
        assert!(ui_state(&app).muted);
        app.handle_key(KeyEvent::new(Key::Character('m'))).unwrap();
        let ui = ui_state(&app);
        assert!(!ui.muted);
        assert_eq!(ui.volume, 0.5);
    }

    #[test]
    fn waveform_click_seeks_the_engine() {
        let (mut app, _) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();
        assert_eq!(app.waveform_click(150.0).unwrap(), Some(7.5));
        assert_eq!(app.engine().current_time().unwrap(), 7.5);
    }

    #[test]
    fn loop_updates_reach_engine_waveform_and_ui() {
        let (mut app, _) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();
        app.handle_loop_update(2.0, 4.0).unwrap();

        assert_eq!(ui_state(&app).loop_display, Some((2.0, 4.0)));
        let overlay = app.waveform().lock().unwrap().loop_overlay();
        assert_eq!((overlay.left, overlay.width), (40.0, 40.0));

        assert!(app.handle_loop_update(3.0, 3.01).is_err());
        app.reset_loop().unwrap();
        assert_eq!(ui_state(&app).loop_display, Some((0.0, 10.0)));
    }

    #[test]
    fn waveform_resize_is_debounced() {
        let (mut app, _) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();

        app.on_waveform_resize(Viewport::new(150.0, 120.0, 1.0), 1.0);
        app.on_waveform_resize(Viewport::new(100.0, 120.0, 1.0), 1.1);
        app.run_frame(1.2).unwrap();
        assert_eq!(app.waveform().lock().unwrap().envelope().unwrap().len(), 200);

        app.run_frame(1.4).unwrap();
        assert_eq!(app.waveform().lock().unwrap().envelope().unwrap().len(), 100);
    }

    #[test]
    fn clearing_stops_everything() {
        let (mut app, _) = app();
        app.load_bytes("beat.wav", "audio/wav", wav(10, 1000)).unwrap();
        app.play().unwrap();
        app.clear_file().unwrap();

        assert!(!app.engine().lock().unwrap().is_playing());
        assert!(!app.visualizer().lock().unwrap().is_running());
        let ui = ui_state(&app);
        assert!(!ui.player_visible);
        assert!(!ui.playing);
    }
}
