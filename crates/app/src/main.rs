use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::Duration,
};

use cadenzio_core::{
    controller::PlatformSupport, files::format_file_size, format_time,
    render::RecordingSurface, App, AppConfig, AudioClock, DrawCommand, FileManager, HeadlessUi,
    PlayerError, SystemClock, Viewport, Visualizer, WaveformRenderer,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> cadenzio_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Play {
            file,
            loop_start,
            loop_end,
            seconds,
            fps,
            width,
        } => run_play(
            config,
            &file,
            PlayOptions {
                loop_start,
                loop_end,
                seconds,
                fps,
                width,
            },
        ),
        Commands::Waveform {
            file,
            width,
            height,
            output,
        } => run_waveform(config, &file, width, height, output.as_deref()),
        Commands::Inspect { file } => run_inspect(config, &file),
    }
}

struct PlayOptions {
    loop_start: Option<f64>,
    loop_end: Option<f64>,
    seconds: f64,
    fps: u32,
    width: f32,
}

fn run_play(config: AppConfig, file: &Path, options: PlayOptions) -> cadenzio_core::Result<()> {
    tracing::info!(?file, seconds = options.seconds, "starting headless playback");
    if let Err(err) = PlatformSupport::native().check() {
        tracing::error!(%err, "platform check failed");
        return Err(err);
    }

    let clock: Arc<dyn AudioClock> = Arc::new(SystemClock::new());
    let waveform = WaveformRenderer::new(
        Some(RecordingSurface::default()),
        Viewport::new(options.width, config.waveform.height, 1.0),
        config.waveform.clone(),
    );
    let visualizer = Visualizer::new(
        Some(RecordingSurface::new(options.width as u32, 360)),
        config.visualizer.clone(),
    );
    let mut app = App::new(
        config,
        clock.clone(),
        HeadlessUi::default(),
        waveform,
        visualizer,
    )?;

    app.load_path(file)?;
    if options.loop_start.is_some() || options.loop_end.is_some() {
        let duration = app.engine().lock()?.duration();
        app.handle_loop_update(
            options.loop_start.unwrap_or(0.0),
            options.loop_end.unwrap_or(duration),
        )?;
    }
    app.play()?;

    let fps = options.fps.max(1);
    let frame = Duration::from_secs_f64(1.0 / f64::from(fps));
    let mut last_logged = String::new();
    while clock.now() < options.seconds {
        app.run_frame(clock.now())?;

        let drawn = app
            .visualizer()
            .lock()
            .map_err(|_| PlayerError::msg("visualiser has been poisoned"))?
            .surface_mut()
            .map(|surface| surface.take_commands().len())
            .unwrap_or(0);
        tracing::trace!(drawn, "visualiser frame");

        let label = app
            .ui()
            .lock()
            .map_err(|_| PlayerError::msg("ui has been poisoned"))?
            .current_time_label
            .clone();
        if label != last_logged {
            tracing::info!(time = %label, "playing");
            last_logged = label;
        }
        thread::sleep(frame);
    }

    app.pause()?;
    let position = app.engine().current_time()?;
    tracing::info!(position = %format_time(position), "playback finished");
    Ok(())
}

fn run_waveform(
    config: AppConfig,
    file: &Path,
    width: f32,
    height: f32,
    output: Option<&Path>,
) -> cadenzio_core::Result<()> {
    tracing::info!(?file, width, height, "rendering waveform");

    let mut files = FileManager::new(config.files.clone());
    let audio = files.load_path(file)?;
    let decoded = cadenzio_core::audio::decode_audio(&audio.bytes, audio.extension().as_deref())?;

    let mut renderer = WaveformRenderer::new(
        Some(RecordingSurface::default()),
        Viewport::new(width, height, 1.0),
        config.waveform,
    );
    renderer.generate(Arc::new(decoded));

    let commands: &[DrawCommand] = renderer
        .surface()
        .map(RecordingSurface::commands)
        .unwrap_or(&[]);
    let document = json!({
        "file": audio.name,
        "envelope": renderer.envelope(),
        "commands": commands,
    });
    let rendered = serde_json::to_string_pretty(&document)?;

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            tracing::info!(?path, "waveform written");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn run_inspect(config: AppConfig, file: &Path) -> cadenzio_core::Result<()> {
    let mut files = FileManager::new(config.files);
    let audio = files.load_path(file)?;
    let decoded = cadenzio_core::audio::decode_audio(&audio.bytes, audio.extension().as_deref())?;

    let summary = json!({
        "name": audio.name,
        "mime": audio.mime,
        "size": format_file_size(audio.size()),
        "duration": format_time(decoded.duration()),
        "channels": decoded.channel_count(),
        "sample_rate": decoded.sample_rate(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Looping audio player with waveform and visualiser", long_about = None)]
struct Cli {
    /// JSON configuration overriding the built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a file headlessly, looping over an optional region.
    Play {
        file: PathBuf,
        #[arg(long)]
        loop_start: Option<f64>,
        #[arg(long)]
        loop_end: Option<f64>,
        /// Wall-clock seconds to keep playing.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        #[arg(long, default_value_t = 60)]
        fps: u32,
        #[arg(long, default_value_t = 800.0)]
        width: f32,
    },
    /// Render the waveform envelope and its draw commands as JSON.
    Waveform {
        file: PathBuf,
        #[arg(long, default_value_t = 800.0)]
        width: f32,
        #[arg(long, default_value_t = 120.0)]
        height: f32,
        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print basic facts about an audio file.
    Inspect {
        file: PathBuf,
    },
}
