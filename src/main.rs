mod audio;
mod capture;
mod cli;
mod config;
mod control;
mod encode;
mod error;
mod render;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use audio::analyser::AnalyserSettings;
use audio::headless::HeadlessBackend;
use audio::sampler::SpectralSampler;
use audio::source::{AudioBackend, SourceManager};
use capture::CaptureGallery;
use cli::Cli;
use control::Control;
use encode::ffmpeg::FfmpegEncoder;
use render::canvas::PixelCanvas;
use render::color::ColorTheme;
use render::frame_loop::{RenderLoop, TickScheduler, VisualizationConfig};
use render::renderers::VisType;
use session::{Flow, Session};

/// Longest the main loop sleeps while waiting for a frame or a command.
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Settings that only come from the config file.
struct FileSettings {
    background: [u8; 3],
    min_decibels: f32,
    max_decibels: f32,
    captures_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let settings = apply_config(&mut cli);

    if let Some(ref input) = cli.input {
        if !input.exists() {
            anyhow::bail!("Input file not found: {}", input.display());
        }
    }
    if cli.input.is_none() && !cli.mic && !cli.interactive {
        anyhow::bail!("Nothing to visualize: pass an audio file, --mic or --interactive");
    }

    log::info!("sonica-live - real-time audio visualizer");
    log::info!(
        "Canvas: {}x{} @ {}fps (scale {})",
        cli.width, cli.height, cli.fps, cli.scale
    );
    log::info!("Style: {}, theme: {}", cli.style, cli.theme);

    run_with_backend(&cli, settings)
}

#[cfg(feature = "live-audio")]
fn run_with_backend(cli: &Cli, settings: FileSettings) -> Result<()> {
    if cli.headless {
        log::info!("Audio backend: headless");
        return run(cli, settings, HeadlessBackend);
    }
    log::info!("Audio backend: cpal");
    run(cli, settings, audio::live::LiveBackend::new())
}

#[cfg(not(feature = "live-audio"))]
fn run_with_backend(cli: &Cli, settings: FileSettings) -> Result<()> {
    if !cli.headless {
        log::debug!("Built without `live-audio`; files play silently");
    }
    run(cli, settings, HeadlessBackend)
}

// Config values apply only when the CLI value is still at its default.
fn apply_config(cli: &mut Cli) -> FileSettings {
    let mut settings = FileSettings {
        background: [0, 0, 0],
        min_decibels: AnalyserSettings::default().min_decibels,
        max_decibels: AnalyserSettings::default().max_decibels,
        captures_dir: cli.captures_dir.clone(),
    };

    let Some(path) = cli.config.clone().or_else(config::find_config) else {
        return settings;
    };
    let Some(cfg) = config::load_config(&path) else {
        log::warn!("Failed to load config from {}", path.display());
        return settings;
    };
    log::info!("Loaded config from {}", path.display());

    if cli.width == 800 { cli.width = cfg.output.width; }
    if cli.height == 400 { cli.height = cfg.output.height; }
    if cli.fps == 60 { cli.fps = cfg.output.fps; }
    if cli.scale == 1.0 { cli.scale = cfg.output.scale; }
    if cli.style == VisType::default() { cli.style = cfg.visual.style; }
    if cli.theme == ColorTheme::default() { cli.theme = cfg.visual.theme; }
    if cli.sensitivity == 1.5 { cli.sensitivity = cfg.visual.sensitivity; }
    if cli.fft_size == 2048 { cli.fft_size = cfg.audio.fft_size; }
    if cli.smoothing == 0.8 { cli.smoothing = cfg.audio.smoothing; }
    if cli.volume == 1.0 { cli.volume = cfg.audio.volume; }

    settings.background = cfg.output.background;
    settings.min_decibels = cfg.audio.min_decibels;
    settings.max_decibels = cfg.audio.max_decibels;
    if settings.captures_dir.is_none() {
        settings.captures_dir = cfg.capture.dir;
    }
    settings
}

fn run<B: AudioBackend>(cli: &Cli, settings: FileSettings, backend: B) -> Result<()> {
    let analyser = AnalyserSettings {
        smoothing: cli.smoothing.clamp(0.0, 1.0),
        min_decibels: settings.min_decibels,
        max_decibels: settings.max_decibels,
    };
    let sampler = SpectralSampler::new(cli.fft_size, analyser)?;
    log::info!("Analysis: fft_size={}, {} bins", cli.fft_size, sampler.bin_count());

    let canvas = PixelCanvas::new(cli.width, cli.height, cli.scale, settings.background)?;
    let (physical_width, physical_height) = canvas.physical_size();

    let mut recorder = match cli.record {
        Some(ref path) => Some(FfmpegEncoder::new(
            path,
            cli.input.as_deref(),
            physical_width,
            physical_height,
            cli.fps,
            &cli.codec,
            &cli.pix_fmt,
            cli.crf,
            cli.bitrate.as_deref(),
        )?),
        None => None,
    };

    let mut session = Session::new(
        VisualizationConfig {
            vis_type: cli.style,
            theme: cli.theme,
            sensitivity: cli.sensitivity,
        },
        SourceManager::new(backend, sampler, cli.volume),
        RenderLoop::new(canvas, TickScheduler::new(cli.fps)),
        CaptureGallery::new(settings.captures_dir),
    );

    if let Some(ref input) = cli.input {
        session.load_path(input, true);
    } else if cli.mic {
        if let Err(e) = pollster::block_on(session.toggle_microphone()) {
            if !cli.interactive {
                return Err(e.into());
            }
            log::error!("{}", e);
        }
    }

    let commands = if cli.interactive {
        log::info!("{}", control::HELP);
        Some(spawn_stdin_reader())
    } else {
        None
    };

    let started = Instant::now();
    let stop_at = cli.duration.map(|d| started + Duration::from_secs_f32(d.max(0.0)));
    let mut capture_at = cli.capture_at.map(|t| started + Duration::from_secs_f32(t.max(0.0)));
    let mut stdin_open = commands.is_some();

    'main: loop {
        if let Some(ref rx) = commands {
            loop {
                match rx.try_recv() {
                    Ok(control) => match pollster::block_on(session.apply(control)) {
                        Ok(Flow::Quit) => break 'main,
                        Ok(Flow::Continue) => {}
                        Err(e) => log::error!("{}", e),
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        stdin_open = false;
                        break;
                    }
                }
            }
        }

        if let Some(Err(e)) = session.poll_load() {
            if commands.is_none() {
                return Err(e).context("Failed to load audio");
            }
            log::error!("{}", e);
        }

        let now = Instant::now();
        let due = session.take_due(now);
        if session.run_frame(due) {
            if let Some(ref mut encoder) = recorder {
                encoder.write_frame(session.render_loop().surface().pixels())?;
            }
        }

        if capture_at.is_some_and(|at| now >= at) {
            capture_at = None;
            if let Err(e) = session.capture() {
                log::error!("{}", e);
            }
        }

        if stop_at.is_some_and(|at| now >= at) {
            log::info!("Duration reached");
            break;
        }
        if !stdin_open && !session.is_loading() && !session.render_loop().is_running() {
            break;
        }

        let wake = session.next_deadline().unwrap_or(now + IDLE_POLL);
        std::thread::sleep(wake.saturating_duration_since(Instant::now()).min(IDLE_POLL));
    }

    log::info!("{}", session.status_line());

    if let Some(encoder) = recorder {
        encoder.finish()?;
        if let Some(ref path) = cli.record {
            log::info!("Recording written to {}", path.display());
        }
    }
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<Control> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Control>() {
                Ok(control) => {
                    if tx.send(control).is_err() {
                        break;
                    }
                }
                Err(e) => log::warn!("{}", e),
            }
        }
    });
    rx
}
