use clap::Parser;
use std::path::PathBuf;

use crate::render::color::ColorTheme;
use crate::render::renderers::VisType;

#[derive(Parser, Debug)]
#[command(name = "sonica-live", about = "Real-time audio spectrum visualizer")]
pub struct Cli {
    /// Audio file to visualize (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Visualize the microphone instead of a file
    #[arg(long, conflicts_with = "input")]
    pub mic: bool,

    /// Visualization style
    #[arg(short, long, value_enum, default_value_t = VisType::Bars)]
    pub style: VisType,

    /// Color theme
    #[arg(short, long, value_enum, default_value_t = ColorTheme::Spectrum)]
    pub theme: ColorTheme,

    /// Gain applied to every spectral bin before drawing
    #[arg(long, default_value_t = 1.5)]
    pub sensitivity: f32,

    /// Canvas width in logical pixels
    #[arg(long, default_value_t = 800)]
    pub width: u32,

    /// Canvas height in logical pixels
    #[arg(long, default_value_t = 400)]
    pub height: u32,

    /// Device pixel ratio of the backing surface
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// FFT size (power of two, 32-32768)
    #[arg(long, default_value_t = 2048)]
    pub fft_size: usize,

    /// Temporal smoothing of the spectrum (0.0-1.0)
    #[arg(long, default_value_t = 0.8)]
    pub smoothing: f32,

    /// Playback volume (0.0-1.0)
    #[arg(long, default_value_t = 1.0)]
    pub volume: f32,

    /// Stop after this many seconds
    #[arg(short, long)]
    pub duration: Option<f32>,

    /// Read control commands from stdin
    #[arg(short, long)]
    pub interactive: bool,

    /// Directory to save captures in
    #[arg(long)]
    pub captures_dir: Option<PathBuf>,

    /// Capture a frame after this many seconds
    #[arg(long)]
    pub capture_at: Option<f32>,

    /// Record rendered frames to a video file through ffmpeg
    #[arg(short, long)]
    pub record: Option<PathBuf>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// Play files against the clock without audio devices
    #[arg(long)]
    pub headless: bool,

    /// Config file (default: auto-detect sonica-live.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
