use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::render::color::ColorTheme;
use crate::render::renderers::VisType;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub visual: VisualConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Device pixel ratio of the backing surface.
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub background: [u8; 3],
}

#[derive(Debug, Deserialize)]
pub struct VisualConfig {
    #[serde(default)]
    pub style: VisType,
    #[serde(default)]
    pub theme: ColorTheme,
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f32,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptureConfig {
    pub dir: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            scale: default_scale(),
            background: [0, 0, 0],
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            style: VisType::default(),
            theme: ColorTheme::default(),
            sensitivity: default_sensitivity(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
            volume: default_volume(),
        }
    }
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 400 }
fn default_fps() -> u32 { 60 }
fn default_scale() -> f32 { 1.0 }
fn default_sensitivity() -> f32 { 1.5 }
fn default_fft_size() -> usize { 2048 }
fn default_smoothing() -> f32 { 0.8 }
fn default_min_decibels() -> f32 { -100.0 }
fn default_max_decibels() -> f32 { -30.0 }
fn default_volume() -> f32 { 1.0 }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::debug!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

/// First existing config file: `sonica-live.toml` in the working directory,
/// then `~/.config/sonica-live/config.toml`, then the platform config dir.
pub fn find_config() -> Option<PathBuf> {
    let local = PathBuf::from("sonica-live.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("sonica-live").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("sonica-live").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}
