use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorTheme {
    #[default]
    Spectrum,
    Gradient,
    Monochrome,
    Default,
}

impl FromStr for ColorTheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "spectrum" => Ok(ColorTheme::Spectrum),
            "gradient" => Ok(ColorTheme::Gradient),
            "monochrome" => Ok(ColorTheme::Monochrome),
            "default" => Ok(ColorTheme::Default),
            other => Err(format!("unknown color theme '{}'", other)),
        }
    }
}

impl fmt::Display for ColorTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorTheme::Spectrum => "spectrum",
            ColorTheme::Gradient => "gradient",
            ColorTheme::Monochrome => "monochrome",
            ColorTheme::Default => "default",
        };
        f.write_str(name)
    }
}

/// A theme color. Spectrum colors stay in HSL so the hue/lightness can be
/// checked directly; everything else is plain RGB.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Color {
    Hsl {
        hue: f32,
        saturation: f32,
        lightness: f32,
    },
    Rgb(u8, u8, u8),
}

impl Color {
    pub fn to_rgb(self) -> [u8; 3] {
        match self {
            Color::Rgb(r, g, b) => [r, g, b],
            Color::Hsl {
                hue,
                saturation,
                lightness,
            } => hsl_to_rgb(hue, saturation / 100.0, lightness / 100.0),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Hsl {
                hue,
                saturation,
                lightness,
            } => write!(f, "hsl({}, {}%, {}%)", hue, saturation, lightness),
            Color::Rgb(r, g, b) => write!(f, "rgb({}, {}, {})", r, g, b),
        }
    }
}

/// Color for element `index` of `total` at `magnitude` (0..=255).
pub fn color_for(index: usize, total: usize, magnitude: f32, theme: ColorTheme) -> Color {
    let m = magnitude.clamp(0.0, 255.0) / 255.0;
    let norm = if total == 0 { 0.0 } else { index as f32 / total as f32 };

    match theme {
        ColorTheme::Spectrum => Color::Hsl {
            hue: norm * 360.0,
            saturation: 100.0,
            lightness: 50.0 + m * 40.0,
        },
        ColorTheme::Gradient => {
            if norm < 0.33 {
                Color::Rgb(0, channel(100.0 + m * 155.0), channel(200.0 + m * 55.0))
            } else if norm < 0.66 {
                Color::Rgb(
                    channel((norm - 0.33) * 3.0 * 255.0),
                    channel(100.0 + m * 50.0),
                    channel(200.0 + m * 55.0),
                )
            } else {
                Color::Rgb(
                    channel(200.0 + m * 55.0),
                    channel((1.0 - norm) * 3.0 * 100.0),
                    channel(150.0 + m * 105.0),
                )
            }
        }
        ColorTheme::Monochrome => {
            let brightness = 40.0 + m * 60.0;
            Color::Rgb(
                channel(brightness),
                channel(brightness + 100.0),
                channel(brightness + 100.0),
            )
        }
        ColorTheme::Default => {
            let level = channel(m * 255.0);
            Color::Rgb(level, level, 255)
        }
    }
}

// Floor into a byte channel.
fn channel(v: f32) -> u8 {
    v.floor().clamp(0.0, 255.0) as u8
}

fn hsl_to_rgb(hue: f32, s: f32, l: f32) -> [u8; 3] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    [to_byte(r1), to_byte(g1), to_byte(b1)]
}
