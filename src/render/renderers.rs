//! Visual styles. Each renderer turns one gained snapshot into draw commands
//! for a canvas of the given logical size; clearing is the loop's job.

use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use super::color::{color_for, ColorTheme};
use super::draw::DrawCommand;
use crate::audio::snapshot::GainedSnapshot;

pub const RING_COUNT: usize = 5;
pub const BASS_BINS: usize = 10;
pub const PARTICLE_COUNT: usize = 100;
const PARTICLE_LINE_ALPHA: f32 = 0.3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VisType {
    #[default]
    Bars,
    Circles,
    Particles,
}

impl VisType {
    pub fn renderer(self) -> &'static dyn Renderer {
        match self {
            VisType::Bars => &Bars,
            VisType::Circles => &Circles,
            VisType::Particles => &Particles,
        }
    }
}

impl FromStr for VisType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bars" => Ok(VisType::Bars),
            "circles" => Ok(VisType::Circles),
            "particles" => Ok(VisType::Particles),
            other => Err(format!("unknown visualization '{}'", other)),
        }
    }
}

impl fmt::Display for VisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisType::Bars => "bars",
            VisType::Circles => "circles",
            VisType::Particles => "particles",
        };
        f.write_str(name)
    }
}

pub trait Renderer {
    fn name(&self) -> &'static str;
    fn render(
        &self,
        data: &GainedSnapshot,
        width: f32,
        height: f32,
        theme: ColorTheme,
    ) -> Vec<DrawCommand>;
}

/// Bottom-anchored columns over the lowest quarter of the spectrum.
pub struct Bars;

impl Renderer for Bars {
    fn name(&self) -> &'static str {
        "bars"
    }

    fn render(
        &self,
        data: &GainedSnapshot,
        width: f32,
        height: f32,
        theme: ColorTheme,
    ) -> Vec<DrawCommand> {
        let columns = data.len() / 4;
        if columns == 0 {
            return Vec::new();
        }
        let bar_width = width / columns as f32;

        (0..columns)
            .map(|i| {
                let value = data.get(i);
                let bar_height = (value / 255.0 * height).max(0.0);
                DrawCommand::FillRect {
                    x: i as f32 * bar_width,
                    y: height - bar_height,
                    width: (bar_width - 1.0).max(0.0),
                    height: bar_height,
                    color: color_for(i, columns, value, theme),
                }
            })
            .collect()
    }
}

/// Concentric rings sized by spectrum slices around a bass-driven disc.
pub struct Circles;

impl Renderer for Circles {
    fn name(&self) -> &'static str {
        "circles"
    }

    fn render(
        &self,
        data: &GainedSnapshot,
        width: f32,
        height: f32,
        theme: ColorTheme,
    ) -> Vec<DrawCommand> {
        let (cx, cy) = (width / 2.0, height / 2.0);
        let min_dimension = width.min(height).max(0.0);

        let base_radius = data.average() / 255.0 * (min_dimension / 4.0);
        let slice = data.len() / RING_COUNT;

        let mut commands: Vec<DrawCommand> = (0..RING_COUNT)
            .map(|i| {
                let range_avg = data.range_average(slice * i, slice * (i + 1));
                let radius =
                    base_radius + range_avg / 255.0 * (min_dimension / 8.0) * (i + 1) as f32;
                DrawCommand::StrokeCircle {
                    cx,
                    cy,
                    radius: radius.max(0.0),
                    line_width: 3.0 + range_avg / 255.0 * 5.0,
                    color: color_for(i, RING_COUNT, range_avg, theme),
                }
            })
            .collect();

        let bass = data.range_average(0, BASS_BINS);
        commands.push(DrawCommand::FillCircle {
            cx,
            cy,
            radius: (bass / 255.0 * (min_dimension / 10.0)).max(0.0),
            color: color_for(0, 1, bass, theme),
        });
        commands
    }
}

/// A ring of particles whose distance from the center follows the spectrum,
/// joined into a faint contour.
pub struct Particles;

impl Particles {
    fn position(i: usize, value: f32, max_radius: f32, cx: f32, cy: f32) -> (f32, f32) {
        let angle = i as f32 / PARTICLE_COUNT as f32 * PI * 2.0;
        let radius = (value / 255.0 * max_radius).max(0.0);
        (cx + angle.cos() * radius, cy + angle.sin() * radius)
    }
}

impl Renderer for Particles {
    fn name(&self) -> &'static str {
        "particles"
    }

    fn render(
        &self,
        data: &GainedSnapshot,
        width: f32,
        height: f32,
        theme: ColorTheme,
    ) -> Vec<DrawCommand> {
        let (cx, cy) = (width / 2.0, height / 2.0);
        let max_radius = (data.average() / 255.0 * (width.min(height) / 2.0)).max(0.0);
        let step = data.len() as f32 / PARTICLE_COUNT as f32;
        let value_at = |i: usize| data.get((i as f32 * step).floor() as usize);

        let mut commands = Vec::with_capacity(PARTICLE_COUNT * 2);
        let mut previous: Option<(f32, f32)> = None;
        for i in 0..PARTICLE_COUNT {
            let value = value_at(i);
            let (x, y) = Self::position(i, value, max_radius, cx, cy);
            let color = color_for(i, PARTICLE_COUNT, value, theme);

            commands.push(DrawCommand::FillCircle {
                cx: x,
                cy: y,
                radius: 2.0 + value / 255.0 * 8.0,
                color,
            });

            if let Some((px, py)) = previous {
                commands.push(DrawCommand::Line {
                    x0: px,
                    y0: py,
                    x1: x,
                    y1: y,
                    line_width: 1.0,
                    color,
                    alpha: PARTICLE_LINE_ALPHA,
                });
            }
            previous = Some((x, y));
        }
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::snapshot::SpectralSnapshot;

    fn gained(bins: Vec<u8>) -> GainedSnapshot {
        SpectralSnapshot::new(bins).apply_gain(1.0)
    }

    #[test]
    fn bars_span_the_width() {
        let data = gained(vec![255; 1024]);
        let commands = Bars.render(&data, 512.0, 200.0, ColorTheme::Spectrum);
        assert_eq!(commands.len(), 256);
        match (&commands[0], &commands[255]) {
            (
                DrawCommand::FillRect { x: x0, y, width, height, .. },
                DrawCommand::FillRect { x: x1, .. },
            ) => {
                assert_eq!(*x0, 0.0);
                assert_eq!(*width, 1.0);
                assert_eq!(*height, 200.0);
                assert_eq!(*y, 0.0);
                assert_eq!(*x1, 510.0);
            }
            other => panic!("unexpected commands {:?}", other),
        }
    }

    #[test]
    fn bars_only_use_the_lowest_quarter() {
        let mut bins = vec![0u8; 16];
        bins[0] = 255;
        bins[8] = 255;
        let commands = Bars.render(&gained(bins), 40.0, 100.0, ColorTheme::Default);
        assert_eq!(commands.len(), 4);
        let heights: Vec<f32> = commands
            .iter()
            .map(|c| match c {
                DrawCommand::FillRect { height, .. } => *height,
                _ => panic!("bars only fill rects"),
            })
            .collect();
        assert_eq!(heights, vec![100.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn circles_grow_outward() {
        let data = gained(vec![200; 100]);
        let commands = Circles.render(&data, 400.0, 300.0, ColorTheme::Gradient);
        assert_eq!(commands.len(), RING_COUNT + 1);
        let radii: Vec<f32> = commands[..RING_COUNT]
            .iter()
            .map(|c| match c {
                DrawCommand::StrokeCircle { radius, cx, cy, .. } => {
                    assert_eq!((*cx, *cy), (200.0, 150.0));
                    *radius
                }
                _ => panic!("rings are stroked"),
            })
            .collect();
        assert!(radii.windows(2).all(|w| w[1] > w[0]));

        let base = 200.0 / 255.0 * 75.0;
        let first = base + 200.0 / 255.0 * 37.5;
        assert!((radii[0] - first).abs() < 1e-3);

        match &commands[RING_COUNT] {
            DrawCommand::FillCircle { radius, .. } => {
                assert!((radius - 200.0 / 255.0 * 30.0).abs() < 1e-3)
            }
            _ => panic!("center disc is filled"),
        }
    }

    #[test]
    fn particles_form_a_closed_chain() {
        let data = gained(vec![128; 1024]);
        let commands = Particles.render(&data, 300.0, 300.0, ColorTheme::Monochrome);
        let discs = commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::FillCircle { .. }))
            .count();
        let lines: Vec<_> = commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Line { alpha, .. } => Some(*alpha),
                _ => None,
            })
            .collect();
        assert_eq!(discs, PARTICLE_COUNT);
        assert_eq!(lines.len(), PARTICLE_COUNT - 1);
        assert!(lines.iter().all(|a| (*a - 0.3).abs() < 1e-6));

        match &commands[0] {
            DrawCommand::FillCircle { cx, cy, radius, color } => {
                let max_radius = 128.0 / 255.0 * 150.0;
                let expected = 150.0 + 128.0 / 255.0 * max_radius;
                assert!((cx - expected).abs() < 1e-3);
                assert!((cy - 150.0).abs() < 1e-3);
                assert!((radius - (2.0 + 128.0 / 255.0 * 8.0)).abs() < 1e-4);
                assert_eq!(*color, color_for(0, PARTICLE_COUNT, 128.0, ColorTheme::Monochrome));
            }
            _ => panic!("first command is a particle"),
        }
    }

    #[test]
    fn silence_degrades_to_minimum_sizes() {
        let data = gained(vec![0; 1024]);
        for command in Bars.render(&data, 800.0, 400.0, ColorTheme::Spectrum) {
            if let DrawCommand::FillRect { height, y, .. } = command {
                assert_eq!(height, 0.0);
                assert_eq!(y, 400.0);
            }
        }
        for command in Circles.render(&data, 800.0, 400.0, ColorTheme::Spectrum) {
            match command {
                DrawCommand::StrokeCircle { radius, line_width, .. } => {
                    assert_eq!(radius, 0.0);
                    assert_eq!(line_width, 3.0);
                }
                DrawCommand::FillCircle { radius, .. } => assert_eq!(radius, 0.0),
                _ => {}
            }
        }
        for command in Particles.render(&data, 800.0, 400.0, ColorTheme::Spectrum) {
            if let DrawCommand::FillCircle { cx, cy, radius, .. } = command {
                assert_eq!((cx, cy), (400.0, 200.0));
                assert_eq!(radius, 2.0);
            }
        }
    }

    #[test]
    fn tiny_snapshots_never_produce_nan() {
        for bins in [vec![], vec![50], vec![10, 20, 30]] {
            let data = gained(bins);
            for vis in [VisType::Bars, VisType::Circles, VisType::Particles] {
                for command in vis.renderer().render(&data, 100.0, 100.0, ColorTheme::Default) {
                    let text = format!("{:?}", command);
                    assert!(!text.contains("NaN"), "{} produced {}", vis, text);
                }
            }
        }
    }

    #[test]
    fn renderer_lookup_matches_name() {
        for vis in [VisType::Bars, VisType::Circles, VisType::Particles] {
            assert_eq!(vis.renderer().name(), vis.to_string());
        }
        assert_eq!("Circles".parse::<VisType>(), Ok(VisType::Circles));
        assert!("waves".parse::<VisType>().is_err());
    }
}
