use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use super::color::Color;
use super::draw::{DrawCommand, Surface};
use crate::error::{VisError, VisResult};

/// Raster surface backed by a tiny-skia pixmap. Draw commands arrive in
/// logical pixels and are scaled by the device pixel ratio onto the pixmap.
pub struct PixelCanvas {
    logical_width: f32,
    logical_height: f32,
    background: tiny_skia::Color,
    transform: Transform,
    pixmap: Pixmap,
}

impl PixelCanvas {
    pub fn new(
        logical_width: u32,
        logical_height: u32,
        scale: f32,
        background: [u8; 3],
    ) -> VisResult<Self> {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
        let width = ((logical_width as f32 * scale).round() as u32).max(1);
        let height = ((logical_height as f32 * scale).round() as u32).max(1);
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            VisError::Export(format!("cannot allocate a {}x{} canvas", width, height))
        })?;

        let [r, g, b] = background;
        let mut canvas = Self {
            logical_width: logical_width as f32,
            logical_height: logical_height as f32,
            background: tiny_skia::Color::from_rgba8(r, g, b, 255),
            transform: Transform::from_scale(scale, scale),
            pixmap,
        };
        canvas.clear();
        Ok(canvas)
    }

    /// Backing buffer size in physical pixels.
    pub fn physical_size(&self) -> (u32, u32) {
        (self.pixmap.width(), self.pixmap.height())
    }

    /// RGBA bytes of the current frame. Every frame starts from an opaque
    /// background, so the premultiplied pixmap data is plain RGBA.
    pub fn pixels(&self) -> &[u8] {
        self.pixmap.data()
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color) {
        if width <= 0.0 || height <= 0.0 {
            return;
        }
        let Some(rect) = Rect::from_xywh(x, y, width, height) else {
            return;
        };
        self.pixmap
            .fill_rect(rect, &paint(color, 1.0), self.transform, None);
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: Color) {
        if radius <= 0.0 {
            return;
        }
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        self.pixmap.fill_path(
            &path,
            &paint(color, 1.0),
            FillRule::Winding,
            self.transform,
            None,
        );
    }

    // A zero-radius arc strokes nothing.
    fn stroke_circle(&mut self, cx: f32, cy: f32, radius: f32, line_width: f32, color: Color) {
        if radius <= 0.0 || line_width <= 0.0 {
            return;
        }
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let stroke = Stroke {
            width: line_width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color, 1.0), &stroke, self.transform, None);
    }

    #[allow(clippy::too_many_arguments)]
    fn line(
        &mut self,
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        line_width: f32,
        color: Color,
        alpha: f32,
    ) {
        if line_width <= 0.0 || alpha <= 0.0 {
            return;
        }
        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        pb.line_to(x1, y1);
        let Some(path) = pb.finish() else {
            return;
        };
        let stroke = Stroke {
            width: line_width,
            ..Stroke::default()
        };
        self.pixmap
            .stroke_path(&path, &paint(color, alpha), &stroke, self.transform, None);
    }
}

fn paint(color: Color, alpha: f32) -> Paint<'static> {
    let [r, g, b] = color.to_rgb();
    let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    paint
}

impl Surface for PixelCanvas {
    fn size(&self) -> (f32, f32) {
        (self.logical_width, self.logical_height)
    }

    fn clear(&mut self) {
        self.pixmap.fill(self.background);
    }

    fn draw(&mut self, command: &DrawCommand) {
        match *command {
            DrawCommand::FillRect {
                x,
                y,
                width,
                height,
                color,
            } => self.fill_rect(x, y, width, height, color),
            DrawCommand::StrokeCircle {
                cx,
                cy,
                radius,
                line_width,
                color,
            } => self.stroke_circle(cx, cy, radius, line_width, color),
            DrawCommand::FillCircle {
                cx,
                cy,
                radius,
                color,
            } => self.fill_circle(cx, cy, radius, color),
            DrawCommand::Line {
                x0,
                y0,
                x1,
                y1,
                line_width,
                color,
                alpha,
            } => self.line(x0, y0, x1, y1, line_width, color, alpha),
        }
    }

    fn export_frame(&self) -> VisResult<Vec<u8>> {
        let (width, height) = self.physical_size();
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(self.pixels(), width, height, ExtendedColorType::Rgba8)
            .map_err(|e| VisError::Export(e.to_string()))?;
        Ok(out)
    }
}
