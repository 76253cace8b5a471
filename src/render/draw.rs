use super::color::Color;

/// Drawing primitives in logical (device-independent) pixels, origin at the
/// top-left corner.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Color,
    },
    StrokeCircle {
        cx: f32,
        cy: f32,
        radius: f32,
        line_width: f32,
        color: Color,
    },
    FillCircle {
        cx: f32,
        cy: f32,
        radius: f32,
        color: Color,
    },
    Line {
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        line_width: f32,
        color: Color,
        alpha: f32,
    },
}

/// The drawing surface the render loop owns.
pub trait Surface {
    /// Logical size in device-independent pixels.
    fn size(&self) -> (f32, f32);
    fn clear(&mut self);
    fn draw(&mut self, command: &DrawCommand);
    /// Encode the current frame as PNG bytes.
    fn export_frame(&self) -> crate::error::VisResult<Vec<u8>>;

    fn draw_all(&mut self, commands: &[DrawCommand]) {
        for command in commands {
            self.draw(command);
        }
    }
}
