pub mod canvas;
pub mod color;
pub mod draw;
pub mod frame_loop;
pub mod renderers;
