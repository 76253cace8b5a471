//! Render Loop Controller: one frame callback pending at a time, each one
//! pulling a snapshot, applying gain and dispatching to the active renderer.

use std::time::{Duration, Instant};

use super::color::ColorTheme;
use super::draw::Surface;
use super::renderers::VisType;
use crate::audio::sampler::SpectralSampler;

/// User-adjustable visual parameters, read once per frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisualizationConfig {
    pub vis_type: VisType,
    pub theme: ColorTheme,
    pub sensitivity: f32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            vis_type: VisType::Bars,
            theme: ColorTheme::Spectrum,
            sensitivity: 1.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

/// Host frame scheduling: request one callback, or cancel a pending one.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameId;
    fn cancel_frame(&mut self, id: FrameId);
}

/// Fixed-rate scheduler driven by the main loop polling `take_due`.
pub struct TickScheduler {
    interval: Duration,
    next_id: u64,
    cadence: Option<Instant>,
    pending: Vec<(FrameId, Instant)>,
}

impl TickScheduler {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next_id: 0,
            cadence: None,
            pending: Vec::new(),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at)| *at).min()
    }

    /// Pop the earliest callback whose deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<FrameId> {
        let (idx, _) = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, (_, at))| *at <= now)
            .min_by_key(|(_, (_, at))| *at)?;
        Some(self.pending.remove(idx).0)
    }
}

impl FrameScheduler for TickScheduler {
    fn request_frame(&mut self) -> FrameId {
        let now = Instant::now();
        // Keep a steady cadence; if we fell behind, drop frames instead of bursting.
        let deadline = match self.cadence {
            Some(prev) if prev + self.interval >= now => prev + self.interval,
            Some(_) => now,
            None => now,
        };
        self.cadence = Some(deadline);

        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, deadline));
        id
    }

    fn cancel_frame(&mut self, id: FrameId) {
        self.pending.retain(|(pending, _)| *pending != id);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

pub struct RenderLoop<S: Surface, F: FrameScheduler> {
    surface: S,
    scheduler: F,
    state: LoopState,
    pending: Option<FrameId>,
    frames_rendered: u64,
}

impl<S: Surface, F: FrameScheduler> RenderLoop<S, F> {
    pub fn new(surface: S, scheduler: F) -> Self {
        Self {
            surface,
            scheduler,
            state: LoopState::Stopped,
            pending: None,
            frames_rendered: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn scheduler_mut(&mut self) -> &mut F {
        &mut self.scheduler
    }

    /// Begin (or restart) the loop. Any pending callback is cancelled first,
    /// so repeated calls leave exactly one scheduled.
    pub fn start(&mut self) {
        self.cancel_pending();
        self.pending = Some(self.scheduler.request_frame());
        if self.state == LoopState::Stopped {
            log::debug!("Render loop started");
            self.state = LoopState::Running;
        }
    }

    pub fn stop(&mut self) {
        if self.state == LoopState::Stopped {
            return;
        }
        self.cancel_pending();
        self.state = LoopState::Stopped;
        log::debug!("Render loop stopped after {} frames", self.frames_rendered);
    }

    /// Run the callback `id`. Stale or cancelled ids are ignored. Returns
    /// true when a frame was drawn.
    pub fn on_frame(
        &mut self,
        id: FrameId,
        config: &VisualizationConfig,
        sampler: &mut SpectralSampler,
    ) -> bool {
        if self.state != LoopState::Running || self.pending != Some(id) {
            log::trace!("Ignoring stale frame callback {:?}", id);
            return false;
        }
        self.pending = None;

        self.surface.clear();
        let gained = sampler.current_snapshot().apply_gain(config.sensitivity);
        let (width, height) = self.surface.size();
        let commands = config
            .vis_type
            .renderer()
            .render(&gained, width, height, config.theme);
        self.surface.draw_all(&commands);

        self.frames_rendered += 1;
        self.pending = Some(self.scheduler.request_frame());
        true
    }

    fn cancel_pending(&mut self) {
        if let Some(id) = self.pending.take() {
            self.scheduler.cancel_frame(id);
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::error::VisResult;
    use crate::render::draw::DrawCommand;

    /// Scheduler that only records requests.
    #[derive(Default)]
    pub struct ManualScheduler {
        next_id: u64,
        pub pending: Vec<FrameId>,
        pub cancelled: Vec<FrameId>,
    }

    impl FrameScheduler for ManualScheduler {
        fn request_frame(&mut self) -> FrameId {
            let id = FrameId(self.next_id);
            self.next_id += 1;
            self.pending.push(id);
            id
        }

        fn cancel_frame(&mut self, id: FrameId) {
            self.pending.retain(|p| *p != id);
            self.cancelled.push(id);
        }
    }

    impl ManualScheduler {
        /// Hand the oldest pending callback to the host, as a refresh would.
        pub fn fire(&mut self) -> Option<FrameId> {
            if self.pending.is_empty() {
                None
            } else {
                Some(self.pending.remove(0))
            }
        }
    }

    /// Surface that records what was drawn per frame.
    pub struct RecordingSurface {
        pub width: f32,
        pub height: f32,
        pub clears: usize,
        pub frame: Vec<DrawCommand>,
    }

    impl RecordingSurface {
        pub fn new(width: f32, height: f32) -> Self {
            Self {
                width,
                height,
                clears: 0,
                frame: Vec::new(),
            }
        }
    }

    impl Surface for RecordingSurface {
        fn size(&self) -> (f32, f32) {
            (self.width, self.height)
        }
        fn clear(&mut self) {
            self.clears += 1;
            self.frame.clear();
        }
        fn draw(&mut self, command: &DrawCommand) {
            self.frame.push(command.clone());
        }
        fn export_frame(&self) -> VisResult<Vec<u8>> {
            Ok(format!("{} commands", self.frame.len()).into_bytes())
        }
    }
}
