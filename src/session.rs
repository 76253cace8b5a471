//! The visualizer context: owns the visual parameters, the Source Manager,
//! the Render Loop Controller and the capture gallery, and applies
//! user-control events to them one at a time.

use std::path::Path;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use crate::audio::decode::AudioInput;
use crate::audio::source::{AudioBackend, SourceManager};
use crate::capture::{CaptureGallery, CaptureRecord};
use crate::control::Control;
use crate::error::{VisError, VisResult};
use crate::render::color::ColorTheme;
use crate::render::draw::Surface;
use crate::render::frame_loop::{
    FrameId, FrameScheduler, RenderLoop, TickScheduler, VisualizationConfig,
};
use crate::render::renderers::VisType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session<B: AudioBackend, S: Surface, F: FrameScheduler> {
    config: VisualizationConfig,
    sources: SourceManager<B>,
    render_loop: RenderLoop<S, F>,
    gallery: CaptureGallery,
    /// Start playback once the pending load lands.
    autoplay: bool,
    spinner: Option<ProgressBar>,
}

impl<B: AudioBackend, S: Surface, F: FrameScheduler> Session<B, S, F> {
    pub fn new(
        config: VisualizationConfig,
        sources: SourceManager<B>,
        render_loop: RenderLoop<S, F>,
        gallery: CaptureGallery,
    ) -> Self {
        Self {
            config,
            sources,
            render_loop,
            gallery,
            autoplay: false,
            spinner: None,
        }
    }

    pub fn render_loop(&self) -> &RenderLoop<S, F> {
        &self.render_loop
    }

    pub fn is_loading(&self) -> bool {
        self.sources.is_loading()
    }

    /// Apply one control event. Errors are the user-visible failures; the
    /// session is left in a consistent state either way.
    pub async fn apply(&mut self, control: Control) -> VisResult<Flow> {
        match control {
            Control::Load(path) => self.load_path(&path, false),
            Control::Play => self.sources_then_sync(|s| s.play())?,
            Control::Pause => self.sources_then_sync(|s| s.pause())?,
            Control::TogglePlay => self.sources_then_sync(|s| s.toggle_play())?,
            Control::ToggleMic => self.toggle_microphone().await?,
            Control::Style(vis_type) => self.set_vis_type(vis_type),
            Control::Theme(theme) => self.set_theme(theme),
            Control::Sensitivity(s) => self.set_sensitivity(s),
            Control::Volume(v) => self.sources.set_volume(v),
            Control::Resolution(size) => self.set_transform_size(size)?,
            Control::Capture => {
                let record = self.capture()?;
                log::debug!("Capture is {} bytes", record.png().len());
            }
            Control::Status => log::info!("{}", self.status_line()),
            Control::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    pub fn load_path(&mut self, path: &Path, autoplay: bool) {
        self.load(AudioInput::Path(path.to_path_buf()), autoplay);
    }

    /// Queue a file for decoding. Frames keep rendering from the current
    /// source until [`Self::poll_load`] picks up the result.
    pub fn load(&mut self, input: AudioInput, autoplay: bool) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("Loading {}", input));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);

        self.autoplay = autoplay;
        self.sources.begin_load(input);
    }

    /// Apply a finished load, if one has resolved since the last call.
    pub fn poll_load(&mut self) -> Option<VisResult<()>> {
        let result = self.sources.poll_load()?;
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        let autoplay = std::mem::take(&mut self.autoplay);
        let result = result.and_then(|()| {
            if autoplay {
                self.sources.play()
            } else {
                Ok(())
            }
        });
        self.sync_loop();
        Some(result)
    }

    pub async fn toggle_microphone(&mut self) -> VisResult<()> {
        let result = self.sources.toggle_microphone().await;
        self.sync_loop();
        result
    }

    pub fn set_vis_type(&mut self, vis_type: VisType) {
        if self.config.vis_type == vis_type {
            return;
        }
        self.config.vis_type = vis_type;
        log::info!("Visualization: {}", vis_type.renderer().name());
        if self.render_loop.is_running() {
            self.render_loop.start();
        }
    }

    pub fn set_theme(&mut self, theme: ColorTheme) {
        self.config.theme = theme;
        log::info!("Color theme: {}", theme);
    }

    /// Takes effect from the next snapshot pull.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        if !sensitivity.is_finite() || sensitivity <= 0.0 {
            log::warn!("Ignoring sensitivity {}; it must be positive", sensitivity);
            return;
        }
        self.config.sensitivity = sensitivity;
        log::debug!("Sensitivity: {:.2}", sensitivity);
    }

    /// Takes effect from the next snapshot pull; the bin count follows.
    pub fn set_transform_size(&mut self, transform_size: usize) -> VisResult<()> {
        self.sources.set_transform_size(transform_size)?;
        log::info!(
            "Analysis: fft_size={}, {} bins",
            transform_size,
            self.sources.sampler_mut().bin_count()
        );
        Ok(())
    }

    pub fn capture(&mut self) -> VisResult<&CaptureRecord> {
        self.gallery.capture(self.render_loop.surface())
    }

    /// Advance one host-frame: housekeeping on the source, then run the frame
    /// callback `due` if one fired. Returns true if a frame was drawn.
    pub fn run_frame(&mut self, due: Option<FrameId>) -> bool {
        if self.sources.tick() {
            self.render_loop.stop();
        }
        let Some(id) = due else {
            return false;
        };
        self.render_loop
            .on_frame(id, &self.config, self.sources.sampler_mut())
    }

    pub fn status_line(&self) -> String {
        format!(
            "source={}{} inputs={} loop={:?} style={} theme={} sensitivity={:.2} \
             volume={:.2} fft={} frames={} captures={}",
            self.sources.state(),
            if self.sources.is_loading() { " (loading)" } else { "" },
            self.sources.connected_sources(),
            self.render_loop.state(),
            self.config.vis_type,
            self.config.theme,
            self.config.sensitivity,
            self.sources.volume(),
            self.sources.transform_size(),
            self.render_loop.frames_rendered(),
            self.gallery.records().len()
        )
    }

    fn sources_then_sync(
        &mut self,
        op: impl FnOnce(&mut SourceManager<B>) -> VisResult<()>,
    ) -> VisResult<()> {
        let result = op(&mut self.sources);
        self.sync_loop();
        match result {
            Err(VisError::NoActiveSource) => {
                log::debug!("Ignored: nothing loaded");
                Ok(())
            }
            other => other,
        }
    }

    // The loop follows the source: running while something is live, stopped
    // otherwise. A new live source always gets a fresh callback.
    fn sync_loop(&mut self) {
        if self.sources.is_live() {
            self.render_loop.start();
        } else {
            self.render_loop.stop();
        }
    }
}

impl<B: AudioBackend, S: Surface> Session<B, S, TickScheduler> {
    /// Pop the callback that is due at `now`, if any.
    pub fn take_due(&mut self, now: Instant) -> Option<FrameId> {
        self.render_loop.scheduler_mut().take_due(now)
    }

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.render_loop.scheduler_mut().next_deadline()
    }
}
