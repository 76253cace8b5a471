use std::collections::VecDeque;
use std::sync::{Arc, Mutex, TryLockError};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::{VisError, VisResult};

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32768;

/// Byte-magnitude mapping parameters of the analysis node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyserSettings {
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

#[derive(Debug)]
struct TapState {
    samples: VecDeque<f32>,
    capacity: usize,
    inputs: usize,
}

/// Input side of the analysis node. Sources push mono samples here from
/// whatever thread produces them; the sampler reads the most recent window.
#[derive(Clone, Debug)]
pub struct AnalysisTap {
    inner: Arc<Mutex<TapState>>,
}

impl AnalysisTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TapState {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                inputs: 0,
            })),
        }
    }

    pub fn push(&self, samples: &[f32]) {
        let Ok(mut state) = self.inner.lock() else {
            return;
        };
        for &s in samples {
            if state.samples.len() >= state.capacity {
                state.samples.pop_front();
            }
            state.samples.push_back(s);
        }
    }

    /// Register a connected input edge.
    pub fn attach(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.inputs += 1;
        }
    }

    /// Drop an input edge. Buffered audio is discarded so a removed source
    /// cannot leave ghost data behind.
    pub fn detach(&self) {
        if let Ok(mut state) = self.inner.lock() {
            state.inputs = state.inputs.saturating_sub(1);
            state.samples.clear();
        }
    }

    /// Number of sources currently connected.
    pub fn inputs(&self) -> usize {
        self.inner.lock().map(|s| s.inputs).unwrap_or(0)
    }

    fn resize(&self, capacity: usize) {
        if let Ok(mut state) = self.inner.lock() {
            state.capacity = capacity;
            while state.samples.len() > capacity {
                state.samples.pop_front();
            }
        }
    }

    /// Copy the newest `out.len()` samples into `out`, left-padding with
    /// zeros. Returns `None` if the tap is busy or has no inputs.
    fn read_latest(&self, out: &mut [f32]) -> Option<()> {
        let state = match self.inner.try_lock() {
            Ok(state) => state,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(_)) => return None,
        };
        if state.inputs == 0 {
            return None;
        }
        let have = state.samples.len().min(out.len());
        let pad = out.len() - have;
        out[..pad].iter_mut().for_each(|v| *v = 0.0);
        let skip = state.samples.len() - have;
        for (dst, src) in out[pad..].iter_mut().zip(state.samples.iter().skip(skip)) {
            *dst = *src;
        }
        Some(())
    }
}

/// FFT analysis node producing byte frequency data, one value per bin.
pub struct AnalysisNode {
    fft_size: usize,
    settings: AnalyserSettings,
    tap: AnalysisTap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    time_domain: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl AnalysisNode {
    pub fn new(fft_size: usize, settings: AnalyserSettings) -> VisResult<Self> {
        validate_fft_size(fft_size)?;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        Ok(Self {
            fft_size,
            settings,
            tap: AnalysisTap::new(fft_size),
            fft,
            window: blackman_window(fft_size),
            time_domain: vec![0.0; fft_size],
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn tap(&self) -> &AnalysisTap {
        &self.tap
    }

    /// Change the transform size, keeping the same tap so connected sources
    /// stay attached.
    pub fn set_fft_size(&mut self, fft_size: usize) -> VisResult<()> {
        validate_fft_size(fft_size)?;
        if fft_size == self.fft_size {
            return Ok(());
        }
        let mut planner = FftPlanner::<f32>::new();
        self.fft = planner.plan_fft_forward(fft_size);
        self.fft_size = fft_size;
        self.window = blackman_window(fft_size);
        self.time_domain = vec![0.0; fft_size];
        self.scratch = vec![Complex::new(0.0, 0.0); fft_size];
        self.smoothed = vec![0.0; fft_size / 2];
        self.tap.resize(fft_size);
        Ok(())
    }

    /// Fill `out` with the current byte magnitudes. Returns false and leaves
    /// `out` untouched when no source is connected or the tap is busy.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> bool {
        if self.tap.read_latest(&mut self.time_domain).is_none() {
            return false;
        }

        for (i, c) in self.scratch.iter_mut().enumerate() {
            *c = Complex::new(self.time_domain[i] * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.settings.smoothing.clamp(0.0, 1.0);
        let scale = 1.0 / self.fft_size as f32;
        let db_range = (self.settings.max_decibels - self.settings.min_decibels).max(f32::EPSILON);

        for (k, slot) in out.iter_mut().take(self.smoothed.len()).enumerate() {
            let magnitude = self.scratch[k].norm() * scale;
            let value = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = if value.is_finite() { value } else { 0.0 };

            let db = 20.0 * self.smoothed[k].max(1e-20).log10();
            let scaled = 255.0 * (db - self.settings.min_decibels) / db_range;
            *slot = scaled.clamp(0.0, 255.0) as u8;
        }
        true
    }
}

fn validate_fft_size(size: usize) -> VisResult<()> {
    if !size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size) {
        return Err(VisError::InvalidTransformSize(size));
    }
    Ok(())
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = i as f32 / n;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}
