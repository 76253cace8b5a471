use super::analyser::{AnalyserSettings, AnalysisNode, AnalysisTap};
use super::snapshot::SpectralSnapshot;
use crate::error::VisResult;

/// Wraps the analysis node and hands out one owned snapshot per frame.
pub struct SpectralSampler {
    node: AnalysisNode,
    buffer: Vec<u8>,
}

impl SpectralSampler {
    pub fn new(transform_size: usize, settings: AnalyserSettings) -> VisResult<Self> {
        let node = AnalysisNode::new(transform_size, settings)?;
        let buffer = vec![0; node.frequency_bin_count()];
        Ok(Self { node, buffer })
    }

    /// Configure the frequency resolution. The sample buffer is reallocated
    /// only when the resolution actually changes.
    pub fn initialize(&mut self, transform_size: usize) -> VisResult<()> {
        if transform_size == self.node.fft_size() {
            return Ok(());
        }
        self.node.set_fft_size(transform_size)?;
        self.buffer = vec![0; self.node.frequency_bin_count()];
        log::debug!(
            "Sampler initialized: fft_size={}, bins={}",
            transform_size,
            self.buffer.len()
        );
        Ok(())
    }

    pub fn transform_size(&self) -> usize {
        self.node.fft_size()
    }

    pub fn bin_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn tap(&self) -> &AnalysisTap {
        self.node.tap()
    }

    /// Latest magnitudes for the connected source. With nothing connected
    /// (or the tap momentarily busy) the last-known values are returned.
    pub fn current_snapshot(&mut self) -> SpectralSnapshot {
        self.node.byte_frequency_data(&mut self.buffer);
        SpectralSnapshot::new(self.buffer.clone())
    }
}
