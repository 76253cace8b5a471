/// One frame's worth of byte frequency magnitudes, one per bin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpectralSnapshot {
    bins: Vec<u8>,
}

impl SpectralSnapshot {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    #[cfg(test)]
    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    /// Scale every bin by `sensitivity`, clamped to [0, 255]. Consumes the
    /// snapshot: the gained copy is the only thing renderers ever see.
    pub fn apply_gain(self, sensitivity: f32) -> GainedSnapshot {
        let s = if sensitivity.is_finite() { sensitivity.max(0.0) } else { 0.0 };
        let values = self
            .bins
            .into_iter()
            .map(|v| (v as f32 * s).clamp(0.0, 255.0))
            .collect();
        GainedSnapshot { values }
    }
}

/// Snapshot after sensitivity gain. Values stay in [0, 255] but keep their
/// fractional part, matching how the renderers scale them.
#[derive(Clone, Debug, PartialEq)]
pub struct GainedSnapshot {
    values: Vec<f32>,
}

impl GainedSnapshot {
    #[cfg(test)]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Value at `index`, or 0 past the end.
    pub fn get(&self, index: usize) -> f32 {
        self.values.get(index).copied().unwrap_or(0.0)
    }

    pub fn average(&self) -> f32 {
        average(&self.values)
    }

    /// Average of `values[start..end]`, clipped to the snapshot; 0 when empty.
    pub fn range_average(&self, start: usize, end: usize) -> f32 {
        let end = end.min(self.values.len());
        if start >= end {
            return 0.0;
        }
        average(&self.values[start..end])
    }
}

fn average(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
