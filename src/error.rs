use thiserror::Error;

/// Failures the visualizer reports to the user. None of them is fatal: callers
/// degrade to an idle or no-op state.
#[derive(Debug, Error)]
pub enum VisError {
    #[error("Error decoding audio file: {0}")]
    Decode(String),

    #[error("Error accessing microphone: {0}")]
    Permission(String),

    /// Output or capture hardware could not be opened.
    #[cfg_attr(not(feature = "live-audio"), allow(dead_code))]
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("No active audio source")]
    NoActiveSource,

    #[error("Transform size {0} must be a power of two between 32 and 32768")]
    InvalidTransformSize(usize),

    #[error("Failed to export frame: {0}")]
    Export(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type VisResult<T> = std::result::Result<T, VisError>;
