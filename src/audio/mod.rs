pub mod analyser;
pub mod decode;
pub mod headless;
#[cfg(feature = "live-audio")]
pub mod live;
pub mod sampler;
pub mod snapshot;
pub mod source;
