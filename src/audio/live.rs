//! Device-backed audio through cpal: audible file playback and microphone
//! capture, both feeding the analysis tap from the audio thread.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use super::analyser::AnalysisTap;
use super::decode::{AudioInput, DecodedAudio, PendingDecode};
use super::source::{AudioBackend, MicStream, Playable};
use crate::error::{VisError, VisResult};

pub struct LiveBackend {
    host: cpal::Host,
}

impl LiveBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for LiveBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for LiveBackend {
    type Playable = LivePlayer;
    type Mic = LiveMic;

    fn decode(&mut self, input: AudioInput) -> PendingDecode {
        PendingDecode::spawn(input)
    }

    fn create_playable(&mut self, audio: DecodedAudio) -> VisResult<LivePlayer> {
        LivePlayer::open(&self.host, audio)
    }

    async fn request_microphone(&mut self) -> VisResult<LiveMic> {
        LiveMic::open(&self.host)
    }
}

struct PlayerShared {
    samples: Arc<[f32]>,
    position: f64,
    step: f64,
    playing: bool,
    volume: f32,
    audible: bool,
    tap: Option<AnalysisTap>,
}

impl PlayerShared {
    fn ended(&self) -> bool {
        self.position as usize >= self.samples.len()
    }
}

pub struct LivePlayer {
    shared: Arc<Mutex<PlayerShared>>,
    stream: cpal::Stream,
}

impl LivePlayer {
    fn open(host: &cpal::Host, audio: DecodedAudio) -> VisResult<Self> {
        let device = host
            .default_output_device()
            .ok_or_else(|| VisError::Device("no audio output device found".into()))?;
        let config = device
            .default_output_config()
            .map_err(|e| VisError::Device(format!("failed to get output config: {}", e)))?;

        let channels = config.channels() as usize;
        let device_rate = config.sample_rate().0;
        log::info!(
            "Output: {} @ {}Hz ({} ch)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            device_rate,
            channels
        );

        let shared = Arc::new(Mutex::new(PlayerShared {
            samples: audio.samples.clone(),
            position: 0.0,
            // Nearest-sample resampling to the device rate.
            step: audio.sample_rate as f64 / device_rate as f64,
            playing: false,
            volume: 1.0,
            audible: true,
            tap: None,
        }));

        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_output::<f32>,
            cpal::SampleFormat::I16 => build_output::<i16>,
            cpal::SampleFormat::U16 => build_output::<u16>,
            other => {
                return Err(VisError::Device(format!(
                    "unsupported output sample format {:?}",
                    other
                )))
            }
        }(&device, &stream_config, channels, Arc::clone(&shared))?;

        stream
            .play()
            .map_err(|e| VisError::Device(format!("failed to start output stream: {}", e)))?;

        Ok(Self { shared, stream })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PlayerShared) -> R) -> Option<R> {
        self.shared.lock().ok().map(|mut s| f(&mut s))
    }
}

impl Playable for LivePlayer {
    fn play(&mut self) {
        self.with_state(|s| s.playing = true);
    }

    fn pause(&mut self) {
        self.with_state(|s| s.playing = false);
    }

    fn set_volume(&mut self, volume: f32) {
        self.with_state(|s| s.volume = volume);
    }

    fn connect(&mut self, tap: &AnalysisTap, audible: bool) {
        self.with_state(|s| {
            if s.tap.is_none() {
                tap.attach();
                s.tap = Some(tap.clone());
            }
            s.audible = audible;
        });
    }

    fn disconnect(&mut self) {
        self.with_state(|s| {
            if let Some(tap) = s.tap.take() {
                tap.detach();
            }
        });
    }

    fn is_connected(&self) -> bool {
        self.with_state(|s| s.tap.is_some()).unwrap_or(false)
    }

    fn has_ended(&self) -> bool {
        self.with_state(|s| s.ended()).unwrap_or(true)
    }

    fn rewind(&mut self) {
        self.with_state(|s| s.position = 0.0);
    }

    fn remove(&mut self) {
        self.pause();
        self.disconnect();
        if let Err(e) = self.stream.pause() {
            log::warn!("Failed to pause output stream: {}", e);
        }
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    shared: Arc<Mutex<PlayerShared>>,
) -> VisResult<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut mono: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let Ok(mut state) = shared.lock() else {
                    data.fill(T::EQUILIBRIUM);
                    return;
                };
                fill_output(&mut state, data, channels, &mut mono);
            },
            |err| log::error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| VisError::Device(format!("failed to build output stream: {}", e)))
}

/// Write the next block of playback into an interleaved device buffer and
/// forward the mono signal to the tap while playing.
fn fill_output<T>(state: &mut PlayerShared, data: &mut [T], channels: usize, mono: &mut Vec<f32>)
where
    T: SizedSample + FromSample<f32>,
{
    mono.clear();
    for frame in data.chunks_mut(channels.max(1)) {
        let sample = if state.playing && !state.ended() {
            let s = state.samples[state.position as usize];
            state.position += state.step;
            s
        } else {
            0.0
        };
        mono.push(sample);
        let out = if state.audible { sample * state.volume } else { 0.0 };
        frame.fill(T::from_sample(out));
    }
    if state.playing {
        if let Some(tap) = state.tap.as_ref() {
            tap.push(mono);
        }
    }
}

pub struct LiveMic {
    tap: Arc<Mutex<Option<AnalysisTap>>>,
    stream: Option<cpal::Stream>,
}

impl LiveMic {
    fn open(host: &cpal::Host) -> VisResult<Self> {
        let device = host
            .default_input_device()
            .ok_or_else(|| VisError::Permission("no microphone found".into()))?;
        let config = device
            .default_input_config()
            .map_err(|e| VisError::Permission(e.to_string()))?;
        let channels = (config.channels() as usize).max(1);

        log::info!(
            "Input: {} @ {}Hz",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0
        );

        let tap: Arc<Mutex<Option<AnalysisTap>>> = Arc::new(Mutex::new(None));
        let stream_config: cpal::StreamConfig = config.clone().into();
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_input::<f32>,
            cpal::SampleFormat::I16 => build_input::<i16>,
            cpal::SampleFormat::U16 => build_input::<u16>,
            other => {
                return Err(VisError::Device(format!(
                    "unsupported input sample format {:?}",
                    other
                )))
            }
        }(&device, &stream_config, channels, Arc::clone(&tap))?;

        stream
            .play()
            .map_err(|e| VisError::Device(format!("failed to start input stream: {}", e)))?;

        Ok(Self {
            tap,
            stream: Some(stream),
        })
    }
}

impl MicStream for LiveMic {
    fn connect(&mut self, tap: &AnalysisTap) {
        if let Ok(mut slot) = self.tap.lock() {
            if slot.is_none() {
                tap.attach();
                *slot = Some(tap.clone());
            }
        }
    }

    fn disconnect(&mut self) {
        if let Ok(mut slot) = self.tap.lock() {
            if let Some(tap) = slot.take() {
                tap.detach();
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.tap.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn stop_tracks(&mut self) {
        // Dropping the stream closes the capture device.
        self.stream.take();
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    tap: Arc<Mutex<Option<AnalysisTap>>>,
) -> VisResult<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut mono: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let Ok(guard) = tap.lock() else {
                    return;
                };
                let Some(tap) = guard.as_ref() else {
                    return;
                };
                downmix(data, channels, &mut mono);
                tap.push(&mono);
            },
            |err| log::error!("Audio input stream error: {}", err),
            None,
        )
        // Hosts report a refused capture device as a build failure.
        .map_err(|e| VisError::Permission(e.to_string()))
}

/// Average interleaved device frames down to mono `f32`.
fn downmix<T>(data: &[T], channels: usize, mono: &mut Vec<f32>)
where
    T: SizedSample,
    f32: FromSample<T>,
{
    mono.clear();
    mono.extend(data.chunks(channels.max(1)).map(|frame| {
        frame.iter().map(|&s| s.to_sample::<f32>()).sum::<f32>() / frame.len() as f32
    }));
}
