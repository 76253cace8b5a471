//! Backend without audio devices. Files play against the wall clock and feed
//! the analysis tap; nothing is audible and microphone access is refused.

use std::time::Instant;

use super::analyser::{AnalysisTap, MAX_FFT_SIZE};
use super::decode::{AudioInput, DecodedAudio, PendingDecode};
use super::source::{AudioBackend, MicStream, Playable};
use crate::error::{VisError, VisResult};

#[derive(Debug, Default)]
pub struct HeadlessBackend;

impl AudioBackend for HeadlessBackend {
    type Playable = ClockPlayer;
    type Mic = NoMicrophone;

    fn decode(&mut self, input: AudioInput) -> PendingDecode {
        PendingDecode::spawn(input)
    }

    fn create_playable(&mut self, audio: DecodedAudio) -> VisResult<ClockPlayer> {
        Ok(ClockPlayer::new(audio))
    }

    async fn request_microphone(&mut self) -> VisResult<NoMicrophone> {
        Err(VisError::Permission(
            "audio input needs a build with the `live-audio` feature".into(),
        ))
    }
}

/// Plays decoded samples by advancing a playhead with elapsed time.
pub struct ClockPlayer {
    audio: DecodedAudio,
    /// Playhead in samples at the moment playback last started or paused.
    anchor: usize,
    started: Option<Instant>,
    fed_until: usize,
    tap: Option<AnalysisTap>,
}

impl ClockPlayer {
    pub fn new(audio: DecodedAudio) -> Self {
        Self {
            audio,
            anchor: 0,
            started: None,
            fed_until: 0,
            tap: None,
        }
    }

    pub fn position(&self) -> usize {
        let elapsed = self.started.map_or(0, |t| {
            (t.elapsed().as_secs_f64() * self.audio.sample_rate as f64) as usize
        });
        (self.anchor + elapsed).min(self.audio.samples.len())
    }
}

impl Playable for ClockPlayer {
    fn play(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn pause(&mut self) {
        self.anchor = self.position();
        self.started = None;
    }

    // Nothing is audible here; volume and the audible flag only matter to
    // device backends.
    fn set_volume(&mut self, _volume: f32) {}

    fn connect(&mut self, tap: &AnalysisTap, _audible: bool) {
        if self.tap.is_none() {
            tap.attach();
            self.tap = Some(tap.clone());
            self.fed_until = self.position();
        }
    }

    fn disconnect(&mut self) {
        if let Some(tap) = self.tap.take() {
            tap.detach();
        }
    }

    fn is_connected(&self) -> bool {
        self.tap.is_some()
    }

    fn has_ended(&self) -> bool {
        self.position() >= self.audio.samples.len()
    }

    fn rewind(&mut self) {
        self.anchor = 0;
        self.fed_until = 0;
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn pump(&mut self) {
        let position = self.position();
        if let Some(tap) = self.tap.as_ref() {
            if position > self.fed_until {
                let start = self.fed_until.max(position.saturating_sub(MAX_FFT_SIZE));
                tap.push(&self.audio.samples[start..position]);
            }
        }
        self.fed_until = position;
    }
}

/// Microphone type for backends that can never grant one.
pub enum NoMicrophone {}

impl MicStream for NoMicrophone {
    fn connect(&mut self, _tap: &AnalysisTap) {
        match *self {}
    }

    fn disconnect(&mut self) {
        match *self {}
    }

    fn is_connected(&self) -> bool {
        match *self {}
    }

    fn stop_tracks(&mut self) {
        match *self {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analyser::AnalyserSettings;
    use crate::audio::decode::wav_bytes;
    use crate::audio::sampler::SpectralSampler;
    use crate::audio::source::{SourceManager, SourceState};
    use pollster::block_on;
    use std::time::Duration;

    fn silent_clip(seconds: f32, rate: u32) -> DecodedAudio {
        DecodedAudio {
            samples: vec![0.0f32; (seconds * rate as f32) as usize].into(),
            sample_rate: rate,
        }
    }

    #[test]
    fn playhead_advances_only_while_playing() {
        let mut player = ClockPlayer::new(silent_clip(2.0, 8000));
        assert_eq!(player.position(), 0);
        player.play();
        std::thread::sleep(Duration::from_millis(20));
        player.pause();
        let paused_at = player.position();
        assert!(paused_at > 0);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(player.position(), paused_at);
        assert!(!player.has_ended());
        player.rewind();
        assert_eq!(player.position(), 0);
    }

    #[test]
    fn short_clip_ends() {
        let mut player = ClockPlayer::new(silent_clip(0.01, 8000));
        player.play();
        std::thread::sleep(Duration::from_millis(30));
        assert!(player.has_ended());
    }

    #[test]
    fn microphone_is_refused() {
        let mut backend = HeadlessBackend;
        assert!(matches!(
            block_on(backend.request_microphone()),
            Err(VisError::Permission(_))
        ));
    }

    #[test]
    fn silent_file_gives_silent_snapshot_mid_playback() {
        let sampler = SpectralSampler::new(2048, AnalyserSettings::default()).unwrap();
        let mut manager = SourceManager::new(HeadlessBackend, sampler, 1.0);
        let bytes = wav_bytes(&vec![0i16; 16000], 8000);
        manager
            .load_blocking(AudioInput::Bytes {
                data: bytes,
                extension: Some("wav".into()),
            })
            .unwrap();
        manager.play().unwrap();
        assert_eq!(manager.state(), SourceState::FilePlaying);

        std::thread::sleep(Duration::from_millis(50));
        manager.tick();
        let snap = manager.sampler_mut().current_snapshot();
        assert_eq!(snap.bins().len(), 1024);
        assert!(snap.bins().iter().all(|v| *v <= 1));
    }
}
