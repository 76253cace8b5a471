//! Source Manager: arbitrates between decoded-file playback and live
//! microphone capture so that exactly one of them feeds the analysis node.

use std::fmt;

use super::analyser::AnalysisTap;
use super::decode::{AudioInput, DecodedAudio, PendingDecode};
use super::sampler::SpectralSampler;
use crate::error::{VisError, VisResult};

/// A playable element created from a decoded file.
pub trait Playable {
    fn play(&mut self);
    fn pause(&mut self);
    fn set_volume(&mut self, volume: f32);
    /// Route this element into the analysis tap, and to the speakers if
    /// `audible` is set.
    fn connect(&mut self, tap: &AnalysisTap, audible: bool);
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    fn has_ended(&self) -> bool;
    fn rewind(&mut self);
    /// Move any audio produced since the last call into the tap. Backends
    /// whose audio thread feeds the tap directly leave this empty.
    fn pump(&mut self) {}
    /// Release the element. It must not produce audio afterwards.
    fn remove(&mut self) {
        self.pause();
        self.disconnect();
    }
}

/// A granted microphone stream.
pub trait MicStream {
    /// Route capture into the analysis tap. Never routed to the speakers.
    fn connect(&mut self, tap: &AnalysisTap);
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Release the capture device.
    fn stop_tracks(&mut self);
}

/// Audio subsystem the Source Manager drives.
#[allow(async_fn_in_trait)]
pub trait AudioBackend {
    type Playable: Playable;
    type Mic: MicStream;

    /// Start decoding `input` away from the render thread.
    fn decode(&mut self, input: AudioInput) -> PendingDecode;
    fn create_playable(&mut self, audio: DecodedAudio) -> VisResult<Self::Playable>;
    async fn request_microphone(&mut self) -> VisResult<Self::Mic>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    FileLoaded,
    FilePlaying,
    FilePaused,
    MicActive,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Idle => "idle",
            SourceState::FileLoaded => "file loaded",
            SourceState::FilePlaying => "playing",
            SourceState::FilePaused => "paused",
            SourceState::MicActive => "microphone",
        };
        f.write_str(name)
    }
}

pub struct SourceManager<B: AudioBackend> {
    backend: B,
    sampler: SpectralSampler,
    transform_size: usize,
    state: SourceState,
    file: Option<B::Playable>,
    mic: Option<B::Mic>,
    volume: f32,
    pending: Option<PendingDecode>,
}

impl<B: AudioBackend> SourceManager<B> {
    pub fn new(backend: B, sampler: SpectralSampler, volume: f32) -> Self {
        Self {
            backend,
            transform_size: sampler.transform_size(),
            sampler,
            state: SourceState::Idle,
            file: None,
            mic: None,
            volume: volume.clamp(0.0, 1.0),
            pending: None,
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// True while a file decode is in flight.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    /// True while a source is producing audio the render loop should follow.
    pub fn is_live(&self) -> bool {
        matches!(self.state, SourceState::FilePlaying | SourceState::MicActive)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn transform_size(&self) -> usize {
        self.transform_size
    }

    pub fn sampler_mut(&mut self) -> &mut SpectralSampler {
        &mut self.sampler
    }

    /// Number of sources currently routed into the analysis node.
    pub fn connected_sources(&self) -> usize {
        let file = self.file.as_ref().is_some_and(|f| f.is_connected()) as usize;
        let mic = self.mic.as_ref().is_some_and(|m| m.is_connected()) as usize;
        file + mic
    }

    /// Change the frequency resolution. Applied to the sampler right away and
    /// again each time a source is connected.
    pub fn set_transform_size(&mut self, transform_size: usize) -> VisResult<()> {
        self.sampler.initialize(transform_size)?;
        self.transform_size = transform_size;
        Ok(())
    }

    /// Start decoding `input` in the background. The current source keeps
    /// running until the result is picked up by [`Self::poll_load`]; a newer
    /// request replaces one still in flight.
    pub fn begin_load(&mut self, input: AudioInput) {
        if self.pending.is_some() {
            log::debug!("Replacing a load that was still decoding");
        }
        log::debug!("Decoding {}", input);
        self.pending = Some(self.backend.decode(input));
    }

    /// Apply a finished decode. `None` while nothing has resolved yet; a
    /// failed decode leaves the previous source untouched.
    pub fn poll_load(&mut self) -> Option<VisResult<()>> {
        let result = self.pending.as_ref()?.try_take()?;
        self.pending = None;
        Some(result.and_then(|audio| self.replace_file(audio)))
    }

    fn replace_file(&mut self, audio: DecodedAudio) -> VisResult<()> {
        let mut playable = self.backend.create_playable(audio)?;

        self.release_microphone();
        if let Some(mut old) = self.file.take() {
            old.remove();
            log::debug!("Removed previous playable element");
        }

        self.sampler.initialize(self.transform_size)?;
        playable.set_volume(self.volume);
        playable.connect(self.sampler.tap(), true);
        self.file = Some(playable);
        self.transition(SourceState::FileLoaded);
        log::debug!("File source connected");
        Ok(())
    }

    /// Start (or resume) file playback.
    pub fn play(&mut self) -> VisResult<()> {
        match self.state {
            SourceState::FileLoaded | SourceState::FilePaused => {
                let Some(file) = self.file.as_mut() else {
                    return Err(VisError::NoActiveSource);
                };
                if file.has_ended() {
                    file.rewind();
                }
                file.play();
                self.transition(SourceState::FilePlaying);
                Ok(())
            }
            SourceState::FilePlaying => Ok(()),
            SourceState::MicActive => {
                log::debug!("Play ignored while the microphone is active");
                Ok(())
            }
            SourceState::Idle => Err(VisError::NoActiveSource),
        }
    }

    pub fn pause(&mut self) -> VisResult<()> {
        match self.state {
            SourceState::FilePlaying => {
                if let Some(file) = self.file.as_mut() {
                    file.pause();
                }
                self.transition(SourceState::FilePaused);
                Ok(())
            }
            SourceState::Idle => Err(VisError::NoActiveSource),
            _ => Ok(()),
        }
    }

    pub fn toggle_play(&mut self) -> VisResult<()> {
        if self.state == SourceState::FilePlaying {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Switch to microphone capture. Any file source is paused and
    /// disconnected before access is requested; if access is refused the
    /// file source is restored to its prior state.
    pub async fn start_microphone(&mut self) -> VisResult<()> {
        if self.state == SourceState::MicActive {
            return Ok(());
        }

        let prior = self.state;
        if let Some(file) = self.file.as_mut() {
            file.pause();
            file.disconnect();
        }

        match self.backend.request_microphone().await {
            Ok(mut mic) => {
                self.sampler.initialize(self.transform_size)?;
                mic.connect(self.sampler.tap());
                self.mic = Some(mic);
                self.transition(SourceState::MicActive);
                Ok(())
            }
            Err(e) => {
                log::error!("{}", e);
                if let Some(file) = self.file.as_mut() {
                    file.connect(self.sampler.tap(), true);
                    if prior == SourceState::FilePlaying {
                        file.play();
                    }
                }
                Err(e)
            }
        }
    }

    /// Release the microphone and fall back to the file source if there is one.
    pub fn stop_microphone(&mut self) {
        if self.state != SourceState::MicActive {
            return;
        }
        self.release_microphone();
        if let Some(file) = self.file.as_mut() {
            file.connect(self.sampler.tap(), true);
            self.transition(SourceState::FileLoaded);
        } else {
            self.transition(SourceState::Idle);
        }
    }

    pub async fn toggle_microphone(&mut self) -> VisResult<()> {
        if self.state == SourceState::MicActive {
            self.stop_microphone();
            Ok(())
        } else {
            self.start_microphone().await
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(file) = self.file.as_mut() {
            file.set_volume(self.volume);
        }
    }

    /// Per-frame housekeeping. Returns true when playback just reached the end
    /// of the file.
    pub fn tick(&mut self) -> bool {
        let Some(file) = self.file.as_mut() else {
            return false;
        };
        file.pump();
        if self.state == SourceState::FilePlaying && file.has_ended() {
            file.pause();
            self.transition(SourceState::FilePaused);
            log::info!("Playback finished");
            return true;
        }
        false
    }

    fn release_microphone(&mut self) {
        if let Some(mut mic) = self.mic.take() {
            mic.stop_tracks();
            mic.disconnect();
            log::debug!("Microphone released");
        }
    }

    fn transition(&mut self, next: SourceState) {
        if self.state != next {
            log::info!("Source: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

#[cfg(test)]
impl<B: AudioBackend> SourceManager<B> {
    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Begin a load and wait for it to resolve.
    pub(crate) fn load_blocking(&mut self, input: AudioInput) -> VisResult<()> {
        self.begin_load(input);
        loop {
            if let Some(result) = self.poll_load() {
                return result;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::sync::mpsc::Sender;

    #[derive(Default)]
    pub struct FakePlayable {
        pub tap: Option<AnalysisTap>,
        pub audible: bool,
        pub playing: bool,
        pub ended: bool,
        pub volume: f32,
    }

    impl Playable for FakePlayable {
        fn play(&mut self) {
            self.playing = true;
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
        }
        fn connect(&mut self, tap: &AnalysisTap, audible: bool) {
            if self.tap.is_none() {
                tap.attach();
                self.tap = Some(tap.clone());
            }
            self.audible = audible;
        }
        fn disconnect(&mut self) {
            if let Some(tap) = self.tap.take() {
                tap.detach();
            }
            self.audible = false;
        }
        fn is_connected(&self) -> bool {
            self.tap.is_some()
        }
        fn has_ended(&self) -> bool {
            self.ended
        }
        fn rewind(&mut self) {
            self.ended = false;
        }
    }

    #[derive(Default)]
    pub struct FakeMic {
        pub tap: Option<AnalysisTap>,
        pub stopped: bool,
    }

    impl MicStream for FakeMic {
        fn connect(&mut self, tap: &AnalysisTap) {
            if self.tap.is_none() {
                tap.attach();
                self.tap = Some(tap.clone());
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
        fn stop_tracks(&mut self) {
            self.stopped = true;
        }
    }

    /// Decodes instantly unless `hold_decodes` is set, in which case results
    /// wait in `held` until [`FakeBackend::release_decodes`].
    #[derive(Default)]
    pub struct FakeBackend {
        pub deny_microphone: bool,
        pub mic_requests: usize,
        pub hold_decodes: bool,
        pub held: Vec<(Sender<VisResult<DecodedAudio>>, VisResult<DecodedAudio>)>,
    }

    impl FakeBackend {
        pub fn release_decodes(&mut self) {
            for (tx, result) in self.held.drain(..) {
                let _ = tx.send(result);
            }
        }
    }

    impl AudioBackend for FakeBackend {
        type Playable = FakePlayable;
        type Mic = FakeMic;

        fn decode(&mut self, input: AudioInput) -> PendingDecode {
            let result = match input {
                AudioInput::Bytes { data, .. } if !data.is_empty() => Ok(DecodedAudio {
                    samples: vec![0.0f32; data.len()].into(),
                    sample_rate: 8000,
                }),
                _ => Err(VisError::Decode("empty file".into())),
            };
            let (tx, pending) = PendingDecode::channel();
            if self.hold_decodes {
                self.held.push((tx, result));
            } else {
                let _ = tx.send(result);
            }
            pending
        }

        fn create_playable(&mut self, _audio: DecodedAudio) -> VisResult<FakePlayable> {
            Ok(FakePlayable::default())
        }

        async fn request_microphone(&mut self) -> VisResult<FakeMic> {
            self.mic_requests += 1;
            if self.deny_microphone {
                Err(VisError::Permission("denied".into()))
            } else {
                Ok(FakeMic::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::audio::analyser::AnalyserSettings;
    use pollster::block_on;

    fn manager(deny_microphone: bool) -> SourceManager<FakeBackend> {
        let sampler = SpectralSampler::new(256, AnalyserSettings::default()).unwrap();
        let backend = FakeBackend {
            deny_microphone,
            ..Default::default()
        };
        SourceManager::new(backend, sampler, 0.8)
    }

    fn load(m: &mut SourceManager<FakeBackend>, len: usize) -> VisResult<()> {
        m.load_blocking(AudioInput::Bytes {
            data: vec![1; len],
            extension: None,
        })
    }

    fn assert_single_source(m: &mut SourceManager<FakeBackend>) {
        let expected = match m.state() {
            SourceState::Idle => 0,
            _ => 1,
        };
        assert_eq!(m.connected_sources(), expected, "state {}", m.state());
        assert_eq!(m.sampler_mut().tap().inputs(), expected);
    }

    #[test]
    fn file_lifecycle() {
        let mut m = manager(false);
        assert_eq!(m.state(), SourceState::Idle);
        assert!(matches!(m.play(), Err(VisError::NoActiveSource)));

        load(&mut m, 16).unwrap();
        assert_eq!(m.state(), SourceState::FileLoaded);
        assert!(!m.is_live());
        assert_single_source(&mut m);

        m.play().unwrap();
        assert_eq!(m.state(), SourceState::FilePlaying);
        assert!(m.is_live());

        m.toggle_play().unwrap();
        assert_eq!(m.state(), SourceState::FilePaused);
        m.toggle_play().unwrap();
        assert_eq!(m.state(), SourceState::FilePlaying);
        assert_single_source(&mut m);
    }

    #[test]
    fn failed_decode_changes_nothing() {
        let mut m = manager(false);
        load(&mut m, 16).unwrap();
        m.play().unwrap();

        let err = load(&mut m, 0).unwrap_err();
        assert!(matches!(err, VisError::Decode(_)));
        assert!(!m.is_loading());
        assert_eq!(m.state(), SourceState::FilePlaying);
        assert_single_source(&mut m);
    }

    #[test]
    fn pending_load_leaves_current_source_running() {
        let mut m = manager(false);
        block_on(m.start_microphone()).unwrap();
        m.backend.hold_decodes = true;

        m.begin_load(AudioInput::Bytes {
            data: vec![1; 8],
            extension: Some("wav".into()),
        });
        assert!(m.is_loading());
        assert!(m.poll_load().is_none());
        assert_eq!(m.state(), SourceState::MicActive);
        assert_single_source(&mut m);

        m.backend.release_decodes();
        m.poll_load().unwrap().unwrap();
        assert!(!m.is_loading());
        assert_eq!(m.state(), SourceState::FileLoaded);
        assert!(m.mic.is_none());
        assert_single_source(&mut m);
    }

    #[test]
    fn newer_load_supersedes_pending_one() {
        let mut m = manager(false);
        m.backend.hold_decodes = true;
        m.begin_load(AudioInput::Bytes {
            data: Vec::new(),
            extension: None,
        });
        m.begin_load(AudioInput::Bytes {
            data: vec![1; 4],
            extension: None,
        });
        m.backend.release_decodes();
        m.poll_load().unwrap().unwrap();
        assert_eq!(m.state(), SourceState::FileLoaded);
        assert!(m.poll_load().is_none());
    }

    #[test]
    fn transform_size_applies_to_the_sampler() {
        let mut m = manager(false);
        m.set_transform_size(1024).unwrap();
        assert_eq!(m.sampler_mut().bin_count(), 512);
        assert!(m.set_transform_size(100).is_err());
        assert_eq!(m.transform_size(), 1024);

        load(&mut m, 4).unwrap();
        assert_eq!(m.sampler_mut().bin_count(), 512);
        block_on(m.start_microphone()).unwrap();
        assert_eq!(m.sampler_mut().current_snapshot().bins().len(), 512);
    }

    #[test]
    fn mic_replaces_playing_file() {
        let mut m = manager(false);
        load(&mut m, 16).unwrap();
        m.play().unwrap();

        block_on(m.start_microphone()).unwrap();
        assert_eq!(m.state(), SourceState::MicActive);
        let file = m.file.as_ref().unwrap();
        assert!(!file.playing);
        assert!(!file.is_connected());
        assert!(m.mic.as_ref().unwrap().is_connected());
        assert_single_source(&mut m);
    }

    #[test]
    fn denied_mic_restores_prior_state() {
        let mut m = manager(true);
        load(&mut m, 16).unwrap();
        m.play().unwrap();

        let err = block_on(m.start_microphone()).unwrap_err();
        assert!(matches!(err, VisError::Permission(_)));
        assert_eq!(m.state(), SourceState::FilePlaying);
        let file = m.file.as_ref().unwrap();
        assert!(file.playing);
        assert!(file.audible);
        assert_single_source(&mut m);
    }

    #[test]
    fn denied_mic_from_idle_stays_idle() {
        let mut m = manager(true);
        assert!(block_on(m.toggle_microphone()).is_err());
        assert_eq!(m.state(), SourceState::Idle);
        assert_single_source(&mut m);
    }

    #[test]
    fn stopping_mic_falls_back_to_file() {
        let mut m = manager(false);
        block_on(m.start_microphone()).unwrap();
        m.stop_microphone();
        assert_eq!(m.state(), SourceState::Idle);
        assert_single_source(&mut m);

        load(&mut m, 4).unwrap();
        block_on(m.toggle_microphone()).unwrap();
        assert_eq!(m.state(), SourceState::MicActive);
        block_on(m.toggle_microphone()).unwrap();
        assert_eq!(m.state(), SourceState::FileLoaded);
        assert!(m.file.as_ref().unwrap().audible);
        assert_single_source(&mut m);
    }

    #[test]
    fn loading_a_file_releases_the_mic() {
        let mut m = manager(false);
        block_on(m.start_microphone()).unwrap();
        load(&mut m, 4).unwrap();
        assert_eq!(m.state(), SourceState::FileLoaded);
        assert!(m.mic.is_none());
        assert_single_source(&mut m);
    }

    #[test]
    fn play_is_ignored_while_mic_active() {
        let mut m = manager(false);
        load(&mut m, 4).unwrap();
        block_on(m.start_microphone()).unwrap();
        m.play().unwrap();
        m.pause().unwrap();
        assert_eq!(m.state(), SourceState::MicActive);
        assert_single_source(&mut m);
    }

    #[test]
    fn every_transition_sequence_keeps_one_source() {
        #[derive(Clone, Copy, Debug)]
        enum Op {
            Load,
            Toggle,
            Mic,
            Fail,
        }
        let ops = [Op::Load, Op::Toggle, Op::Mic, Op::Fail];
        for a in ops {
            for b in ops {
                for c in ops {
                    for deny in [false, true] {
                        let mut m = manager(deny);
                        for op in [a, b, c] {
                            let _ = match op {
                                Op::Load => load(&mut m, 4),
                                Op::Toggle => m.toggle_play(),
                                Op::Mic => block_on(m.toggle_microphone()),
                                Op::Fail => load(&mut m, 0),
                            };
                            assert!(m.connected_sources() <= 1, "{:?} {:?} {:?}", a, b, c);
                            assert_single_source(&mut m);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn end_of_file_pauses_and_replay_rewinds() {
        let mut m = manager(false);
        load(&mut m, 4).unwrap();
        m.play().unwrap();
        assert!(!m.tick());

        m.file.as_mut().unwrap().ended = true;
        assert!(m.tick());
        assert_eq!(m.state(), SourceState::FilePaused);

        m.play().unwrap();
        assert!(!m.file.as_ref().unwrap().ended);
        assert_eq!(m.state(), SourceState::FilePlaying);
    }

    #[test]
    fn volume_is_clamped_and_forwarded() {
        let mut m = manager(false);
        load(&mut m, 4).unwrap();
        assert_eq!(m.file.as_ref().unwrap().volume, 0.8);
        m.set_volume(3.0);
        assert_eq!(m.volume(), 1.0);
        assert_eq!(m.file.as_ref().unwrap().volume, 1.0);
    }
}
