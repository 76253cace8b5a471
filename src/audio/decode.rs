use std::io::Cursor;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{VisError, VisResult};

/// Mono PCM decoded from a chosen file. Samples are shared so playback
/// elements can hold them without copying.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Where a file source comes from.
#[derive(Clone, Debug)]
pub enum AudioInput {
    Path(PathBuf),
    Bytes {
        data: Vec<u8>,
        extension: Option<String>,
    },
}

impl AudioInput {
    /// Read (if needed) and decode. Runs on a worker thread.
    pub fn decode(self) -> VisResult<DecodedAudio> {
        match self {
            AudioInput::Path(path) => {
                let bytes = std::fs::read(&path)?;
                let extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_ascii_lowercase());
                decode_bytes(bytes, extension.as_deref())
            }
            AudioInput::Bytes { data, extension } => decode_bytes(data, extension.as_deref()),
        }
    }
}

impl std::fmt::Display for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioInput::Path(path) => write!(f, "{}", path.display()),
            AudioInput::Bytes { data, .. } => write!(f, "<{} bytes>", data.len()),
        }
    }
}

/// A decode running off the render thread. Poll it between frames.
pub struct PendingDecode {
    rx: Receiver<VisResult<DecodedAudio>>,
}

impl PendingDecode {
    pub fn spawn(input: AudioInput) -> Self {
        let (tx, pending) = Self::channel();
        let worker_tx = tx.clone();
        let spawned = thread::Builder::new()
            .name("decode".into())
            .spawn(move || {
                let _ = worker_tx.send(input.decode());
            });
        if let Err(e) = spawned {
            let _ = tx.send(Err(VisError::Io(e)));
        }
        pending
    }

    /// A pending decode completed by whoever holds the sender.
    pub fn channel() -> (Sender<VisResult<DecodedAudio>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// The result, once the worker has finished.
    pub fn try_take(&self) -> Option<VisResult<DecodedAudio>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(VisError::Decode(
                "decoder stopped without a result".into(),
            ))),
        }
    }
}

/// Decode an in-memory audio file. `extension` is a probe hint only.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> VisResult<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| VisError::Decode(format!("unrecognised format ({})", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| VisError::Decode("no audio tracks found".into()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VisError::Decode("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VisError::Decode(format!("unsupported codec ({})", e)))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(VisError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(VisError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        // Downmix to mono
        if channels == 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
                all_samples.push(mono);
            }
        }
    }

    let audio = DecodedAudio {
        samples: all_samples.into(),
        sample_rate,
    };
    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        audio.samples.len(),
        sample_rate,
        audio.duration()
    );
    Ok(audio)
}

#[cfg(test)]
pub(crate) fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}
