use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Pipes raw RGBA frames into an ffmpeg child process.
pub struct FfmpegEncoder {
    child: Child,
    frame_len: usize,
    frames: u64,
}

impl FfmpegEncoder {
    /// When `input_audio` is given its audio track is muxed into the output.
    pub fn new(
        output_path: &Path,
        input_audio: Option<&Path>,
        width: u32,
        height: u32,
        fps: u32,
        codec: &str,
        pix_fmt: &str,
        crf: u32,
        bitrate: Option<&str>,
    ) -> Result<Self> {
        let mut args = vec![
            "-y".to_string(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgba".into(),
            "-video_size".into(), format!("{}x{}", width, height),
            "-framerate".into(), fps.to_string(),
            "-i".into(), "pipe:0".into(),
        ];

        if let Some(audio) = input_audio {
            let audio = audio
                .to_str()
                .with_context(|| format!("Audio path is not valid UTF-8: {}", audio.display()))?;
            args.extend(["-i".to_string(), audio.to_string()]);
        }

        args.extend([
            "-c:v".to_string(), codec.to_string(),
            "-pix_fmt".into(), pix_fmt.to_string(),
        ]);

        if let Some(br) = bitrate {
            args.extend(["-b:v".to_string(), br.to_string()]);
        } else {
            args.extend(["-crf".to_string(), crf.to_string()]);
            args.extend(["-preset".to_string(), "medium".to_string()]);
        }

        if input_audio.is_some() {
            args.extend([
                "-c:a".to_string(), "aac".into(),
                "-b:a".into(), "192k".into(),
                "-shortest".into(),
            ]);
        }

        let output = output_path
            .to_str()
            .with_context(|| format!("Output path is not valid UTF-8: {}", output_path.display()))?;
        args.push(output.to_string());

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!("FFmpeg encoder started: {}x{} @ {}fps, codec={}", width, height, fps, codec);

        Ok(Self {
            child,
            frame_len: width as usize * height as usize * 4,
            frames: 0,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_len {
            anyhow::bail!(
                "Frame is {} bytes, encoder expects {}",
                rgba_pixels.len(),
                self.frame_len
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }
}
