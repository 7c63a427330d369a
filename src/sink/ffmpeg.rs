use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use super::FrameSink;
use crate::error::SinkError;
use crate::render::frame::FrameOutput;
use crate::render::overlay::DisplayScaler;

const PROGRAM: &str = "ffmpeg";

#[derive(Clone, Debug)]
pub struct EncoderOptions {
    pub output: PathBuf,
    /// Muxed into the output when present.
    pub audio: Option<PathBuf>,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    pub bitrate: Option<String>,
}

impl EncoderOptions {
    fn args(&self, size: u32) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-loglevel".into(), "error".into(),
            "-f".into(), "rawvideo".into(),
            "-pixel_format".into(), "rgb24".into(),
            "-video_size".into(), format!("{}x{}", size, size),
            "-framerate".into(), self.fps.to_string(),
            "-i".into(), "pipe:0".into(),
        ];
        if let Some(audio) = &self.audio {
            args.extend(["-i".into(), audio.to_string_lossy().into_owned()]);
        }
        args.extend([
            "-c:v".into(), self.codec.clone(),
            "-pix_fmt".into(), self.pix_fmt.clone(),
        ]);

        if let Some(br) = &self.bitrate {
            args.extend(["-b:v".to_string(), br.clone()]);
        } else {
            args.extend(["-crf".to_string(), self.crf.to_string()]);
            args.extend(["-preset".to_string(), "medium".to_string()]);
        }

        if self.audio.is_some() {
            args.extend([
                "-c:a".into(), "aac".into(),
                "-b:a".into(), "192k".into(),
                "-shortest".into(),
            ]);
        }
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Pipes upscaled frames into an ffmpeg child as raw rgb24.
pub struct FfmpegEncoder {
    child: Option<Child>,
    scaler: DisplayScaler,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(options: &EncoderOptions, scaler: DisplayScaler) -> Result<Self, SinkError> {
        let size = scaler.output_size();
        let child = Command::new(PROGRAM)
            .args(options.args(size))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SinkError::Spawn {
                program: PROGRAM.to_string(),
                source,
            })?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={} -> {}",
            size,
            size,
            options.fps,
            options.codec,
            options.output.display()
        );

        Ok(Self {
            child: Some(child),
            scaler,
            frames: 0,
        })
    }
}

impl FrameSink for FfmpegEncoder {
    fn present(&mut self, frame: &FrameOutput) -> Result<(), SinkError> {
        let image = self.scaler.render(frame);
        let stdin = self
            .child
            .as_mut()
            .and_then(|c| c.stdin.as_mut())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::BrokenPipe, "ffmpeg stdin closed"))?;
        stdin.write_all(image.as_raw())?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), SinkError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        // Close stdin to signal EOF
        drop(child.stdin.take());

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(SinkError::Exit {
                program: PROGRAM.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            log::warn!("FFmpeg encoder dropped before finishing; stopping it");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
