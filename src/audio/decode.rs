use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::capture::{AudioCapture, CapturedBlock};
use crate::error::CaptureError;

/// Fully decoded audio, interleaved.
pub struct AudioData {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl AudioData {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }
}

pub fn decode_audio(path: &Path) -> Result<AudioData, CaptureError> {
    let fail = |message: String| CaptureError::Decode {
        path: path.to_path_buf(),
        message,
    };

    let file = std::fs::File::open(path).map_err(|e| fail(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("unrecognized format: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("no audio tracks found".into()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| fail("unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| fail(format!("no decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(fail(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(fail(e.to_string())),
        };

        let spec = *decoded.spec();
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let data = AudioData {
        samples,
        channels,
        sample_rate,
    };
    log::info!(
        "Decoded audio: {} frames x {} ch, {}Hz, {:.1}s",
        data.frames(),
        channels,
        sample_rate,
        data.duration_secs()
    );
    Ok(data)
}

/// Serves a decoded file as a sequence of analysis windows. Each read returns
/// `block_frames` frames and advances by `hop_frames`, so one read per video
/// frame keeps the picture in step with the audio.
pub struct FileCapture {
    path: PathBuf,
    data: AudioData,
    block_frames: usize,
    hop_frames: usize,
    position: usize,
    released: bool,
}

impl FileCapture {
    pub fn open(path: &Path, block_frames: usize, fps: u32) -> Result<Self, CaptureError> {
        let data = decode_audio(path)?;
        let hop = (data.sample_rate / fps.max(1)).max(1) as usize;
        Ok(Self::from_data(path.to_path_buf(), data, block_frames, hop))
    }

    pub fn from_data(path: PathBuf, data: AudioData, block_frames: usize, hop_frames: usize) -> Self {
        Self {
            path,
            data,
            block_frames: block_frames.max(1),
            hop_frames: hop_frames.max(1),
            position: 0,
            released: false,
        }
    }
}

impl AudioCapture for FileCapture {
    fn sample_rate(&self) -> u32 {
        self.data.sample_rate
    }

    fn read_block(&mut self) -> Result<Option<CapturedBlock>, CaptureError> {
        if self.released {
            return Err(CaptureError::Disconnected);
        }
        let frames = self.data.frames();
        if self.position >= frames {
            return Ok(None);
        }
        let channels = self.data.channels.max(1);
        let end = (self.position + self.block_frames).min(frames);
        let samples = self.data.samples[self.position * channels..end * channels].to_vec();
        self.position += self.hop_frames;
        Ok(Some(CapturedBlock { samples, channels }))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            log::info!("Closed {}", self.path.display());
        }
    }

    fn remaining_blocks(&self) -> Option<u64> {
        let left = self.data.frames().saturating_sub(self.position);
        Some(left.div_ceil(self.hop_frames) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(frames: usize, channels: usize) -> AudioData {
        AudioData {
            samples: (0..frames * channels).map(|i| i as f32).collect(),
            channels,
            sample_rate: 44_100,
        }
    }

    #[test]
    fn serves_blocks_until_exhausted() {
        let mut capture = FileCapture::from_data("mem.wav".into(), data(10, 2), 4, 4);
        assert_eq!(capture.remaining_blocks(), Some(3));

        let first = capture.read_block().unwrap().unwrap();
        assert_eq!(first.channels, 2);
        assert_eq!(first.frames(), 4);
        assert_eq!(&first.samples[..2], &[0.0, 1.0]);

        capture.read_block().unwrap().unwrap();
        let last = capture.read_block().unwrap().unwrap();
        assert_eq!(last.frames(), 2);
        assert!(capture.read_block().unwrap().is_none());
        assert_eq!(capture.remaining_blocks(), Some(0));
    }

    #[test]
    fn windows_overlap_when_hop_is_shorter_than_block() {
        let mut capture = FileCapture::from_data("mem.wav".into(), data(10, 1), 4, 2);
        assert_eq!(capture.remaining_blocks(), Some(5));
        let first = capture.read_block().unwrap().unwrap();
        let second = capture.read_block().unwrap().unwrap();
        assert_eq!(first.samples, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(second.samples, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn released_capture_refuses_reads() {
        let mut capture = FileCapture::from_data("mem.wav".into(), data(10, 1), 4, 4);
        capture.release();
        capture.release();
        assert!(matches!(capture.read_block(), Err(CaptureError::Disconnected)));
    }

    #[test]
    fn decodes_wav_written_by_hound() {
        let path = std::env::temp_dir().join(format!("ringviz-decode-{}.wav", std::process::id()));
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..1000 {
            let s = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(-s).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_audio(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(decoded.sample_rate, 22_050);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 1000);
        // Left and right are mirror images, so every frame downmixes to zero.
        let mono = crate::audio::capture::downmix(&decoded.samples, 2);
        assert!(mono.iter().all(|s| s.abs() < 1e-4));
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let result = decode_audio(Path::new("/definitely/not/here.flac"));
        assert!(matches!(result, Err(CaptureError::Decode { .. })));
    }
}
