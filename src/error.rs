use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A configuration invariant that failed at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("angle resolution must be even and at least 2, got {0}")]
    AngleResolution(usize),
    #[error("band count must be at least 1")]
    NoBands,
    #[error("FFT block length must be at least 2 samples, got {0}")]
    BlockTooShort(usize),
    #[error("sample rate must be positive")]
    ZeroSampleRate,
    #[error("band range {min_hz} Hz .. {max_hz} Hz is invalid (Nyquist is {nyquist} Hz)")]
    BandRange { min_hz: f32, max_hz: f32, nyquist: f32 },
    #[error("bass cutoff must be positive, got {0} Hz")]
    BassCutoff(f32),
    #[error("target frame rate must be positive")]
    ZeroFrameRate,
    #[error("{name} must lie in [0, 1), got {value}")]
    Coefficient { name: &'static str, value: f32 },
    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f32 },
    #[error("internal size {0} px leaves no drawable ring")]
    SizeTooSmall(usize),
    #[error("flux history must hold at least {min} samples, got {got}")]
    HistoryTooShort { got: usize, min: usize },
}

/// Failures of the audio capture collaborator. All of them end the tick loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoDevice,
    #[error("no input device matching {0:?}")]
    DeviceNotFound(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("no audio arrived within {0:?}")]
    Timeout(Duration),
    #[error("audio stream disconnected")]
    Disconnected,
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
}

/// Failures of a display sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{program} exited with {status}:\n{stderr}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("failed to load overlay image: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to write stats: {0}")]
    Stats(#[from] serde_json::Error),
}

/// Fatal errors surfaced by the frame scheduler.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}
