use std::collections::VecDeque;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use super::capture::{AudioCapture, CapturedBlock};
use crate::error::CaptureError;

/// Chunks in flight between the audio callback and the tick thread.
const CHANNEL_DEPTH: usize = 64;
/// How long a freshly started stream may take to deliver its first chunk.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(3);

/// The most recent `frames` interleaved frames seen on the stream.
#[derive(Debug)]
pub struct RollingWindow {
    channels: usize,
    frames: usize,
    samples: VecDeque<f32>,
}

impl RollingWindow {
    pub fn new(channels: usize, frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            frames,
            samples: VecDeque::with_capacity(frames * channels),
        }
    }

    pub fn push(&mut self, chunk: &[f32]) {
        self.samples.extend(chunk.iter().copied());
        let cap = self.frames * self.channels;
        if self.samples.len() > cap {
            let excess = self.samples.len() - cap;
            // Round up to whole frames so channels stay aligned.
            let excess = excess.div_ceil(self.channels) * self.channels;
            self.samples.drain(..excess.min(self.samples.len()));
        }
    }

    #[allow(dead_code)]
    pub fn len_frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    pub fn snapshot(&self) -> CapturedBlock {
        CapturedBlock {
            samples: self.samples.iter().copied().collect(),
            channels: self.channels,
        }
    }
}

/// The tick-thread end of the callback channels.
pub struct BlockReceiver {
    audio_rx: Receiver<Vec<f32>>,
    error_rx: Receiver<String>,
    window: RollingWindow,
    timeout: Duration,
}

impl BlockReceiver {
    /// `timeout` bounds the wait for fresh audio on each steady-state read.
    pub fn new(
        audio_rx: Receiver<Vec<f32>>,
        error_rx: Receiver<String>,
        window: RollingWindow,
        timeout: Duration,
    ) -> Self {
        Self {
            audio_rx,
            error_rx,
            window,
            timeout,
        }
    }

    fn drain(&mut self) -> Result<usize, CaptureError> {
        let mut received = 0;
        loop {
            match self.audio_rx.try_recv() {
                Ok(chunk) => {
                    received += chunk.len();
                    self.window.push(&chunk);
                }
                Err(TryRecvError::Empty) => return Ok(received),
                Err(TryRecvError::Disconnected) => return Err(CaptureError::Disconnected),
            }
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<(), CaptureError> {
        match self.audio_rx.recv_timeout(timeout) {
            Ok(chunk) => {
                self.window.push(&chunk);
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Disconnected),
        }
    }

    fn check_errors(&self) -> Result<(), CaptureError> {
        match self.error_rx.try_recv() {
            Ok(message) => Err(CaptureError::Stream(message)),
            Err(_) => Ok(()),
        }
    }

    /// Block until the stream delivers its first chunk. Backends can take far
    /// longer to start than one steady-state read allows.
    pub fn wait_for_first(&mut self, startup: Duration) -> Result<(), CaptureError> {
        self.check_errors()?;
        if self.drain()? == 0 {
            self.wait(startup)?;
        }
        self.check_errors()
    }

    /// The newest window, waiting up to `timeout` when nothing arrived since
    /// the previous call.
    pub fn next_block(&mut self) -> Result<CapturedBlock, CaptureError> {
        self.check_errors()?;
        if self.drain()? == 0 {
            self.wait(self.timeout)?;
            self.drain()?;
        }
        Ok(self.window.snapshot())
    }
}

/// Live input through cpal. Each read returns the latest block-length window,
/// waiting for fresh samples when none arrived since the previous read.
pub struct LiveCapture {
    stream: Option<Stream>,
    device_name: String,
    sample_rate: u32,
    receiver: BlockReceiver,
}

impl LiveCapture {
    /// Open the default input, or the first input whose name contains `device`.
    /// Returns once the first audio has arrived.
    pub fn open(device: Option<&str>, block_frames: usize) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = select_device(&host, device)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| CaptureError::Device(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = config.channels as usize;
        let sample_rate = config.sample_rate.0;

        log::info!("Using audio device: {device_name}");
        log::info!("Input stream: {channels} ch at {sample_rate} Hz ({sample_format:?})");

        let (audio_tx, audio_rx) = crossbeam_channel::bounded(CHANNEL_DEPTH);
        let (error_tx, error_rx) = crossbeam_channel::bounded(CHANNEL_DEPTH);
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, audio_tx, error_tx),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, audio_tx, error_tx),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, audio_tx, error_tx),
            SampleFormat::I32 => build_stream::<i32>(&device, &config, audio_tx, error_tx),
            other => {
                return Err(CaptureError::Device(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        }?;
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;

        let block_secs = block_frames as f64 / sample_rate.max(1) as f64;
        let mut receiver = BlockReceiver::new(
            audio_rx,
            error_rx,
            RollingWindow::new(channels, block_frames),
            Duration::from_secs_f64(2.0 * block_secs),
        );
        receiver.wait_for_first(STARTUP_TIMEOUT)?;
        log::info!("Input stream running");

        Ok(Self {
            stream: Some(stream),
            device_name,
            sample_rate,
            receiver,
        })
    }
}

impl AudioCapture for LiveCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_block(&mut self) -> Result<Option<CapturedBlock>, CaptureError> {
        if self.stream.is_none() {
            return Err(CaptureError::Disconnected);
        }
        self.receiver.next_block().map(Some)
    }

    fn release(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause input stream: {e}");
            }
            drop(stream);
            log::info!("Released audio device: {}", self.device_name);
        }
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device, CaptureError> {
    let Some(name) = name else {
        return host.default_input_device().ok_or(CaptureError::NoDevice);
    };
    let needle = name.to_lowercase();
    let mut devices = host
        .input_devices()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    devices
        .find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    audio_tx: Sender<Vec<f32>>,
    error_tx: Sender<String>,
) -> Result<Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                // A full channel means the tick thread is behind; newer audio wins on the next read.
                let _ = audio_tx.try_send(chunk);
            },
            move |err| {
                log::warn!("Audio stream error: {err}");
                let _ = error_tx.try_send(err.to_string());
            },
            None,
        )
        .map_err(|e| CaptureError::Stream(e.to_string()))
}

/// Names of every input device on the default host.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Device(e.to_string()))?;
    Ok(devices
        .map(|d| d.name().unwrap_or_else(|_| "Unknown".to_string()))
        .collect())
}
