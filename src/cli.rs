use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ringviz", about = "Audio-reactive radial ring visualizer")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG). Omit to capture live input.
    pub input: Option<PathBuf>,

    /// Output video file. Without it frames are only analyzed.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Capture from the input device whose name contains this text
    #[arg(short, long)]
    pub device: Option<String>,

    /// List capture devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Config file (default: ./ringviz.toml, then ~/.config/ringviz/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Internal render size in pixels
    #[arg(long, default_value_t = 320)]
    pub size: usize,

    /// Upscaled output size in pixels
    #[arg(long, default_value_t = 720)]
    pub display_size: u32,

    /// Angular resolution of the ring (even)
    #[arg(long, default_value_t = 360)]
    pub angles: usize,

    /// Frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Number of spectral bands
    #[arg(long, default_value_t = 16)]
    pub bands: usize,

    /// FFT block length in samples
    #[arg(long, default_value_t = 2048)]
    pub block: usize,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// PNG drawn in place of the center pulse disc
    #[arg(long)]
    pub logo: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub duration: Option<f64>,

    /// Pace file input in real time instead of rendering as fast as possible
    #[arg(long)]
    pub realtime: bool,

    /// Write frame statistics as JSON to this path
    #[arg(long)]
    pub stats: Option<PathBuf>,
}

impl Cli {
    /// Frame limit from `--frames` or `--duration`, whichever is smaller.
    pub fn frame_limit(&self) -> Option<u64> {
        let from_duration = self
            .duration
            .map(|secs| (secs.max(0.0) * self.fps as f64).round() as u64);
        match (self.frames, from_duration) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_built_in_config() {
        let cli = Cli::parse_from(["ringviz"]);
        assert_eq!(cli.size, 320);
        assert_eq!(cli.angles, 360);
        assert_eq!(cli.fps, 60);
        assert_eq!(cli.bands, 16);
        assert_eq!(cli.block, 2048);
        assert!(cli.input.is_none());
        assert_eq!(cli.frame_limit(), None);
    }

    #[test]
    fn frame_limit_takes_the_tighter_bound() {
        let cli = Cli::parse_from(["ringviz", "song.wav", "--fps", "30", "--duration", "2"]);
        assert_eq!(cli.frame_limit(), Some(60));
        let cli = Cli::parse_from(["ringviz", "--frames", "10", "--duration", "2"]);
        assert_eq!(cli.frame_limit(), Some(10));
    }
}
