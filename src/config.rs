use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::params::{
    AudioParams, BeatParams, ColorParams, EnvelopeParams, RenderParams, RingParams,
    VisualizerConfig,
};

const FILE_NAME: &str = "ringviz.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub render: RenderParams,
    #[serde(default)]
    pub audio: AudioParams,
    #[serde(default)]
    pub envelope: EnvelopeParams,
    #[serde(default)]
    pub beat: BeatParams,
    #[serde(default)]
    pub ring: RingParams,
    #[serde(default)]
    pub color: ColorParams,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_display_size")]
    pub display_size: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    #[serde(default)]
    pub bitrate: Option<String>,
    #[serde(default)]
    pub logo: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CaptureConfig {
    /// Substring of the input device name.
    #[serde(default)]
    pub device: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            display_size: default_display_size(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            bitrate: None,
            logo: None,
        }
    }
}

pub fn default_display_size() -> u32 { 720 }
pub fn default_crf() -> u32 { 18 }
pub fn default_codec() -> String { "libx264".into() }
pub fn default_pix_fmt() -> String { "yuv420p".into() }

impl Config {
    /// The analysis and render parameters from the file sections.
    pub fn visualizer(&self) -> VisualizerConfig {
        VisualizerConfig {
            audio: self.audio.clone(),
            envelope: self.envelope.clone(),
            beat: self.beat.clone(),
            color: self.color.clone(),
            ring: self.ring.clone(),
            render: self.render.clone(),
        }
    }
}

/// Explicit path, else `ringviz.toml` in the working directory, else the
/// per-user config file.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(FILE_NAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("ringviz").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("ringviz").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn parse_config(content: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(content)
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    match parse_config(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.visualizer(), VisualizerConfig::default());
        assert_eq!(config.output.display_size, 720);
        assert_eq!(config.output.codec, "libx264");
        assert!(config.capture.device.is_none());
    }

    #[test]
    fn sections_override_individual_keys() {
        let config = parse_config(
            r#"
            [output]
            display_size = 1080
            logo = "logo.png"

            [capture]
            device = "monitor"

            [render]
            fps = 30
            background = [0, 0, 0]

            [audio]
            bands = 24
            max_hz = 16000.0

            [beat]
            refractory_ms = 150

            [ring]
            feather_px = 2.0
            "#,
        )
        .unwrap();

        assert_eq!(config.output.display_size, 1080);
        assert_eq!(config.output.logo, Some(PathBuf::from("logo.png")));
        assert_eq!(config.capture.device.as_deref(), Some("monitor"));

        let viz = config.visualizer();
        assert_eq!(viz.render.fps, 30);
        assert_eq!(viz.render.size, 320);
        assert_eq!(viz.render.background, [0, 0, 0]);
        assert_eq!(viz.audio.bands, 24);
        assert_eq!(viz.audio.max_hz(), 16_000.0);
        assert_eq!(viz.audio.block_len, 2048);
        assert_eq!(viz.beat.refractory_ms, 150);
        assert_eq!(viz.ring.feather_px, 2.0);
        assert_eq!(viz.ring.inner_ratio, 0.5);
        assert_eq!(viz.validate(), Ok(()));
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(parse_config("[render]\nfps = \"fast\"").is_err());
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/tmp/elsewhere.toml");
        assert_eq!(find_config_path(Some(path)), Some(path.to_path_buf()));
    }
}
