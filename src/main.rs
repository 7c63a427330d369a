mod audio;
mod cli;
mod config;
mod error;
mod params;
mod render;
mod scheduler;
mod sink;
mod visualizer;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::Ordering;

use audio::capture::AudioCapture;
use audio::decode::FileCapture;
use audio::live::{list_input_devices, LiveCapture};
use cli::Cli;
use render::overlay::DisplayScaler;
use scheduler::{FrameScheduler, Pacing};
use sink::ffmpeg::{EncoderOptions, FfmpegEncoder};
use sink::stats::StatsSink;
use sink::FrameSink;
use visualizer::Visualizer;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    if cli.list_devices {
        let devices = list_input_devices().context("Failed to enumerate input devices")?;
        println!("Input devices:");
        for name in &devices {
            println!("  {}", name);
        }
        return Ok(());
    }

    let file_config = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                config::Config::default()
            }
        },
        None => config::Config::default(),
    };

    // Merge: config values apply only when CLI is at its default
    let mut viz_config = file_config.visualizer();
    let out = &file_config.output;
    if cli.size == 320 { cli.size = viz_config.render.size; }
    if cli.angles == 360 { cli.angles = viz_config.render.angles; }
    if cli.fps == 60 { cli.fps = viz_config.render.fps; }
    if cli.bands == 16 { cli.bands = viz_config.audio.bands; }
    if cli.block == 2048 { cli.block = viz_config.audio.block_len; }
    if cli.display_size == config::default_display_size() { cli.display_size = out.display_size; }
    if cli.crf == config::default_crf() { cli.crf = out.crf; }
    if cli.codec == config::default_codec() { cli.codec = out.codec.clone(); }
    if cli.pix_fmt == config::default_pix_fmt() { cli.pix_fmt = out.pix_fmt.clone(); }
    if cli.bitrate.is_none() { cli.bitrate = out.bitrate.clone(); }
    if cli.logo.is_none() { cli.logo = out.logo.clone(); }
    if cli.device.is_none() { cli.device = file_config.capture.device.clone(); }

    viz_config.render.size = cli.size;
    viz_config.render.angles = cli.angles;
    viz_config.render.fps = cli.fps;
    viz_config.audio.bands = cli.bands;
    viz_config.audio.block_len = cli.block;

    log::info!("ringviz - audio-reactive ring visualizer");
    let capture: Box<dyn AudioCapture> = match &cli.input {
        Some(input) => {
            if !input.exists() {
                anyhow::bail!("Input file not found: {}", input.display());
            }
            log::info!("Input: {}", input.display());
            Box::new(FileCapture::open(input, cli.block, cli.fps).context("Failed to decode audio")?)
        }
        None => Box::new(
            LiveCapture::open(cli.device.as_deref(), cli.block)
                .context("Failed to open audio input")?,
        ),
    };
    if let Some(configured) = viz_config.audio.adopt_capture_rate(capture.sample_rate()) {
        if configured == params::defaults::SAMPLE_RATE {
            log::info!("Using capture sample rate {} Hz", capture.sample_rate());
        } else {
            log::warn!(
                "Configured sample rate {} Hz overridden by capture rate {} Hz",
                configured,
                capture.sample_rate()
            );
        }
    }
    log::info!(
        "Resolution: {}px internal, {}px output @ {}fps",
        cli.size,
        cli.display_size,
        cli.fps
    );

    let mut visualizer = Visualizer::new(viz_config).context("Invalid visualizer configuration")?;

    let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
    if let Some(output) = &cli.output {
        let mut scaler = DisplayScaler::new(cli.display_size);
        if let Some(logo) = &cli.logo {
            scaler = scaler
                .with_logo_file(logo)
                .with_context(|| format!("Failed to load logo {}", logo.display()))?;
        }
        let options = EncoderOptions {
            output: output.clone(),
            audio: cli.input.clone(),
            fps: cli.fps,
            codec: cli.codec.clone(),
            pix_fmt: cli.pix_fmt.clone(),
            crf: cli.crf,
            bitrate: cli.bitrate.clone(),
        };
        log::info!("Starting FFmpeg encoder...");
        sinks.push(Box::new(
            FfmpegEncoder::new(&options, scaler).context("Is ffmpeg installed?")?,
        ));
    }
    sinks.push(Box::new(StatsSink::new(cli.stats.clone())));

    let pacing = if cli.input.is_some() && !cli.realtime {
        Pacing::Offline
    } else {
        Pacing::RealTime
    };
    let scheduler = FrameScheduler::new(cli.fps, pacing)
        .with_frame_limit(cli.frame_limit())
        .with_progress(true);

    if cli.input.is_none() {
        let stop = scheduler.stop_handle();
        std::thread::spawn(move || {
            let mut line = String::new();
            if matches!(std::io::stdin().read_line(&mut line), Ok(n) if n > 0) {
                stop.store(true, Ordering::Relaxed);
            }
        });
        log::info!("Capturing live audio; press Enter to stop");
    }

    let summary = scheduler
        .run(capture, &mut visualizer, sinks)
        .context("Visualizer run failed")?;

    log::info!(
        "Done! {} frames, {} beats, {} overruns",
        summary.frames,
        summary.beats,
        summary.overruns
    );
    if let Some(output) = &cli.output {
        log::info!("Output: {}", output.display());
    }
    Ok(())
}
