/*!
# Frame Grabber Application

Camera Link ROI frame grabber. Wire words (one per pixel clock) are run
through a stream parser and a bank of ROI engines; every completed window
sum is acknowledged and reported as a JSON line on stdout.

## Features

- Test pattern simulation with configurable frame size and blanking
- Recording of generated frames as wire word or serializer vector files
- Replay of recorded word streams
- Live UDP word capture with timestamped result sessions
- TOML configuration with one table per ROI engine

## Usage

### Simulate the ramp test pattern
```bash
framegrabber simulate --width 3 --height 4 --roi 0..1,0..3 --roi 0..10,0..10
```

### Record and replay
```bash
framegrabber record --output frame.clw --frames 2
framegrabber replay frame.clw --roi 5..10,5..10
```

### Live capture
```bash
framegrabber capture --port 12345 --output-dir ./results
```
*/

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

mod capture;
mod config;
mod output;

use cameralink::pattern::ramp;
use cameralink::stream::{read_words, write_words, StreamFormat};
use cameralink::{AckConsumer, MembershipRule, Window};
use capture::WordCapture;
use config::AppConfig;
use output::ResultSink;

#[derive(Parser)]
#[command(name = "framegrabber")]
#[command(about = "Camera Link ROI frame grabber: simulation, replay and UDP capture")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "framegrabber.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// ROI overrides shared by the processing commands
#[derive(Args, Debug, Clone)]
struct RoiArgs {
    /// ROI window "x0..x1,y0..y1" (repeatable, replaces configured ROIs)
    #[arg(long = "roi")]
    windows: Vec<Window>,

    /// Right shift applied to pixel values of command-line ROIs
    #[arg(long, default_value_t = 0)]
    shift: u32,

    /// Window membership rule of command-line ROIs (latched or comparator)
    #[arg(long, default_value = "latched")]
    rule: MembershipRule,
}

/// Test pattern overrides
#[derive(Args, Debug, Clone)]
struct PatternArgs {
    /// Pixels per line
    #[arg(long)]
    width: Option<usize>,

    /// Lines per frame
    #[arg(long)]
    height: Option<usize>,

    /// Number of frames
    #[arg(long)]
    frames: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run generated test frames through the grabber
    Simulate {
        #[command(flatten)]
        pattern: PatternArgs,

        #[command(flatten)]
        rois: RoiArgs,
    },

    /// Write generated test frames to a stream file
    Record {
        /// Output stream file
        #[arg(short, long)]
        output: PathBuf,

        /// Stream layout (words or serializer)
        #[arg(long, default_value = "words")]
        format: StreamFormat,

        #[command(flatten)]
        pattern: PatternArgs,
    },

    /// Run a recorded stream file through the grabber
    Replay {
        /// Input stream file
        input: PathBuf,

        /// Stream layout (words or serializer)
        #[arg(long, default_value = "words")]
        format: StreamFormat,

        #[command(flatten)]
        rois: RoiArgs,
    },

    /// Capture wire words over UDP
    Capture {
        /// UDP bind address
        #[arg(short, long)]
        bind_addr: Option<String>,

        /// UDP port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Output directory for result sessions
        #[arg(short, long)]
        output_dir: Option<String>,

        /// Do not store results, only print them
        #[arg(long)]
        no_storage: bool,

        /// Datagram layout (words or serializer)
        #[arg(long)]
        format: Option<StreamFormat>,

        #[command(flatten)]
        rois: RoiArgs,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "framegrabber.toml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging goes to stderr to keep stdout clean for result lines
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .init();

    match cli.command {
        Some(Commands::Simulate { pattern, rois }) => {
            let mut config = load_config(&cli.config);
            apply_pattern(&mut config, &pattern);
            apply_rois(&mut config, &rois);
            run_simulation(&config)
        }

        Some(Commands::Record { output, format, pattern }) => {
            let mut config = load_config(&cli.config);
            apply_pattern(&mut config, &pattern);
            record_pattern(&config, &output, format)
        }

        Some(Commands::Replay { input, format, rois }) => {
            let mut config = load_config(&cli.config);
            apply_rois(&mut config, &rois);
            run_replay(&config, &input, format)
        }

        Some(Commands::Capture { bind_addr, port, output_dir, no_storage, format, rois }) => {
            let mut config = load_config(&cli.config);
            if let Some(bind_addr) = bind_addr {
                config.capture.udp_bind_addr = bind_addr;
            }
            if let Some(port) = port {
                config.capture.udp_port = port;
            }
            if let Some(output_dir) = output_dir {
                config.capture.output_directory = output_dir;
            }
            if no_storage {
                config.capture.enable_storage = false;
            }
            if let Some(format) = format {
                config.capture.stream_format = format;
            }
            apply_rois(&mut config, &rois);
            run_capture(config)
        }

        Some(Commands::Config { output }) => generate_config_file(output),

        None => {
            let config = AppConfig::load_from_file(&cli.config)?;
            info!("🚀 Starting capture from config: {}", cli.config.display());
            run_capture(config)
        }
    }
}

/// Load the configuration file, falling back to defaults
fn load_config(path: &Path) -> AppConfig {
    if !path.exists() {
        return AppConfig::new();
    }
    AppConfig::load_from_file(path).unwrap_or_else(|e| {
        warn!("⚠️ Failed to load config ({:#}), using defaults", e);
        AppConfig::new()
    })
}

fn apply_pattern(config: &mut AppConfig, args: &PatternArgs) {
    if let Some(width) = args.width {
        config.pattern.width = width;
    }
    if let Some(height) = args.height {
        config.pattern.height = height;
    }
    if let Some(frames) = args.frames {
        config.pattern.frames = frames;
    }
}

fn apply_rois(config: &mut AppConfig, args: &RoiArgs) {
    if !args.windows.is_empty() {
        config.grabber.override_windows(&args.windows, args.shift, args.rule);
    }
}

/// Run the ramp pattern through the grabber
fn run_simulation(config: &AppConfig) -> Result<()> {
    let mut grabber = config.grabber.build()?;
    let pattern = &config.pattern;
    let limit = 1usize << config.grabber.coordinate_width;
    if pattern.width + pattern.hblank > limit || pattern.height > limit {
        warn!(
            "⚠️ {}x{} frame exceeds {}-bit coordinates; positions will wrap",
            pattern.width, pattern.height, config.grabber.coordinate_width
        );
    }

    info!(
        "🧪 Simulating {} frame(s) of {}x{} ramp pattern with {} ROI engine(s)",
        pattern.frames, pattern.width, pattern.height, grabber.len()
    );

    let rows = ramp(pattern.width, pattern.height);
    let generator = pattern.generator();
    let mut consumer = AckConsumer::new(grabber.len());
    let mut sink = ResultSink::new(config.grabber.names(), true);

    for _ in 0..pattern.frames {
        for word in generator.gen_frame(&rows) {
            let completed = consumer.tick(&mut grabber, word)?;
            sink.write(&completed)?;
        }
    }
    let completed = consumer.flush(&mut grabber)?;
    sink.write(&completed)?;
    sink.finish()?;

    info!("✅ Simulation completed: {} cycles, {} results", grabber.cycles(), sink.written());
    Ok(())
}

/// Write generated frames to a stream file
fn record_pattern(config: &AppConfig, output: &Path, format: StreamFormat) -> Result<()> {
    let pattern = &config.pattern;
    let rows = ramp(pattern.width, pattern.height);
    let generator = pattern.generator();
    let words = (0..pattern.frames).flat_map(|_| generator.gen_frame(&rows));

    let written = write_words(output, words, format)
        .with_context(|| format!("Failed to write stream file: {}", output.display()))?;

    info!(
        "✅ Recorded {} frame(s) to {} ({} words, {} bytes, {} layout)",
        pattern.frames,
        output.display(),
        written / format.word_bytes(),
        written,
        format
    );
    Ok(())
}

/// Run a recorded stream through the grabber
fn run_replay(config: &AppConfig, input: &Path, format: StreamFormat) -> Result<()> {
    let words = read_words(input, format)
        .with_context(|| format!("Failed to read stream file: {}", input.display()))?;
    info!("📂 Replaying {} words from {}", words.len(), input.display());

    let mut grabber = config.grabber.build()?;
    let mut consumer = AckConsumer::new(grabber.len());
    let mut sink = ResultSink::new(config.grabber.names(), true);

    let completed = consumer.drive(&mut grabber, words)?;
    sink.write(&completed)?;
    sink.finish()?;

    info!("✅ Replay completed: {} cycles, {} results", grabber.cycles(), sink.written());
    Ok(())
}

/// Capture over UDP until Ctrl+C
fn run_capture(config: AppConfig) -> Result<()> {
    info!("🚀 Starting word capture");
    info!("📡 Bind address: {}", config.capture.udp_bind_addr);
    info!("🔌 Port: {}", config.capture.udp_port);
    if config.capture.enable_storage {
        info!("💾 Output directory: {}", config.capture.output_directory);
    }

    let mut capture = WordCapture::new(config.capture, config.grabber);

    let running = capture.get_running_flag();
    ctrlc::set_handler(move || {
        info!("🛑 Received Ctrl+C, shutting down gracefully...");
        running.store(false, Ordering::SeqCst);
    })?;

    let stats = capture.start().context("Word capture failed")?;

    info!("✅ Capture completed: {} words, {} results", stats.words, stats.completions);
    Ok(())
}

/// Generate a default configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::new();
    config.save_to_file(&output_path)?;

    info!("✅ Generated configuration file: {}", output_path.display());
    info!("📝 Edit the file to customize settings, then run:");
    info!("   framegrabber --config {}", output_path.display());

    Ok(())
}
