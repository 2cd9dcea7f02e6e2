/*!
Configuration management for the frame grabber application.
*/

use anyhow::{Context, Result};
use cameralink::stream::StreamFormat;
use cameralink::{FrameGenerator, Grabber, MembershipRule, RoiEngine, Window};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub grabber: GrabberConfig,
    pub pattern: PatternConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            grabber: GrabberConfig::default(),
            pattern: PatternConfig::default(),
            capture: CaptureConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Grabber core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrabberConfig {
    /// Width of the x/y coordinate counters in bits
    pub coordinate_width: u32,

    /// ROI engines, one per entry
    #[serde(default, rename = "roi")]
    pub rois: Vec<RoiConfig>,
}

impl GrabberConfig {
    /// Build a grabber with one engine per configured ROI
    pub fn build(&self) -> Result<Grabber> {
        let engines = self
            .rois
            .iter()
            .map(|roi| roi.build(self.coordinate_width))
            .collect::<Result<Vec<_>>>()?;

        Grabber::with_engines(self.coordinate_width, engines)
            .with_context(|| format!("Invalid grabber configuration ({}-bit coordinates)", self.coordinate_width))
    }

    /// Engine names in engine order
    pub fn names(&self) -> Vec<String> {
        self.rois.iter().map(|roi| roi.name.clone()).collect()
    }

    /// Replace the ROI list with command-line windows
    pub fn override_windows(&mut self, windows: &[Window], shift: u32, rule: MembershipRule) {
        self.rois = windows
            .iter()
            .enumerate()
            .map(|(i, &window)| RoiConfig::new(format!("roi{}", i), window, shift, rule))
            .collect();
    }
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            coordinate_width: 12,
            rois: vec![
                RoiConfig::new("frame", Window::new(0, 4095, 0, 4095), 0, MembershipRule::Latched),
                RoiConfig::new("center", Window::new(10, 20, 5, 15), 0, MembershipRule::Latched),
            ],
        }
    }
}

/// One ROI engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    /// Label used in reports
    pub name: String,

    /// Window bounds, half-open
    pub x0: u32,
    pub x1: u32,
    pub y0: u32,
    pub y1: u32,

    /// Right shift applied to each pixel value before summing
    #[serde(default)]
    pub shift: u32,

    /// Window membership rule
    #[serde(default)]
    pub rule: MembershipRule,
}

impl RoiConfig {
    pub fn new(name: impl Into<String>, window: Window, shift: u32, rule: MembershipRule) -> Self {
        Self {
            name: name.into(),
            x0: window.x0,
            x1: window.x1,
            y0: window.y0,
            y1: window.y1,
            shift,
            rule,
        }
    }

    pub fn window(&self) -> Window {
        Window::new(self.x0, self.x1, self.y0, self.y1)
    }

    fn build(&self, coordinate_width: u32) -> Result<RoiEngine> {
        let engine = RoiEngine::new(coordinate_width, self.shift)
            .with_context(|| format!("Invalid ROI \"{}\"", self.name))?;
        Ok(engine.with_window(self.window()).with_rule(self.rule))
    }
}

/// Test pattern configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Pixels per line
    pub width: usize,

    /// Lines per frame
    pub height: usize,

    /// Blank words before each line
    pub hblank: usize,

    /// Blank lines before each frame
    pub vblank: usize,

    /// Frames to generate
    pub frames: usize,
}

impl PatternConfig {
    pub fn generator(&self) -> FrameGenerator {
        FrameGenerator::new(self.hblank, self.vblank)
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        let generator = FrameGenerator::default();
        Self {
            width: 30,
            height: 20,
            hblank: generator.hblank,
            vblank: generator.vblank,
            frames: 1,
        }
    }
}

/// UDP capture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// UDP bind address
    pub udp_bind_addr: String,

    /// UDP port to listen on
    pub udp_port: u16,

    /// Output directory for result files
    pub output_directory: String,

    /// Channel buffer size for UDP data
    pub channel_buffer_size: usize,

    /// Enable result file storage
    pub enable_storage: bool,

    /// Byte layout of received datagrams
    #[serde(default)]
    pub stream_format: StreamFormat,

    /// Statistics reporting interval in seconds
    pub stats_interval_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            udp_bind_addr: "0.0.0.0".to_string(),
            udp_port: 12345,
            output_directory: "./results".to_string(),
            channel_buffer_size: 10000,
            enable_storage: true,
            stream_format: StreamFormat::Words,
            stats_interval_seconds: 10,
        }
    }
}
