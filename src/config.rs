use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 30;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_BOX_COLOR: &str = "#00FF00";
const DEFAULT_TEXT_COLOR: &str = "#000000";
const DEFAULT_LINE_WIDTH: u32 = 2;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    detection: Option<DetectionConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    min_confidence: Option<f32>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    box_color: Option<String>,
    text_color: Option<String>,
    line_width: Option<u32>,
}

/// Runtime configuration: defaults, then the optional config file named by
/// `LIVEDETECT_CONFIG`, then environment overrides.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub source: SourceSettings,
    pub detector: DetectorSettings,
    pub detection: LoopSettings,
    pub overlay: OverlaySettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// `stub://<name>` for the synthetic pattern, `/dev/videoN` for V4L2,
    /// anything else is read as a still image file.
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub min_confidence: f32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            model_path: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Fixed tick cadence.
    pub interval: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlaySettings {
    pub box_color: [u8; 4],
    pub text_color: [u8; 4],
    pub line_width: u32,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            box_color: [0x00, 0xFF, 0x00, 0xFF],
            text_color: [0x00, 0x00, 0x00, 0xFF],
            line_width: DEFAULT_LINE_WIDTH,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LIVEDETECT_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load with an explicit config path (the CLI flag wins over the env var).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let source = file.source.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();

        let source = SourceSettings {
            url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source.target_fps.unwrap_or(DEFAULT_SOURCE_FPS),
            width: source.width.unwrap_or(DEFAULT_SOURCE_WIDTH),
            height: source.height.unwrap_or(DEFAULT_SOURCE_HEIGHT),
        };
        let detector = DetectorSettings {
            backend: detector
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector.model_path,
            min_confidence: detector.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            input_width: detector.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: detector.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
        };
        let detection = LoopSettings {
            interval: Duration::from_millis(detection.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS)),
        };
        let overlay = OverlaySettings {
            box_color: parse_hex_color(overlay.box_color.as_deref().unwrap_or(DEFAULT_BOX_COLOR))?,
            text_color: parse_hex_color(
                overlay.text_color.as_deref().unwrap_or(DEFAULT_TEXT_COLOR),
            )?,
            line_width: overlay.line_width.unwrap_or(DEFAULT_LINE_WIDTH),
        };
        Ok(Self {
            source,
            detector,
            detection,
            overlay,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("LIVEDETECT_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(backend) = std::env::var("LIVEDETECT_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_lowercase();
            }
        }
        if let Ok(path) = std::env::var("LIVEDETECT_MODEL") {
            if !path.trim().is_empty() {
                self.detector.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("LIVEDETECT_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("LIVEDETECT_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.detection.interval = Duration::from_millis(millis);
        }
        if let Ok(threshold) = std::env::var("LIVEDETECT_MIN_CONFIDENCE") {
            self.detector.min_confidence = threshold
                .parse()
                .map_err(|_| anyhow!("LIVEDETECT_MIN_CONFIDENCE must be a number"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source url must not be empty"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be >= 1"));
        }
        if self.detection.interval.is_zero() {
            return Err(anyhow!("detection interval must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.min_confidence) {
            return Err(anyhow!(
                "detector min_confidence must be within [0, 1], got {}",
                self.detector.min_confidence
            ));
        }
        if self.detector.input_width == 0 || self.detector.input_height == 0 {
            return Err(anyhow!("detector input dimensions must be non-zero"));
        }
        if self.overlay.line_width == 0 {
            return Err(anyhow!("overlay line_width must be >= 1"));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings {
                url: DEFAULT_SOURCE_URL.to_string(),
                target_fps: DEFAULT_SOURCE_FPS,
                width: DEFAULT_SOURCE_WIDTH,
                height: DEFAULT_SOURCE_HEIGHT,
            },
            detector: DetectorSettings::default(),
            detection: LoopSettings::default(),
            overlay: OverlaySettings::default(),
        }
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Parse `#RRGGBB` or `#RRGGBBAA` into RGBA.
pub fn parse_hex_color(value: &str) -> Result<[u8; 4]> {
    let hex = value.trim().trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid colour '{}': expected #RRGGBB or #RRGGBBAA", value));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);
    let alpha = if hex.len() == 8 { channel(6)? } else { 0xFF };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}
