use anyhow::{Context, Result};
use facelive_vision::CaptureSettings;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::liveness::Thresholds;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("FACELIVE_CONFIG_PATH").unwrap_or("/usr/local/etc/facelive/config.toml"),
    )
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: String,
    pub model: PathBuf,
    pub model_input_size: u32,
    pub output_dir: Option<PathBuf>,
    pub display: DisplayConfig,
    pub liveness: LivenessConfig,
    pub capture: CaptureConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: "/dev/video0".to_string(),
            model: PathBuf::from("/usr/local/share/facelive/face_geometry.onnx"),
            model_input_size: 256,
            output_dir: None,
            display: DisplayConfig::default(),
            liveness: LivenessConfig::default(),
            capture: CaptureConfig::default(),
        }
    }
}

/// On-screen rectangle the camera preview is cover-fit into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: f64,
    pub height: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 400.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub turn_yaw_deg: f32,
    pub straight_yaw_deg: f32,
    pub straight_pitch_min_deg: f32,
    pub straight_pitch_max_deg: f32,
    pub hold_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self {
            turn_yaw_deg: t.turn_yaw,
            straight_yaw_deg: t.straight_yaw,
            straight_pitch_min_deg: t.straight_pitch_min,
            straight_pitch_max_deg: t.straight_pitch_max,
            hold_ms: t.hold_ms,
        }
    }
}

impl LivenessConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            turn_yaw: self.turn_yaw_deg,
            straight_yaw: self.straight_yaw_deg,
            straight_pitch_min: self.straight_pitch_min_deg,
            straight_pitch_max: self.straight_pitch_max_deg,
            hold_ms: self.hold_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub guide_width: f64,
    pub guide_height: f64,
    pub padding: f64,
    pub min_output_width: u32,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let s = CaptureSettings::default();
        Self {
            guide_width: s.guide_width,
            guide_height: s.guide_height,
            padding: s.padding,
            min_output_width: s.min_output_width,
            jpeg_quality: s.jpeg_quality,
        }
    }
}

impl CaptureConfig {
    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            guide_width: self.guide_width,
            guide_height: self.guide_height,
            padding: self.padding,
            min_output_width: self.min_output_width,
            jpeg_quality: self.jpeg_quality,
        }
    }
}

impl Config {
    /// Reject values that would make the controller meaningless.
    pub fn validate(&self) -> Result<()> {
        let l = &self.liveness;
        if l.straight_pitch_min_deg > l.straight_pitch_max_deg {
            anyhow::bail!(
                "liveness.straight_pitch_min_deg ({}) exceeds straight_pitch_max_deg ({})",
                l.straight_pitch_min_deg,
                l.straight_pitch_max_deg
            );
        }
        if l.turn_yaw_deg < 0.0 || l.straight_yaw_deg < 0.0 {
            anyhow::bail!("liveness yaw thresholds must be non-negative");
        }
        let c = &self.capture;
        if c.guide_width <= 0.0 || c.guide_height <= 0.0 || c.padding <= 0.0 {
            anyhow::bail!("capture guide size and padding must be positive");
        }
        if !(1..=100).contains(&c.jpeg_quality) {
            anyhow::bail!("capture.jpeg_quality must be within 1..=100");
        }
        if self.display.width <= 0.0 || self.display.height <= 0.0 {
            anyhow::bail!("display size must be positive");
        }
        Ok(())
    }

    /// Where finished capture sessions are written.
    pub fn output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("", "", "facelive")
            .map(|dirs| dirs.data_dir().join("captures"))
            .unwrap_or_else(|| PathBuf::from("captures"))
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
