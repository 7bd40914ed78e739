use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on regions; each one owns a worker thread and a capture handle.
pub const MAX_DIVISIONS: u32 = 64;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingConfig,
    pub detector: DetectorConfig,
    pub regions: RegionsConfig,
    pub worker: WorkerConfig,
    pub render: RenderConfig,
    pub session: SessionConfig,
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    pub backend: String,
    pub model_path: PathBuf,
    pub models_folder: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    #[serde(default)]
    pub labels_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegionsConfig {
    pub divisions: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Minimum time between two detection passes of one worker, 0 = unthrottled.
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    pub frame_interval_ms: u64,
    pub display_width: u32,
    pub display_height: u32,
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval_ms: u64,
    pub box_thickness: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub stop_timeout_ms: u64,
    pub summary_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    pub keyword: String,
    pub resolver: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "compact".to_string(),
                filter: "regionscope=info".to_string(),
            },
            detector: DetectorConfig {
                backend: "tract".to_string(),
                model_path: PathBuf::from("yolov8n.onnx"),
                models_folder: PathBuf::from("models"),
                confidence_threshold: 0.5,
                iou_threshold: 0.45,
                input_size: 640,
                labels_path: None,
            },
            regions: RegionsConfig { divisions: 4 },
            worker: WorkerConfig { min_interval_ms: 0 },
            render: RenderConfig {
                frame_interval_ms: 33,
                display_width: 1200,
                display_height: 800,
                snapshot_path: None,
                snapshot_interval_ms: 1000,
                box_thickness: 2,
            },
            session: SessionConfig {
                stop_timeout_ms: 2000,
                summary_interval_ms: 2000,
            },
            window: WindowConfig {
                keyword: "Chrome".to_string(),
                resolver: "auto".to_string(),
            },
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (if present), then `REGIONSCOPE_*` variables.
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("REGIONSCOPE_").split("__"));

        figment
            .extract()
            .with_context(|| format!("Failed to load configuration from {:?}", config_path))
    }

    /// Checked once every layer, command-line overrides included, has been applied.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => anyhow::bail!("Invalid log format: {}", self.logging.format),
        }

        match self.detector.backend.as_str() {
            "tract" | "dry-run" => {}
            _ => anyhow::bail!("Unknown detector backend: {}", self.detector.backend),
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            anyhow::bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.detector.confidence_threshold
            );
        }

        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            anyhow::bail!(
                "iou_threshold must be within [0, 1], got {}",
                self.detector.iou_threshold
            );
        }

        if self.detector.input_size == 0 {
            anyhow::bail!("input_size must be greater than 0");
        }

        if self.regions.divisions == 0 {
            anyhow::bail!("divisions must be greater than 0");
        }

        if self.regions.divisions > MAX_DIVISIONS {
            anyhow::bail!(
                "divisions must be at most {}, got {}",
                MAX_DIVISIONS,
                self.regions.divisions
            );
        }

        if self.render.frame_interval_ms == 0 {
            anyhow::bail!("frame_interval_ms must be greater than 0");
        }

        if self.session.stop_timeout_ms == 0 {
            anyhow::bail!("stop_timeout_ms must be greater than 0");
        }

        match self.window.resolver.as_str() {
            "auto" | "xdotool" | "wmctrl" => {}
            _ => anyhow::bail!("Unknown window resolver: {}", self.window.resolver),
        }

        if self.window.keyword.trim().is_empty() {
            anyhow::bail!("Window keyword must not be empty");
        }

        Ok(())
    }

    pub fn is_dry_run_detector(&self) -> bool {
        self.detector.backend == "dry-run"
    }
}
