use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::aggregate::HistorySettings;
use crate::detect::{MetricWeights, ReferenceSettings};
use crate::engine::EngineConfig;
use crate::ingest::SourceConfig;
use crate::tuning::Sensitivity;

#[derive(Debug, Deserialize, Default)]
struct ParkingConfigFile {
    source: Option<SourceConfigFile>,
    regions_path: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    metric: Option<MetricConfigFile>,
    reference: Option<ReferenceConfigFile>,
    history: Option<HistoryConfigFile>,
    report_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    fps: Option<u32>,
    blur: Option<bool>,
    start_frame: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    sensitivity: Option<f64>,
    detect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MetricConfigFile {
    texture_weight: Option<f64>,
    diff_weight: Option<f64>,
    diff_threshold: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct ReferenceConfigFile {
    discard_frames: Option<u32>,
    collect_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    interval_ms: Option<u64>,
    capacity: Option<usize>,
}

/// Command-line values. They win over the file and the environment and are
/// validated with them.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_url: Option<String>,
    pub regions_path: Option<PathBuf>,
    pub sensitivity: Option<f64>,
    pub start_frame: Option<u64>,
    pub report_path: Option<PathBuf>,
}

/// Daemon configuration: defaults, then the optional file named by
/// `PARKING_CONFIG`, then `PARKING_*` environment overrides.
#[derive(Debug, Clone)]
pub struct ParkingConfig {
    pub source: SourceConfig,
    pub regions_path: Option<PathBuf>,
    pub engine: EngineConfig,
    pub report_path: Option<PathBuf>,
    /// Sensitivity as configured, before clamping.
    requested_sensitivity: f64,
}

impl ParkingConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PARKING_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Like `load`, but with an explicit config file in place of
    /// `PARKING_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, &ConfigOverrides::default())
    }

    /// Full layering: defaults, file, environment, then `overrides`, with
    /// validation last.
    pub fn load_with(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ParkingConfigFile) -> Self {
        let defaults = EngineConfig::default();
        let source_defaults = SourceConfig::default();

        let source = file.source.unwrap_or_default();
        let source = SourceConfig {
            url: source.url.unwrap_or(source_defaults.url),
            fps: source.fps.unwrap_or(source_defaults.fps),
            blur: source.blur.unwrap_or(source_defaults.blur),
            start_frame: source.start_frame.unwrap_or(source_defaults.start_frame),
        };

        let detector = file.detector.unwrap_or_default();
        let requested_sensitivity = detector
            .sensitivity
            .unwrap_or(defaults.sensitivity.value());
        let detect_delay = detector
            .detect_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.detect_delay);

        let metric = file.metric.unwrap_or_default();
        let metric = MetricWeights {
            texture_weight: metric
                .texture_weight
                .unwrap_or(defaults.metric.texture_weight),
            diff_weight: metric.diff_weight.unwrap_or(defaults.metric.diff_weight),
            diff_threshold: metric
                .diff_threshold
                .unwrap_or(defaults.metric.diff_threshold),
        };

        let reference = file.reference.unwrap_or_default();
        let reference = ReferenceSettings {
            discard_frames: reference
                .discard_frames
                .unwrap_or(defaults.reference.discard_frames),
            collect_frames: reference
                .collect_frames
                .unwrap_or(defaults.reference.collect_frames),
        };

        let history = file.history.unwrap_or_default();
        let history = HistorySettings {
            interval: history
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.history.interval),
            capacity: history.capacity.or(defaults.history.capacity),
        };

        Self {
            source,
            regions_path: file.regions_path,
            engine: EngineConfig {
                sensitivity: Sensitivity::new(requested_sensitivity),
                detect_delay,
                metric,
                reference,
                history,
            },
            report_path: file.report_path,
            requested_sensitivity,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("PARKING_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(path) = std::env::var("PARKING_REGIONS") {
            if !path.trim().is_empty() {
                self.regions_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("PARKING_REPORT_PATH") {
            if !path.trim().is_empty() {
                self.report_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(value) = std::env::var("PARKING_SENSITIVITY") {
            self.requested_sensitivity = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("PARKING_SENSITIVITY must be a number"))?;
        }
        if let Ok(value) = std::env::var("PARKING_DETECT_DELAY_MS") {
            let ms: u64 = value.trim().parse().map_err(|_| {
                anyhow!("PARKING_DETECT_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.engine.detect_delay = Duration::from_millis(ms);
        }
        if let Ok(value) = std::env::var("PARKING_START_FRAME") {
            self.source.start_frame = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("PARKING_START_FRAME must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.source_url {
            self.source.url = url.clone();
        }
        if let Some(path) = &overrides.regions_path {
            self.regions_path = Some(path.clone());
        }
        if let Some(value) = overrides.sensitivity {
            self.requested_sensitivity = value;
        }
        if let Some(frames) = overrides.start_frame {
            self.source.start_frame = frames;
        }
        if let Some(path) = &overrides.report_path {
            self.report_path = Some(path.clone());
        }
    }

    fn validate(&mut self) -> Result<()> {
        if !self.requested_sensitivity.is_finite() {
            return Err(anyhow!("sensitivity must be a finite number"));
        }
        if self.requested_sensitivity < Sensitivity::MIN {
            log::warn!(
                "sensitivity {} below minimum; clamped to {}",
                self.requested_sensitivity,
                Sensitivity::MIN
            );
        }
        self.engine.sensitivity = Sensitivity::new(self.requested_sensitivity);

        if self.source.fps == 0 {
            return Err(anyhow!("source fps must be greater than zero"));
        }
        let metric = &self.engine.metric;
        if !metric.texture_weight.is_finite() || !metric.diff_weight.is_finite() {
            return Err(anyhow!("metric weights must be finite numbers"));
        }
        if self.engine.history.capacity == Some(0) {
            return Err(anyhow!("history capacity must be greater than zero"));
        }
        if !self.source.is_synthetic() && self.regions_path.is_none() {
            return Err(anyhow!(
                "regions_path (or PARKING_REGIONS) is required for source '{}'",
                self.source.url
            ));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ParkingConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
