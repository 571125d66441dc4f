//! Planner configuration stored as TOML (default `planner.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{METRIC_NAMES, RayParams};
use crate::core::utility::UtilityWeights;

pub const DEFAULT_CONFIG_FILE: &str = "planner.toml";

/// Planner configuration (TOML).
///
/// Every field is optional. Missing fields take the defaults below; missing
/// metric weights resolve to zero (see [`PlannerConfig::utility_weights`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Directory for `planning_data*.data` files. Defaults to the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<PathBuf>,

    /// Weight of the movement cost term in the return.
    pub cost_weight: f64,

    /// Stop after this many planning rounds. Unset means run until stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    /// Per-metric settings keyed by metric name.
    pub information_metric: BTreeMap<String, MetricConfig>,

    pub ray: RayParams,

    pub timing: TimingConfig,

    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricConfig {
    pub weight: f64,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self { weight: 0.0 }
    }
}

/// Polling intervals, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval while waiting for START, the view space and the start view.
    pub startup_poll_ms: u64,
    /// Delay between data retrieval attempts.
    pub retrieve_retry_ms: u64,
    /// Delay between move attempts.
    pub move_retry_ms: u64,
    /// Interval between command checks while paused.
    pub pause_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            startup_poll_ms: 500,
            retrieve_retry_ms: 500,
            move_retry_ms: 500,
            pause_poll_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn startup_poll(&self) -> Duration {
        Duration::from_millis(self.startup_poll_ms)
    }

    pub fn retrieve_retry(&self) -> Duration {
        Duration::from_millis(self.retrieve_retry_ms)
    }

    pub fn move_retry(&self) -> Duration {
        Duration::from_millis(self.move_retry_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }
}

/// External commands implementing each service (argv, e.g. `["robot-bridge", "cost"]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServicesConfig {
    pub view_space: Vec<String>,
    pub current_view: Vec<String>,
    pub retrieve_data: Vec<String>,
    pub movement_cost: Vec<String>,
    pub move_to: Vec<String>,
    pub information: Vec<String>,
    /// Wall-clock limit for a single service call.
    pub call_timeout_secs: u64,
    /// Truncate captured service stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            view_space: Vec::new(),
            current_view: Vec::new(),
            retrieve_data: Vec::new(),
            movement_cost: Vec::new(),
            move_to: Vec::new(),
            information: Vec::new(),
            call_timeout_secs: 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl ServicesConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Require a command for every service; needed before `planner run`.
    pub fn require_commands(&self) -> Result<()> {
        let commands = [
            ("view_space", &self.view_space),
            ("current_view", &self.current_view),
            ("retrieve_data", &self.retrieve_data),
            ("movement_cost", &self.movement_cost),
            ("move_to", &self.move_to),
            ("information", &self.information),
        ];
        let missing: Vec<&str> = commands
            .iter()
            .filter(|(_, argv)| argv.first().is_none_or(|program| program.trim().is_empty()))
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(anyhow!(
                "services.{} must be a non-empty array",
                missing.join(", services.")
            ));
        }
        Ok(())
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            data_folder: None,
            cost_weight: 1.0,
            max_iterations: None,
            information_metric: BTreeMap::new(),
            ray: RayParams::default(),
            timing: TimingConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Default config with an explicit zero weight for every metric, written by
    /// `planner init` so every tunable is visible in the file.
    pub fn template() -> Self {
        Self {
            information_metric: METRIC_NAMES
                .iter()
                .map(|name| (name.to_string(), MetricConfig::default()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cost_weight.is_finite() || self.cost_weight < 0.0 {
            return Err(anyhow!("cost_weight must be finite and >= 0"));
        }
        if self.max_iterations == Some(0) {
            return Err(anyhow!("max_iterations must be > 0 when set"));
        }
        for (name, metric) in &self.information_metric {
            if !METRIC_NAMES.contains(&name.as_str()) {
                return Err(anyhow!(
                    "unknown information metric '{name}' (expected one of {})",
                    METRIC_NAMES.join(", ")
                ));
            }
            if !metric.weight.is_finite() {
                return Err(anyhow!("information_metric.{name}.weight must be finite"));
            }
        }
        let ray = &self.ray;
        if ray.resolution_x <= 0.0 || ray.resolution_y <= 0.0 {
            return Err(anyhow!("ray resolutions must be > 0"));
        }
        if ray.step_size == 0 {
            return Err(anyhow!("ray.step_size must be > 0"));
        }
        if ray.min_x >= ray.max_x || ray.min_y >= ray.max_y {
            return Err(anyhow!("ray subwindow bounds must satisfy min < max"));
        }
        if ray.min_depth < 0.0 || ray.min_depth >= ray.max_depth {
            return Err(anyhow!("ray depth bounds must satisfy 0 <= min_depth < max_depth"));
        }
        if self.services.call_timeout_secs == 0 {
            return Err(anyhow!("services.call_timeout_secs must be > 0"));
        }
        if self.services.output_limit_bytes == 0 {
            return Err(anyhow!("services.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Output directory for planning data.
    pub fn data_dir(&self) -> PathBuf {
        self.data_folder
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Metric names in request order.
    pub fn metric_names(&self) -> Vec<String> {
        METRIC_NAMES.iter().map(|name| name.to_string()).collect()
    }

    /// Resolve weights in metric order.
    ///
    /// Returns the weights and the names of metrics that had no configured
    /// weight; those contribute zero.
    pub fn utility_weights(&self) -> (UtilityWeights, Vec<&'static str>) {
        let mut missing = Vec::new();
        let information = METRIC_NAMES
            .iter()
            .map(|name| match self.information_metric.get(*name) {
                Some(metric) => metric.weight,
                None => {
                    missing.push(*name);
                    0.0
                }
            })
            .collect();
        (
            UtilityWeights {
                cost: self.cost_weight,
                information,
            },
            missing,
        )
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PlannerConfig::default()`.
pub fn load_config(path: &Path) -> Result<PlannerConfig> {
    if !path.exists() {
        let cfg = PlannerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PlannerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PlannerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PlannerConfig::default());
        assert_eq!(cfg.cost_weight, 1.0);
        assert_eq!(cfg.data_dir(), PathBuf::from("."));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planner.toml");
        let mut cfg = PlannerConfig::template();
        cfg.data_folder = Some(temp.path().join("data"));
        cfg.max_iterations = Some(12);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("planner.toml");
        fs::write(
            &path,
            "cost_weight = 0.5\n\n[information_metric.ClassicFrontier]\nweight = 2.0\n",
        )
        .expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.cost_weight, 0.5);
        assert_eq!(cfg.ray, RayParams::default());
        assert_eq!(cfg.timing, TimingConfig::default());

        let (weights, missing) = cfg.utility_weights();
        assert_eq!(weights.cost, 0.5);
        assert_eq!(weights.information.len(), METRIC_NAMES.len());
        assert_eq!(weights.information[5], 2.0);
        assert_eq!(missing.len(), METRIC_NAMES.len() - 1);
        assert!(!missing.contains(&"ClassicFrontier"));
    }

    #[test]
    fn rejects_unknown_metric() {
        let mut cfg = PlannerConfig::default();
        cfg.information_metric
            .insert("Entropy".to_string(), MetricConfig { weight: 1.0 });
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("unknown information metric"));
    }

    #[test]
    fn rejects_negative_cost_weight() {
        let cfg = PlannerConfig {
            cost_weight: -1.0,
            ..PlannerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_depth_bounds() {
        let mut cfg = PlannerConfig::default();
        cfg.ray.min_depth = 2.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn require_commands_lists_missing_services() {
        let mut services = ServicesConfig::default();
        services.view_space = vec!["bridge".to_string(), "view-space".to_string()];
        let err = services.require_commands().unwrap_err().to_string();
        assert!(err.contains("services.current_view"));
        assert!(!err.contains("services.view_space"));
    }
}
