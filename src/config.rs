//! Configuration file support for the session tracker
//!
//! Reads from .ai_sessions/config.toml, then applies environment overrides.

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default storage directory name
pub const DEFAULT_STORAGE_DIR: &str = ".ai_sessions";

/// Config file name inside the storage directory
pub const CONFIG_FILE: &str = "config.toml";

pub const ENV_OUTPUT_DIR: &str = "AI_OUTPUT_DIR";
pub const ENV_MAX_SESSION_DURATION_HOURS: &str = "AI_MAX_SESSION_DURATION_HOURS";
pub const ENV_PROJECT_ID: &str = "AI_PROJECT_ID";
pub const ENV_DEVELOPER: &str = "AI_DEVELOPER";

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Cost constants for ROI math
    #[serde(default)]
    pub roi: RoiConfig,

    /// Default developer/project attribution
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Enumerated value sets
    #[serde(default)]
    pub vocabulary: Vocabulary,
}

/// Storage-related configuration
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct StorageConfig {
    /// Directory holding sessions.json, interactions.json and issues.json.
    /// Default: .ai_sessions in the current directory
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Session lifecycle configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    /// Sessions longer than this are clamped at close.
    /// Default: 4.0
    #[serde(default = "default_max_duration_hours")]
    pub max_duration_hours: f64,
}

fn default_max_duration_hours() -> f64 {
    4.0
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_duration_hours: default_max_duration_hours(),
        }
    }
}

impl SessionConfig {
    /// A usable cap is a finite number of hours above zero
    pub fn is_valid_max_duration(hours: f64) -> bool {
        hours.is_finite() && hours > 0.0
    }

    /// The cap as a duration. An unusable configured value falls back to
    /// the default so the cap is never zero or negative.
    pub fn max_duration(&self) -> chrono::Duration {
        let hours = if Self::is_valid_max_duration(self.max_duration_hours) {
            self.max_duration_hours
        } else {
            default_max_duration_hours()
        };
        chrono::Duration::milliseconds((hours * 3_600_000.0).round() as i64)
    }
}

/// Cost constants used by the statistics engine
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RoiConfig {
    /// Fully-burdened developer cost (USD/hour)
    #[serde(default = "default_human_hourly_rate")]
    pub human_hourly_rate: f64,

    /// Monthly AI subscription cost (USD)
    #[serde(default = "default_ai_monthly_cost")]
    pub ai_monthly_cost: f64,

    /// Hours the subscription is amortized over each month
    #[serde(default = "default_working_hours_per_month")]
    pub working_hours_per_month: f64,

    /// Share of AI session time a human spends supervising it
    #[serde(default = "default_oversight_ratio")]
    pub oversight_ratio: f64,
}

fn default_human_hourly_rate() -> f64 {
    130.0
}

fn default_ai_monthly_cost() -> f64 {
    40.0
}

fn default_working_hours_per_month() -> f64 {
    160.0
}

fn default_oversight_ratio() -> f64 {
    0.2
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            human_hourly_rate: default_human_hourly_rate(),
            ai_monthly_cost: default_ai_monthly_cost(),
            working_hours_per_month: default_working_hours_per_month(),
            oversight_ratio: default_oversight_ratio(),
        }
    }
}

impl RoiConfig {
    /// AI subscription cost per working hour
    pub fn ai_hourly_rate(&self) -> f64 {
        if self.working_hours_per_month > 0.0 {
            self.ai_monthly_cost / self.working_hours_per_month
        } else {
            0.0
        }
    }
}

/// Attribution defaults for new sessions
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct IdentityConfig {
    #[serde(default)]
    pub developer: Option<String>,

    #[serde(default)]
    pub project: Option<String>,
}

/// Enumerated value sets, injected into the tracker and statistics engine
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Vocabulary {
    #[serde(default = "default_task_types")]
    pub task_types: Vec<String>,

    /// Task types that carry no AI-assisted time and are left out of ROI
    #[serde(default = "default_non_productive_task_types")]
    pub non_productive_task_types: Vec<String>,

    #[serde(default = "default_severities")]
    pub severities: Vec<String>,

    #[serde(default = "default_estimate_sources")]
    pub estimate_sources: Vec<String>,

    /// Human effort buckets, 15 minutes to 80 hours
    #[serde(default = "default_estimate_buckets")]
    pub estimate_buckets_minutes: Vec<u32>,
}

fn default_task_types() -> Vec<String> {
    [
        "code_generation",
        "documentation",
        "debugging",
        "refactoring",
        "testing",
        "analysis",
        "architecture_planning",
        "human_review",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_non_productive_task_types() -> Vec<String> {
    vec!["human_review".to_string()]
}

fn default_severities() -> Vec<String> {
    ["low", "medium", "high", "critical"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_estimate_sources() -> Vec<String> {
    ["manual", "issue_tracker", "historical"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_estimate_buckets() -> Vec<u32> {
    vec![15, 30, 60, 120, 240, 480, 960, 2400, 4800]
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            task_types: default_task_types(),
            non_productive_task_types: default_non_productive_task_types(),
            severities: default_severities(),
            estimate_sources: default_estimate_sources(),
            estimate_buckets_minutes: default_estimate_buckets(),
        }
    }
}

impl Vocabulary {
    pub fn is_task_type(&self, task_type: &str) -> bool {
        self.task_types.iter().any(|t| t == task_type)
    }

    pub fn is_productive(&self, task_type: &str) -> bool {
        !self.non_productive_task_types.iter().any(|t| t == task_type)
    }

    pub fn is_severity(&self, severity: &str) -> bool {
        self.severities.iter().any(|s| s == severity)
    }

    pub fn is_estimate_source(&self, source: &str) -> bool {
        self.estimate_sources.iter().any(|s| s == source)
    }

    pub fn is_estimate_bucket(&self, minutes: f64) -> bool {
        self.estimate_buckets_minutes
            .iter()
            .any(|b| (f64::from(*b) - minutes).abs() < f64::EPSILON)
    }
}

impl Config {
    /// Load config from .ai_sessions/config.toml and apply env overrides.
    /// Returns default config if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let mut config = match Self::find_config_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Ignoring {}: {}", path.display(), e);
                Self::default()
            }),
            None => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Load config from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| TrackerError::Config(e.to_string()))?;
        if !SessionConfig::is_valid_max_duration(config.session.max_duration_hours) {
            return Err(TrackerError::Config(format!(
                "session.max_duration_hours must be a positive number, got {}",
                config.session.max_duration_hours
            )));
        }
        Ok(config)
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        if let Some(dir) = non_empty_env(ENV_OUTPUT_DIR) {
            let path = PathBuf::from(dir).join(CONFIG_FILE);
            return path.exists().then_some(path);
        }

        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(DEFAULT_STORAGE_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    /// Apply AI_* environment variable overrides
    pub fn apply_env(&mut self) {
        if let Some(dir) = non_empty_env(ENV_OUTPUT_DIR) {
            self.storage.dir = Some(PathBuf::from(dir));
        }
        if let Some(hours) = non_empty_env(ENV_MAX_SESSION_DURATION_HOURS) {
            match hours.parse::<f64>() {
                Ok(h) if SessionConfig::is_valid_max_duration(h) => {
                    self.session.max_duration_hours = h
                }
                _ => warn!(
                    "{} must be a positive number, got '{}'; keeping {}h",
                    ENV_MAX_SESSION_DURATION_HOURS, hours, self.session.max_duration_hours
                ),
            }
        }
        if let Some(project) = non_empty_env(ENV_PROJECT_ID) {
            self.identity.project = Some(project);
        }
        if let Some(developer) = non_empty_env(ENV_DEVELOPER) {
            self.identity.developer = Some(developer);
        }
    }

    /// Directory the record store writes to
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR))
    }

    /// Project name: configured value, else the current directory name
    pub fn project(&self) -> String {
        self.identity.project.clone().unwrap_or_else(|| {
            std::env::current_dir()
                .ok()
                .and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
                .unwrap_or_else(|| "unknown".to_string())
        })
    }

    /// Developer name: configured value, else $USER
    pub fn developer(&self) -> String {
        self.identity
            .developer
            .clone()
            .or_else(|| non_empty_env("USER"))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Read an env var, treating empty as unset
fn non_empty_env(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        Ok(_) => {
            warn!("{} is set but empty; falling back to default", name);
            None
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.max_duration_hours, 4.0);
        assert_eq!(config.roi.human_hourly_rate, 130.0);
        assert_eq!(config.roi.ai_hourly_rate(), 0.25);
        assert_eq!(config.storage_dir(), PathBuf::from(".ai_sessions"));
    }

    #[test]
    fn test_default_vocabulary() {
        let vocab = Vocabulary::default();
        assert!(vocab.is_task_type("code_generation"));
        assert!(!vocab.is_task_type("gardening"));
        assert!(!vocab.is_productive("human_review"));
        assert!(vocab.is_productive("debugging"));
        assert!(vocab.is_severity("critical"));
        assert!(vocab.is_estimate_source("issue_tracker"));
        assert!(vocab.is_estimate_bucket(4800.0));
        assert!(!vocab.is_estimate_bucket(45.0));
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[storage]
dir = "/tmp/sessions"

[session]
max_duration_hours = 8.0

[roi]
human_hourly_rate = 100.0

[vocabulary]
task_types = ["spike", "review"]
non_productive_task_types = ["review"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/sessions"));
        assert_eq!(config.session.max_duration_hours, 8.0);
        assert_eq!(config.roi.human_hourly_rate, 100.0);
        // Unspecified fields keep their defaults
        assert_eq!(config.roi.ai_monthly_cost, 40.0);
        assert!(config.vocabulary.is_task_type("spike"));
        assert!(!config.vocabulary.is_task_type("code_generation"));
        assert!(!config.vocabulary.is_productive("review"));
        assert!(config.vocabulary.is_severity("low"));
    }

    #[test]
    fn test_max_duration() {
        let session = SessionConfig {
            max_duration_hours: 1.5,
        };
        assert_eq!(session.max_duration(), chrono::Duration::minutes(90));
    }

    #[test]
    fn test_unusable_max_duration_falls_back() {
        for hours in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            let session = SessionConfig {
                max_duration_hours: hours,
            };
            assert_eq!(session.max_duration(), chrono::Duration::hours(4));
        }
    }

    #[test]
    fn test_load_from_rejects_bad_max_duration() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        for value in ["-1.0", "0.0", "nan"] {
            std::fs::write(&path, format!("[session]\nmax_duration_hours = {}\n", value)).unwrap();
            let err = Config::load_from(&path).unwrap_err();
            assert_eq!(err.kind(), "config_error");
            assert!(err.to_string().contains("max_duration_hours"));
        }

        std::fs::write(&path, "[session]\nmax_duration_hours = 2.5\n").unwrap();
        assert_eq!(Config::load_from(&path).unwrap().session.max_duration_hours, 2.5);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[session\nmax_duration_hours = ").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }
}
