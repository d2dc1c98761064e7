//! Driver configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use everkeep_core::rules::ScenePolicy;
use everkeep_workflow::poll::PollConfig;

/// Configuration problems that prevent the driver from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),

    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),
}

/// One render run, described by environment variables.
///
/// Selection overrides are optional; anything left unset keeps the
/// catalog default (the first entry of each list).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Backend base URL including the deployment prefix,
    /// e.g. `https://api.example.com/v1`.
    pub api_base: String,
    /// Photo files to upload, in selection order.
    pub photo_paths: Vec<PathBuf>,
    /// Scene key override.
    pub scene: Option<String>,
    /// Format key override.
    pub format: Option<String>,
    /// Background key override.
    pub background: Option<String>,
    /// Music key override. An empty string selects a silent render;
    /// `None` keeps the catalog default.
    pub music: Option<String>,
    /// Scene-to-format coupling; empty keys disable it.
    pub scene_policy: ScenePolicy,
    /// Budget for job-status polling.
    pub poll: PollConfig,
    /// Client tag sent with submissions; `None` derives one per run.
    pub user_tag: Option<String>,
}

impl DriverConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `EVERKEEP_API_BASE`           | --      |
    /// | `EVERKEEP_PHOTOS`             | --      |
    /// | `EVERKEEP_SCENE`              | catalog default |
    /// | `EVERKEEP_FORMAT`             | catalog default |
    /// | `EVERKEEP_BACKGROUND`         | catalog default |
    /// | `EVERKEEP_MUSIC`              | catalog default |
    /// | `EVERKEEP_SKY_SCENE`          | disabled |
    /// | `EVERKEEP_TALL_FORMAT`        | disabled |
    /// | `EVERKEEP_POLL_INTERVAL_SECS` | `3`     |
    /// | `EVERKEEP_POLL_MAX_ATTEMPTS`  | `30`    |
    /// | `EVERKEEP_USER`               | derived per run |
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = std::env::var("EVERKEEP_API_BASE")
            .map_err(|_| ConfigError::MissingVar("EVERKEEP_API_BASE"))?;

        let photo_paths: Vec<PathBuf> = std::env::var("EVERKEEP_PHOTOS")
            .map_err(|_| ConfigError::MissingVar("EVERKEEP_PHOTOS"))?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();
        if photo_paths.is_empty() {
            return Err(ConfigError::MissingVar("EVERKEEP_PHOTOS"));
        }

        let scene_policy = ScenePolicy {
            sky_scene_key: std::env::var("EVERKEEP_SKY_SCENE").unwrap_or_default(),
            tall_format_key: std::env::var("EVERKEEP_TALL_FORMAT").unwrap_or_default(),
        };

        let interval_secs: u64 = parse_var("EVERKEEP_POLL_INTERVAL_SECS", 3)?;
        let max_attempts: u32 = parse_var("EVERKEEP_POLL_MAX_ATTEMPTS", 30)?;

        Ok(Self {
            api_base,
            photo_paths,
            scene: optional("EVERKEEP_SCENE"),
            format: optional("EVERKEEP_FORMAT"),
            background: optional("EVERKEEP_BACKGROUND"),
            // An empty value is meaningful here (silence), so it is kept.
            music: std::env::var("EVERKEEP_MUSIC").ok(),
            scene_policy,
            poll: PollConfig {
                interval: Duration::from_secs(interval_secs),
                max_attempts,
            },
            user_tag: optional("EVERKEEP_USER"),
        })
    }
}

/// Read an optional variable, treating an empty value as unset.
fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Read a numeric variable, falling back to `default` when unset.
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(name)),
        Err(_) => Ok(default),
    }
}
