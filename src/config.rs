//! Runtime configuration.
//!
//! Settings come from a YAML file (every key optional) and are then
//! overridden by command-line flags and their environment variables
//! (`COMPLETION_API_KEY`, `COMPLETION_API_BASE`, `EVENTS_CSV`).
//!
//! ```yaml
//! api_base: https://integrate.api.nvidia.com/v1
//! model: abacusai/dracarys-llama-3.1-70b-instruct
//! tracked_event: hurricane
//! destination: data/events.csv
//! field_policy: quote
//! concurrency: 2
//! ```
//!
//! [`Config::validate`] runs before any URL is processed; every problem it
//! finds is fatal.

use crate::api::{CompletionOptions, RetryPolicy};
use crate::error::TrackerError;
use crate::extract::ExtractSettings;
use crate::outputs::FieldPolicy;
use crate::utils::ensure_writable_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the OpenAI-compatible completion API.
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
    /// Event class the prompt asks about.
    pub tracked_event: String,
    pub max_article_chars: usize,
    pub request_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    /// URLs in flight at once.
    pub concurrency: usize,
    /// CSV dataset events are appended to.
    pub destination: PathBuf,
    pub field_policy: FieldPolicy,
    pub normalize_dates: bool,
    pub reask_on_truncation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: "https://integrate.api.nvidia.com/v1".to_string(),
            api_key: None,
            model: "abacusai/dracarys-llama-3.1-70b-instruct".to_string(),
            temperature: 0.2,
            top_p: 0.7,
            max_tokens: 2024,
            stream: true,
            tracked_event: "hurricane".to_string(),
            max_article_chars: 24_000,
            request_timeout_secs: 120,
            fetch_timeout_secs: 30,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            concurrency: 1,
            destination: PathBuf::from("events.csv"),
            field_policy: FieldPolicy::Quote,
            normalize_dates: true,
            reask_on_truncation: true,
        }
    }
}

impl Config {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when it exists, or defaults.
    ///
    /// An explicitly given path must exist.
    #[instrument(level = "info", skip_all)]
    pub fn load(path: Option<&Path>) -> Result<Self, TrackerError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    debug!("No config file; using defaults");
                    return Ok(Self::default());
                }
                default
            }
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            TrackerError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&contents).map_err(|e| match e {
            TrackerError::Config(msg) => TrackerError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse a YAML document into a [`Config`].
    ///
    /// Keys that are absent keep their defaults; an empty document is the
    /// default configuration.
    ///
    /// # Arguments
    ///
    /// * `contents` - YAML text, typically the config file's contents
    ///
    /// # Returns
    ///
    /// The parsed config, or [`TrackerError::Config`] for malformed YAML or
    /// unknown enum values such as an unsupported `field_policy`.
    pub fn from_yaml(contents: &str) -> Result<Self, TrackerError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| TrackerError::Config(format!("invalid config: {e}")))
    }

    /// Apply command-line (or environment) values over the file's.
    pub fn apply_overrides(
        &mut self,
        api_key: Option<String>,
        api_base: Option<String>,
        destination: Option<PathBuf>,
    ) {
        if api_key.is_some() {
            self.api_key = api_key;
        }
        if let Some(api_base) = api_base {
            self.api_base = api_base;
        }
        if let Some(destination) = destination {
            self.destination = destination;
        }
    }

    /// Check everything that can be checked without touching the network.
    ///
    /// The destination's directory is created if missing and probed for writability.
    #[instrument(level = "info", skip_all)]
    pub async fn validate(&self) -> Result<(), TrackerError> {
        self.validate_values()?;
        let dir = match self.destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        ensure_writable_dir(&dir).await.map_err(|e| {
            TrackerError::Config(format!("destination directory {} is not writable: {e}", dir.display()))
        })?;
        Ok(())
    }

    fn validate_values(&self) -> Result<(), TrackerError> {
        self.require_api_key()?;
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TrackerError::Config(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(TrackerError::Config(format!(
                "top_p must be within (0, 1], got {}",
                self.top_p
            )));
        }
        for (name, value) in [
            ("max_tokens", self.max_tokens as usize),
            ("concurrency", self.concurrency),
            ("max_article_chars", self.max_article_chars),
        ] {
            if value == 0 {
                return Err(TrackerError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.api_base.trim().is_empty() {
            return Err(TrackerError::Config("api_base must not be empty".to_string()));
        }
        Ok(())
    }

    /// The API key, if one was configured and is not blank.
    ///
    /// # Returns
    ///
    /// The key, or [`TrackerError::Config`] naming the three places it can be set.
    pub fn require_api_key(&self) -> Result<&str, TrackerError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                TrackerError::Config(
                    "no API key: set api_key in the config file, pass --api-key, or export COMPLETION_API_KEY"
                        .to_string(),
                )
            })
    }

    /// Sampling and transport options sent with every completion request.
    pub fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Timeouts, backoff and post-processing switches for the extractor.
    pub fn extract_settings(&self) -> ExtractSettings {
        ExtractSettings {
            fetch_timeout: self.fetch_timeout(),
            request_timeout: self.request_timeout(),
            retry: self.retry_policy(),
            normalize_dates: self.normalize_dates,
            reask_on_truncation: self.reask_on_truncation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed() -> Config {
        Config {
            api_key: Some("nvapi-test".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "model: meta/llama-3.1-8b-instruct\nconcurrency: 4\nfield_policy: strip\n",
        )
        .unwrap();
        assert_eq!(config.model, "meta/llama-3.1-8b-instruct");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.field_policy, FieldPolicy::Strip);
        assert_eq!(config.max_tokens, 2024);
        assert_eq!(config.top_p, 0.7);
        assert_eq!(config.destination, PathBuf::from("events.csv"));
        assert!(config.stream);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_policy_is_config_error() {
        let err = Config::from_yaml("field_policy: escape\n").unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = Config::from_yaml("api_base: http://localhost:8000/v1\n").unwrap();
        config.apply_overrides(
            Some("key".to_string()),
            None,
            Some(PathBuf::from("/data/helene.csv")),
        );
        assert_eq!(config.api_key.as_deref(), Some("key"));
        assert_eq!(config.api_base, "http://localhost:8000/v1");
        assert_eq!(config.destination, PathBuf::from("/data/helene.csv"));
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let err = Config::default().validate_values().unwrap_err();
        assert!(err.to_string().contains("API key"));
        let blank = Config {
            api_key: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(blank.require_api_key().is_err());
    }

    #[test]
    fn test_out_of_range_sampling_is_fatal() {
        let hot = Config {
            temperature: 2.5,
            ..keyed()
        };
        assert!(hot.validate_values().is_err());
        let no_top_p = Config {
            top_p: 0.0,
            ..keyed()
        };
        assert!(no_top_p.validate_values().is_err());
        let zero_workers = Config {
            concurrency: 0,
            ..keyed()
        };
        assert!(zero_workers.validate_values().is_err());
        assert!(keyed().validate_values().is_ok());
    }

    #[tokio::test]
    async fn test_validate_creates_destination_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config {
            destination: tmp.path().join("out").join("events.csv"),
            ..keyed()
        };
        config.validate().await.unwrap();
        assert!(tmp.path().join("out").is_dir());
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let err = Config::load(Some(Path::new("/no/such/config.yaml"))).unwrap_err();
        assert!(matches!(err, TrackerError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "tracked_event: wildfire\nmax_retries: 0\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.tracked_event, "wildfire");
        assert_eq!(config.retry_policy().max_retries, 0);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
    }
}
