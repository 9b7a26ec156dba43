//! TOML configuration for the editlens binary and orchestrator.

use crate::errors::ConfigError;
use editlens_provider::{CommandConfig, GenerationConfig};
use editlens_resilience::{RetryPolicy, DEFAULT_MIN_DELAY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "EDITLENS_CONFIG";

/// Model identities probed in order until one answers.
pub const DEFAULT_MODEL_CANDIDATES: [&str; 3] =
    ["gemini-2.5-flash", "gemini-2.0-flash", "gemini-1.5-flash"];

/// Full editlens configuration.
///
/// Every section is optional in the file; missing sections and fields take
/// their defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditlensConfig {
    /// Model CLI settings.
    pub provider: ProviderSection,
    /// Candidate model identities.
    pub models: ModelsSection,
    /// Retry bounds for each model call.
    pub retry: RetrySection,
    /// Spacing between outbound calls.
    pub rate_limit: RateLimitSection,
    /// Sampling parameters sent with every analysis request.
    pub generation: GenerationConfig,
}

/// `[provider]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    /// Override model CLI location (None = discover).
    pub binary: Option<PathBuf>,

    /// Arguments placed before the generated ones.
    pub args: Vec<String>,

    /// Maximum execution time for a single model call.
    ///
    /// Default: 300 seconds
    pub timeout_secs: u64,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            binary: None,
            args: Vec::new(),
            timeout_secs: 300,
        }
    }
}

/// `[models]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsSection {
    /// Probe order. The first candidate that answers is pinned.
    pub candidates: Vec<String>,
}

impl Default for ModelsSection {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_MODEL_CANDIDATES.map(String::from).to_vec(),
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff before jitter.
    pub base_delay_ms: u64,
    /// Ceiling for any single wait, including provider hints.
    pub max_delay_ms: u64,
    /// Relative jitter amplitude in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: duration_ms(policy.base_delay),
            max_delay_ms: duration_ms(policy.max_delay),
            jitter: policy.jitter,
        }
    }
}

/// `[rate_limit]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    /// Minimum spacing between calls in milliseconds.
    pub min_delay_ms: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            min_delay_ms: duration_ms(DEFAULT_MIN_DELAY),
        }
    }
}

impl EditlensConfig {
    /// Parses a TOML document.
    ///
    /// `origin` only labels errors.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses one file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Loads configuration from the first source that applies:
    /// `explicit`, then `$EDITLENS_CONFIG`, then
    /// `<config dir>/editlens/config.toml`.
    ///
    /// An explicitly named file must exist. A missing default file yields
    /// [`EditlensConfig::default`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        Self::load_from(explicit, env_path.as_deref(), default_path().as_deref())
    }

    fn load_from(
        explicit: Option<&Path>,
        env_path: Option<&Path>,
        default_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            tracing::debug!(event = "config_loaded", source = "flag", path = %path.display(), "config_loaded");
            return Self::from_file(path);
        }
        if let Some(path) = env_path {
            tracing::debug!(event = "config_loaded", source = "environment", path = %path.display(), "config_loaded");
            return Self::from_file(path);
        }
        match default_path {
            Some(path) if path.is_file() => {
                tracing::debug!(event = "config_loaded", source = "default", path = %path.display(), "config_loaded");
                Self::from_file(path)
            }
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::Invalid(format!(
                "retry.jitter must be within [0, 1], got {}",
                self.retry.jitter
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.models.candidates.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "models.candidates must name at least one model".into(),
            ));
        }
        Ok(())
    }

    /// Retry policy described by `[retry]`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_retries(self.retry.max_retries)
            .with_base_delay(Duration::from_millis(self.retry.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_jitter(self.retry.jitter)
    }

    /// Minimum call spacing described by `[rate_limit]`.
    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit.min_delay_ms)
    }

    /// Subprocess settings described by `[provider]`.
    #[must_use]
    pub fn command_config(&self) -> CommandConfig {
        CommandConfig {
            binary: self.provider.binary.clone(),
            extra_args: self.provider.args.clone(),
            timeout: Duration::from_secs(self.provider.timeout_secs),
            ..CommandConfig::default()
        }
    }
}

/// `<config dir>/editlens/config.toml`, when the platform has a config dir.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("editlens").join("config.toml"))
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = EditlensConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.retry.max_delay_ms, 60_000);
        assert!((config.retry.jitter - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.min_delay_ms, 4000);
        assert_eq!(config.generation.max_output_tokens, 8192);
        assert_eq!(config.models.candidates.len(), 3);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = EditlensConfig::from_toml("", Path::new("inline")).unwrap();
        assert_eq!(config, EditlensConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let toml = r#"
[models]
candidates = ["pro", "flash"]

[retry]
max_retries = 5

[rate_limit]
min_delay_ms = 250

[provider]
binary = "/opt/model/bin/gen"
args = ["--quiet"]
timeout_secs = 30
"#;
        let config = EditlensConfig::from_toml(toml, Path::new("inline")).unwrap();
        assert_eq!(config.models.candidates, vec!["pro", "flash"]);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 2000);
        assert_eq!(config.min_delay(), Duration::from_millis(250));

        let command = config.command_config();
        assert_eq!(command.binary, Some(PathBuf::from("/opt/model/bin/gen")));
        assert_eq!(command.extra_args, vec!["--quiet"]);
        assert_eq!(command.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_generation_section() {
        let config = EditlensConfig::from_toml(
            "[generation]\nmax_output_tokens = 2048",
            Path::new("inline"),
        )
        .unwrap();
        assert_eq!(config.generation.max_output_tokens, 2048);
        assert!((config.generation.temperature - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EditlensConfig::from_toml("[retry]\njitter = 2.0", Path::new("x")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err =
            EditlensConfig::from_toml("[models]\ncandidates = []", Path::new("x")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EditlensConfig::from_toml("[retry\n", Path::new("x")).unwrap_err();
        assert!(err.to_string().starts_with("Parse TOML failed for x"));
    }

    #[test]
    fn test_lookup_order() {
        let dir = TempDir::new().unwrap();
        let flag = write(&dir, "flag.toml", "[retry]\nmax_retries = 1");
        let env = write(&dir, "env.toml", "[retry]\nmax_retries = 2");
        let default = write(&dir, "default.toml", "[retry]\nmax_retries = 7");

        let config =
            EditlensConfig::load_from(Some(&flag), Some(&env), Some(&default)).unwrap();
        assert_eq!(config.retry.max_retries, 1);

        let config = EditlensConfig::load_from(None, Some(&env), Some(&default)).unwrap();
        assert_eq!(config.retry.max_retries, 2);

        let config = EditlensConfig::load_from(None, None, Some(&default)).unwrap();
        assert_eq!(config.retry.max_retries, 7);
    }

    #[test]
    fn test_missing_default_file_falls_back() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let config = EditlensConfig::load_from(None, None, Some(&missing)).unwrap();
        assert_eq!(config, EditlensConfig::default());

        let err = EditlensConfig::load_from(Some(&missing), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
