mod env_manager;

use crate::error::{CreditError, Result};
use crate::utils::{RetryPolicy, DEFAULT_RATE_LIMIT_WAITS};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub use env_manager::{get_env_value, EnvOverrides};

/// Main configuration struct for the application
///
/// Built once, either from defaults or from a user file merged over the
/// defaults, and treated as read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment pipeline commands
    pub deployment: DeploymentConfig,
    /// Dependency crediting settings
    pub crediting: CreditingConfig,
    /// Source optimization switches (parsed and carried, not acted upon)
    pub optimization: OptimizationConfig,
    /// Base URLs of the remote services
    pub api_urls: ApiUrls,
}

/// Commands and settings for the deployment pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Shell command that builds the artifact
    pub build_command: String,
    /// Shell command that runs the test suite
    pub test_command: String,
    /// Shell command that packages the built artifact
    pub package_command: String,
    /// Repository name the upload targets
    pub upload_repository: String,
    /// Upload command template, `{repository}` is substituted
    pub upload_command: String,
    /// Whether a git tag is created after a successful upload
    pub auto_tag: bool,
    /// Prefix for the created tag
    pub tag_prefix: String,
}

/// Settings for the credit orchestrator and its request clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditingConfig {
    /// Master switch for `auto_credit`
    pub enable_auto_credit: bool,
    /// Upper bound on concurrently running credit tasks
    pub max_concurrent_requests: usize,
    /// Token for authenticated GitHub calls
    pub github_token: Option<String>,
    /// Drop standard-library modules from discovered packages
    pub skip_standard_library: bool,
    /// Total attempts per request
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further retry
    pub base_delay_ms: u64,
    /// Rate-limit resends allowed per request before it fails
    pub max_rate_limit_waits: u32,
    /// Timeout of a single HTTP call
    pub request_timeout_secs: u64,
    /// Time budget for crediting one identifier, rate-limit waits included
    pub identifier_deadline_secs: u64,
}

/// Toggles for the source optimizers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Remove unreachable definitions
    pub enable_dead_code_removal: bool,
    /// Fold constant expressions
    pub enable_expression_simplification: bool,
    /// Replace repeated file reads with cached data
    pub enable_io_optimization: bool,
}

/// Remote service base URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiUrls {
    /// GitHub-like API base
    pub github_api: String,
    /// Package-index JSON API base
    pub pypi_api: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            build_command: "python -m build".to_string(),
            test_command: "python -m pytest".to_string(),
            package_command: "python -m twine check dist/*".to_string(),
            upload_repository: "pypi".to_string(),
            upload_command: "python -m twine upload --repository {repository} dist/*".to_string(),
            auto_tag: true,
            tag_prefix: "release-".to_string(),
        }
    }
}

impl Default for CreditingConfig {
    fn default() -> Self {
        Self {
            enable_auto_credit: true,
            max_concurrent_requests: 10,
            github_token: None,
            skip_standard_library: true,
            max_retries: 3,
            base_delay_ms: 1000,
            max_rate_limit_waits: DEFAULT_RATE_LIMIT_WAITS,
            request_timeout_secs: 30,
            identifier_deadline_secs: 300,
        }
    }
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            enable_dead_code_removal: true,
            enable_expression_simplification: true,
            enable_io_optimization: true,
        }
    }
}

impl Default for ApiUrls {
    fn default() -> Self {
        Self {
            github_api: "https://api.github.com".to_string(),
            pypi_api: "https://pypi.org/pypi".to_string(),
        }
    }
}

impl CreditingConfig {
    /// Delay before the first retry
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Retry policy shared by both request clients
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.base_delay()).with_rate_limit_waits(self.max_rate_limit_waits)
    }

    /// Timeout of a single HTTP call
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Budget for one identifier's whole protocol
    pub fn identifier_deadline(&self) -> Duration {
        Duration::from_secs(self.identifier_deadline_secs)
    }
}

impl Config {
    /// Loads a configuration file and merges it over the defaults
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as JSON.
    /// Nested sections merge key-by-key, so a file only needs the keys it
    /// wants to change.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CreditError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let overrides: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => serde_json::to_value(toml::from_str::<toml::Value>(&content)?)?,
            _ => serde_json::from_str(&content)?,
        };

        Self::from_overrides(overrides)
    }

    /// Builds a configuration from a JSON override document
    pub fn from_overrides(overrides: Value) -> Result<Self> {
        if !overrides.is_object() {
            return Err(CreditError::Config("configuration root must be an object".into()));
        }
        let mut merged = serde_json::to_value(Self::default())?;
        merge_values(&mut merged, overrides);
        Ok(serde_json::from_value(merged)?)
    }

    /// Resolves the effective configuration
    ///
    /// Uses `path` when given, otherwise the default location if a file
    /// exists there, otherwise the built-in defaults. Environment overrides
    /// are applied last.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let mut config = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) if path.is_some() || p.exists() => {
                debug!(path = %p.display(), "loading configuration");
                Self::load(&p)?
            }
            _ => Self::default(),
        };
        EnvOverrides::from_env().apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autocredit").join("config.json"))
    }

    /// Checks the values the orchestrator relies on
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("github_api", &self.api_urls.github_api), ("pypi_api", &self.api_urls.pypi_api)] {
            url::Url::parse(value)
                .map_err(|e| CreditError::Config(format!("api_urls.{} is not a valid URL: {}", name, e)))?;
        }
        if self.crediting.max_concurrent_requests == 0 {
            return Err(CreditError::Config("crediting.max_concurrent_requests must be at least 1".into()));
        }
        if self.crediting.max_retries == 0 {
            return Err(CreditError::Config("crediting.max_retries must be at least 1".into()));
        }
        Ok(())
    }

    /// Retrieves the GitHub token, ignoring blank values
    pub fn github_token(&self) -> Option<&str> {
        self.crediting
            .github_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

/// Recursively merges `overlay` into `base`
///
/// Objects merge key-by-key; any other overlay value replaces the base value.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
