use super::Config;

/// Values taken from the process environment
///
/// Read explicitly with [`EnvOverrides::from_env`] so that nothing in the
/// library depends on the environment at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// `GITHUB_API_URL`
    pub github_api_url: Option<String>,
    /// `PYPI_API_URL`
    pub pypi_api_url: Option<String>,
    /// `GITHUB_TOKEN`
    pub github_token: Option<String>,
}

impl EnvOverrides {
    /// Reads the supported variables, ignoring empty ones
    pub fn from_env() -> Self {
        Self {
            github_api_url: get_env_value("GITHUB_API_URL"),
            pypi_api_url: get_env_value("PYPI_API_URL"),
            github_token: get_env_value("GITHUB_TOKEN"),
        }
    }

    /// Applies every present value on top of `config`
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.github_api_url {
            config.api_urls.github_api = url.clone();
        }
        if let Some(url) = &self.pypi_api_url {
            config.api_urls.pypi_api = url.clone();
        }
        if let Some(token) = &self.github_token {
            config.crediting.github_token = Some(token.clone());
        }
    }
}

/// Returns the variable's value, or `None` when unset or empty
pub fn get_env_value(key: &str) -> Option<String> {
    let value = std::env::var(key).ok()?;
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
