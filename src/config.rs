use std::env;
use std::sync::OnceLock;

use thiserror::Error;
use url::Url;

/// Errors raised while loading configuration at startup. All of these are
/// fatal: the process refuses to start without a reachable backend target.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("invalid BACKEND_URL: {0}")]
    InvalidBackendUrl(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the hosted backend serving both the identity provider
    /// (`/auth/v1`) and the record store (`/rest/v1`).
    pub backend_url: Url,
    /// Public (anonymous) API key sent with every backend call.
    pub anon_key: String,
    /// Public origin of this application, used to build the callback URL
    /// embedded in one-time login emails.
    pub site_url: String,
    /// Landing path substituted whenever a `next` parameter fails the
    /// path-absoluteness check.
    pub default_next: String,
    /// Path prefixes that require an authenticated caller.
    pub protected_paths: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = env::var("BACKEND_URL").map_err(|_| ConfigError::Missing("BACKEND_URL"))?;
        let backend_url =
            Url::parse(&raw_url).map_err(|e| ConfigError::InvalidBackendUrl(e.to_string()))?;

        let anon_key =
            env::var("BACKEND_ANON_KEY").map_err(|_| ConfigError::Missing("BACKEND_ANON_KEY"))?;
        if anon_key.trim().is_empty() {
            return Err(ConfigError::Missing("BACKEND_ANON_KEY"));
        }

        let site_url =
            env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            backend_url,
            anon_key,
            site_url,
            default_next: "/chargements".to_string(),
            protected_paths: vec![
                "/chargements".to_string(),
                "/nouveau-chargement".to_string(),
            ],
        })
    }

    /// URL of an identity provider endpoint, e.g. `auth_endpoint("token")`.
    pub fn auth_endpoint(&self, path: &str) -> String {
        format!("{}auth/v1/{}", self.backend_url, path)
    }

    /// URL of a record store relation, e.g. `rest_endpoint("chargements")`.
    pub fn rest_endpoint(&self, table: &str) -> String {
        format!("{}rest/v1/{}", self.backend_url, table)
    }
}

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Load configuration from the environment exactly once. Subsequent calls
/// return the already-initialized config.
pub fn init_from_env() -> Result<&'static AppConfig, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    let config = AppConfig::from_env()?;
    Ok(CONFIG.get_or_init(|| config))
}

/// Access the global config. Panics if `init_from_env` has not run; `main`
/// initializes it before the router is built.
pub fn config() -> &'static AppConfig {
    CONFIG.get().expect("configuration not initialized")
}
