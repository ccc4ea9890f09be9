//! TOML-based configuration for mirrorberg.
//!
//! All sensitive values (tokens) are stored as `_env` fields that reference
//! environment variable names; the actual secrets are resolved at runtime
//! via [`AppConfig::resolve_env_vars`]. The config file itself is optional:
//! when it is absent the built-in defaults apply and the account usernames
//! are taken from `GH_USERNAME` / `CODEBERG_USERNAME`, matching how the job
//! runs inside a CI scheduler with nothing but injected secrets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// GitHub (origin) settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Codeberg (destination) settings.
    #[serde(default)]
    pub codeberg: CodebergConfig,

    /// Mirroring behaviour settings.
    #[serde(default)]
    pub mirror: MirrorConfig,
}

// ---------------------------------------------------------------------------
// GitHub (origin)
// ---------------------------------------------------------------------------

/// GitHub account and API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Account whose repositories are mirrored. Falls back to the
    /// `GH_USERNAME` environment variable when empty.
    #[serde(default)]
    pub username: String,

    /// Environment variable holding the GitHub personal access token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            username: String::new(),
            token_env: default_github_token_env(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Codeberg (destination)
// ---------------------------------------------------------------------------

/// Codeberg account and API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodebergConfig {
    /// Codeberg API base URL (default `https://codeberg.org/api/v1`).
    #[serde(default = "default_codeberg_api_url")]
    pub api_url: String,

    /// Base URL used to build push remotes (default `https://codeberg.org`).
    #[serde(default = "default_codeberg_base_url")]
    pub base_url: String,

    /// Destination account that will own the mirrors. Falls back to the
    /// `CODEBERG_USERNAME` environment variable when empty.
    #[serde(default)]
    pub username: String,

    /// Environment variable holding the Codeberg access token.
    #[serde(default = "default_codeberg_token_env")]
    pub token_env: String,

    /// Resolved token (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_codeberg_api_url() -> String {
    "https://codeberg.org/api/v1".into()
}
fn default_codeberg_base_url() -> String {
    "https://codeberg.org".into()
}
fn default_codeberg_token_env() -> String {
    "CODEBERG_TOKEN".into()
}

impl Default for CodebergConfig {
    fn default() -> Self {
        Self {
            api_url: default_codeberg_api_url(),
            base_url: default_codeberg_base_url(),
            username: String::new(),
            token_env: default_codeberg_token_env(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mirroring behaviour
// ---------------------------------------------------------------------------

/// Mirroring behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Path to the exclusion list file. Missing file means no exclusions.
    #[serde(default = "default_exclude_file")]
    pub exclude_file: PathBuf,

    /// Seconds to wait between repositories, to stay under API rate limits.
    #[serde(default = "default_repo_delay")]
    pub repo_delay_secs: u64,

    /// Delete branches/tags at the destination that no longer exist at the
    /// source. Default off: mirroring is additive, never destructive.
    #[serde(default)]
    pub prune: bool,

    /// Maximum retry attempts for transient API and push failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_exclude_file() -> PathBuf {
    PathBuf::from("blacklist.txt")
}
fn default_repo_delay() -> u64 {
    2
}
fn default_max_retries() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            exclude_file: default_exclude_file(),
            repo_delay_secs: default_repo_delay(),
            prune: false,
            max_retries: default_max_retries(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields and username fallbacks from environment
    /// variables.
    ///
    /// Resolution never fails on its own -- missing variables leave the
    /// corresponding field empty and [`validate`](Self::validate) decides
    /// what is fatal.
    pub fn resolve_env_vars(&mut self) {
        info!("resolving environment variable references in config");

        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");
        self.codeberg.token =
            resolve_optional_env(&self.codeberg.token_env, "codeberg.token_env");

        if self.github.username.is_empty() {
            if let Some(name) = resolve_optional_env("GH_USERNAME", "github.username") {
                self.github.username = name;
            }
        }
        if self.codeberg.username.is_empty() {
            if let Some(name) = resolve_optional_env("CODEBERG_USERNAME", "codeberg.username") {
                self.codeberg.username = name;
            }
        }

        debug!("environment variable resolution complete");
    }

    /// Validate that the four required identity/credential values are all
    /// present. Any missing value is a fatal configuration error and nothing
    /// is mirrored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.username".into(),
                detail: "origin account not set (config or GH_USERNAME)".into(),
            });
        }
        if self.codeberg.username.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "codeberg.username".into(),
                detail: "destination account not set (config or CODEBERG_USERNAME)".into(),
            });
        }
        if self.github.token.is_none() {
            return Err(ConfigError::EnvVarMissing {
                var: self.github.token_env.clone(),
                field: "github.token_env".into(),
            });
        }
        if self.codeberg.token.is_none() {
            return Err(ConfigError::EnvVarMissing {
                var: self.codeberg.token_env.clone(),
                field: "codeberg.token_env".into(),
            });
        }
        if self.mirror.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "mirror.max_retries".into(),
                detail: "retry count must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call. A missing
    /// config file is not an error -- defaults plus environment variables
    /// are used instead.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(ConfigError::FileNotFound(p)) => {
                warn!(path = %p, "config file not found, using defaults and environment");
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.resolve_env_vars();
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs and returns `None` if the variable is unset or empty.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
