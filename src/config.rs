use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-0528:free";
pub const DEFAULT_REFERER: &str = "https://charakter-chat-backend.onrender.com";
pub const DEFAULT_TITLE: &str = "AI Charakter-Chat App";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_referer")]
    pub referer: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            api_key_env: default_api_key_env(),
            referer: default_referer(),
            title: default_title(),
            default_model: default_model(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_body_limit() -> usize {
    100 * 1024 * 1024
}

fn default_upstream_url() -> String {
    DEFAULT_UPSTREAM_URL.to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_referer() -> String {
    DEFAULT_REFERER.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

impl RelayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, falling back to defaults.
    /// Priority: CLI arg > CWD > XDG config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read the upstream credential from the configured environment variable.
    ///
    /// Called once at startup; a missing or empty variable is not an error here,
    /// every `/chat` request reports it instead.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
    }
}

/// Load a `.env` file from the working directory (or a parent) into the
/// process environment, if one exists.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("character-relay.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("character-relay").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("character-relay").join("config.toml"));
        paths.push(home.join(".character-relay.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
port = 5000

[upstream]
url = "http://127.0.0.1:9999/v1/chat/completions"
api_key_env = "RELAY_TEST_KEY"
default_model = "mistralai/mistral-7b-instruct"
"#
        )
        .unwrap();

        let config = RelayConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.body_limit_bytes, 100 * 1024 * 1024);
        assert_eq!(config.upstream.url, "http://127.0.0.1:9999/v1/chat/completions");
        assert_eq!(config.upstream.api_key_env, "RELAY_TEST_KEY");
        assert_eq!(config.upstream.default_model, "mistralai/mistral-7b-instruct");
        assert_eq!(config.upstream.title, DEFAULT_TITLE);
        assert_eq!(config.upstream.referer, DEFAULT_REFERER);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let f = NamedTempFile::new().unwrap();
        let config = RelayConfig::load(f.path()).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream.url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.upstream.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.upstream.default_model, DEFAULT_MODEL);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let err = RelayConfig::find_and_load(Some(Path::new("/nonexistent/relay.toml")))
            .unwrap_err();
        assert!(matches!(err, RelayError::Config { .. }));
    }

    #[test]
    fn test_resolve_api_key() {
        let mut config = RelayConfig::default();
        config.upstream.api_key_env = "CHARACTER_RELAY_TEST_KEY_PRESENT".to_string();
        std::env::set_var("CHARACTER_RELAY_TEST_KEY_PRESENT", "sk-or-test");
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-or-test"));

        config.upstream.api_key_env = "CHARACTER_RELAY_TEST_KEY_EMPTY".to_string();
        std::env::set_var("CHARACTER_RELAY_TEST_KEY_EMPTY", "");
        assert_eq!(config.resolve_api_key(), None);

        config.upstream.api_key_env = "CHARACTER_RELAY_TEST_KEY_UNSET".to_string();
        assert_eq!(config.resolve_api_key(), None);
    }
}
