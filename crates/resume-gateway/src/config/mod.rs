use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cors::CorsProfile;
use crate::error::{GatewayError, Result};

/// Environment variable overriding `upstream.ml_url`
pub const ML_URL_ENV: &str = "ML_URL";
/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "PORT";

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Listener and inbound request limits
    #[serde(default)]
    pub server: ServerConfig,
    /// Scoring service the uploads are relayed to
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Cross-origin policy
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Config {
    /// Parse a configuration from TOML text, filling unset fields with defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the configuration from an explicit path or the default locations,
    /// then apply environment overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(path)?
            }
            None => match default_paths().into_iter().find(|p| p.exists()) {
                Some(path) => {
                    tracing::info!("Loading config from: {}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    tracing::info!("No config file found, using defaults");
                    Config::default()
                }
            },
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `ML_URL` and `PORT` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ml_url) = lookup(ML_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("{ML_URL_ENV} override: {ml_url}");
            self.upstream.ml_url = ml_url.trim().to_string();
        }

        if let Some(port) = lookup(PORT_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.port = port.trim().parse::<u16>().map_err(|e| {
                GatewayError::Config(format!("{PORT_ENV} must be a valid port number: {e}"))
            })?;
        }

        Ok(())
    }
}

fn default_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".resume-gateway").join("config.toml")),
        dirs::config_dir().map(|c| c.join("resume-gateway").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum total size of an inbound upload request in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// `host:port` string suitable for binding
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    12 << 20
}

/// Scoring service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the scoring service
    #[serde(default = "default_ml_url")]
    pub ml_url: String,
    /// Path of the one-shot scoring endpoint
    #[serde(default = "default_score_path")]
    pub score_path: String,
    /// Path of the streamed scoring endpoint
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    /// Deadline for a buffered relay, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Deadline for a streamed relay, in seconds
    #[serde(default = "default_stream_timeout_secs")]
    pub stream_timeout_secs: u64,
    /// TCP connect deadline, in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Number of in-flight chunks the body pipe holds before the producer waits
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
    /// Append an `event: error` frame when the downstream stream breaks
    #[serde(default = "default_stream_error_sentinel")]
    pub stream_error_sentinel: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            ml_url: default_ml_url(),
            score_path: default_score_path(),
            stream_path: default_stream_path(),
            timeout_secs: default_timeout_secs(),
            stream_timeout_secs: default_stream_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            pipe_capacity: default_pipe_capacity(),
            stream_error_sentinel: default_stream_error_sentinel(),
        }
    }
}

fn default_ml_url() -> String {
    "http://ml:8000".to_string()
}

fn default_score_path() -> String {
    "/api/score_file".to_string()
}

fn default_stream_path() -> String {
    "/api/score_file_stream".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_stream_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_pipe_capacity() -> usize {
    8
}

fn default_stream_error_sentinel() -> bool {
    true
}

/// Cross-origin configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Named policy profile
    #[serde(default)]
    pub profile: CorsProfile,
    /// Origins echoed back under the `restricted` profile
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Value of `Access-Control-Allow-Methods`
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: String,
    /// Value of `Access-Control-Allow-Headers`
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            profile: CorsProfile::default(),
            allowed_origins: Vec::new(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
        }
    }
}

fn default_allowed_methods() -> String {
    "POST, GET, OPTIONS".to_string()
}

fn default_allowed_headers() -> String {
    "Content-Type".to_string()
}
