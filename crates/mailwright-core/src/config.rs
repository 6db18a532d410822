use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub service_name: String,
    #[serde(default = "default_env")]
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 17900,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub export_traces: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GmailConfig {
    /// Persisted credential, written after every refresh or grant.
    pub token_path: PathBuf,
    /// Google client secrets JSON, used when no client id/secret is set.
    pub client_secrets_path: PathBuf,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_id: String,
    pub api_base: String,
    pub token_endpoint: Option<String>,
    pub auth_endpoint: Option<String>,
    pub request_timeout_secs: u64,
    pub grant_timeout_secs: u64,
    pub refresh_buffer_secs: i64,
    pub open_browser: bool,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from(".credentials/token.json"),
            client_secrets_path: PathBuf::from(".credentials/credentials.json"),
            client_id: None,
            client_secret: None,
            user_id: "me".to_string(),
            api_base: crate::gmail::DEFAULT_API_BASE.to_string(),
            token_endpoint: None,
            auth_endpoint: None,
            request_timeout_secs: 30,
            grant_timeout_secs: 300,
            refresh_buffer_secs: 300,
            open_browser: true,
        }
    }
}

fn default_env() -> String {
    "dev".to_string()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ConfigBuild(config::ConfigError),
    #[error("failed to parse configuration: {0}")]
    Deserialize(config::ConfigError),
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid APP_PORT override: {0}")]
    InvalidPort(std::num::ParseIntError),
}

impl Config {
    /// Load configuration from the provided path, apply environment overrides, and
    /// resolve any `env:` indirections.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(ConfigError::ConfigBuild)?;

        let mut cfg: Config = raw.try_deserialize().map_err(ConfigError::Deserialize)?;
        cfg.apply_env_overrides()?;
        cfg.resolve_env_markers()?;
        cfg.expand_paths();
        Ok(cfg)
    }

    /// `CONFIG_PATH`, or `config.toml` in the working directory.
    pub fn default_path() -> PathBuf {
        env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"))
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("APP_PORT") {
            let port: u16 = port.parse().map_err(ConfigError::InvalidPort)?;
            self.server.port = port;
        }

        if let Ok(otlp) = env::var("OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(otlp);
        }

        if let Ok(path) = env::var("GMAIL_TOKEN_PATH") {
            self.gmail.token_path = PathBuf::from(path);
        }

        if let Ok(client_id) = env::var("GMAIL_CLIENT_ID") {
            self.gmail.client_id = Some(client_id);
        }

        if let Ok(secret) = env::var("GMAIL_CLIENT_SECRET") {
            self.gmail.client_secret = Some(secret);
        }

        Ok(())
    }

    fn resolve_env_markers(&mut self) -> Result<(), ConfigError> {
        apply_env_marker(&mut self.app.service_name)?;
        apply_env_marker(&mut self.app.env)?;
        apply_env_marker(&mut self.server.host)?;
        apply_env_marker(&mut self.gmail.user_id)?;
        apply_env_marker(&mut self.gmail.api_base)?;
        apply_env_marker_path(&mut self.gmail.token_path)?;
        apply_env_marker_path(&mut self.gmail.client_secrets_path)?;
        for value in [
            &mut self.telemetry.otlp_endpoint,
            &mut self.gmail.client_id,
            &mut self.gmail.client_secret,
            &mut self.gmail.token_endpoint,
            &mut self.gmail.auth_endpoint,
        ]
        .into_iter()
        .flatten()
        {
            apply_env_marker(value)?;
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        self.gmail.token_path = expand_tilde(&self.gmail.token_path);
        self.gmail.client_secrets_path = expand_tilde(&self.gmail.client_secrets_path);
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy().to_string();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

fn apply_env_marker(value: &mut String) -> Result<(), ConfigError> {
    if let Some(rest) = value.strip_prefix("env:") {
        let resolved = env::var(rest).map_err(|_| ConfigError::MissingEnvVar(rest.to_string()))?;
        *value = resolved;
    }
    Ok(())
}

fn apply_env_marker_path(path: &mut PathBuf) -> Result<(), ConfigError> {
    let mut value = path.to_string_lossy().to_string();
    apply_env_marker(&mut value)?;
    *path = PathBuf::from(value);
    Ok(())
}
