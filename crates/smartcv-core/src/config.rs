use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub app: AppConfig,
    pub paths: PathsConfig,
    pub telemetry: TelemetryConfig,
    pub db: DbConfig,
    pub kv: KvConfig,
    pub messaging: MessagingConfig,
    pub ai: AiConfig,
    pub payment: PaymentConfig,
    pub smtp_recruiter: SmtpConfig,
    pub smtp_confirmation: SmtpConfig,
    pub admin: AdminConfig,
    pub quota: QuotaConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub service_name: String,
    pub port: u16,
    pub env: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PathsConfig {
    pub database: PathBuf,
    pub uploads: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub export_traces: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DbConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    100
}

fn default_statement_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct KvConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl KvConfig {
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{password}@{}:{}", self.host, self.port)
            }
            _ => format!("redis://{}:{}", self.host, self.port),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MessagingConfig {
    pub api_key: String,
    pub base_url: String,
    pub sender_number: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AiProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AiConfig {
    pub primary: AiProviderConfig,
    pub fallback: AiProviderConfig,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1500
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PaymentConfig {
    pub secret_key: String,
    pub public_key: String,
    pub default_amount_kobo: u64,
    pub webhook_url: String,
    pub verify_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from_name: String,
    pub from_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AdminConfig {
    pub email: String,
    pub ip_salt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuotaConfig {
    #[serde(default = "default_quota_basic")]
    pub basic_applications: i64,
    #[serde(default = "default_quota_unlimited")]
    pub unlimited_applications: i64,
}

fn default_quota_basic() -> i64 {
    10
}

fn default_quota_unlimited() -> i64 {
    1000
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

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("APP_PORT") {
            let port: u16 = port.parse().map_err(ConfigError::InvalidPort)?;
            self.app.port = port;
        }

        if let Ok(otlp) = env::var("OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(otlp);
        }

        if let Ok(key) = env::var("MESSAGING_API_KEY") {
            self.messaging.api_key = key;
        }

        Ok(())
    }

    fn resolve_env_markers(&mut self) -> Result<(), ConfigError> {
        apply_env_marker(&mut self.app.service_name)?;
        apply_env_marker(&mut self.app.env)?;
        apply_env_marker(&mut self.app.base_url)?;
        apply_env_marker(&mut self.kv.host)?;
        if let Some(password) = &mut self.kv.password {
            apply_env_marker(password)?;
        }
        apply_env_marker(&mut self.messaging.api_key)?;
        apply_env_marker(&mut self.messaging.base_url)?;
        apply_env_marker(&mut self.messaging.sender_number)?;
        apply_env_marker(&mut self.ai.primary.api_key)?;
        apply_env_marker(&mut self.ai.fallback.api_key)?;
        apply_env_marker(&mut self.payment.secret_key)?;
        apply_env_marker(&mut self.payment.public_key)?;
        apply_env_marker(&mut self.payment.webhook_url)?;
        apply_env_marker(&mut self.smtp_recruiter.user)?;
        apply_env_marker(&mut self.smtp_recruiter.pass)?;
        apply_env_marker(&mut self.smtp_confirmation.user)?;
        apply_env_marker(&mut self.smtp_confirmation.pass)?;
        apply_env_marker(&mut self.admin.email)?;
        apply_env_marker(&mut self.admin.ip_salt)?;
        apply_env_marker_path(&mut self.paths.database)?;
        apply_env_marker_path(&mut self.paths.uploads)?;
        if let Some(endpoint) = &mut self.telemetry.otlp_endpoint {
            apply_env_marker(endpoint)?;
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        for path in [&mut self.paths.database, &mut self.paths.uploads] {
            let as_string = path.to_string_lossy().to_string();
            let expanded = shellexpand::tilde(&as_string);
            *path = PathBuf::from(expanded.as_ref());
        }
    }
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
