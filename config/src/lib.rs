//! # Configuration
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. the built-in `default-config.yaml`
//! 2. `config.yaml` in the config directory (see [`get_config_dir`]), if present
//! 3. command line flags and their environment variables ([`Args`])

#[macro_use]
extern crate tracing;

mod args;
mod dirs;
pub mod duration;

pub use args::Args;
pub use dirs::get_config_dir;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::Path,
    time::Duration,
};
use url::Url;

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Bearer token. Never serialized, never logged.
    #[serde(default, skip_serializing)]
    pub api_token: String,
    #[serde(default)]
    pub account_id: String,
    pub api_base_url: Url,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub devices: bool,
    #[serde(default)]
    pub users: bool,
    #[serde(default)]
    pub tunnels: bool,
    #[serde(default)]
    pub dex: bool,
    #[serde(default)]
    pub interface: String,
    pub port: u16,
    #[serde(with = "duration")]
    pub scrape_timeout: Duration,
    #[serde(default)]
    pub retry: RetryConfig,
    /// 0 means no cap
    #[serde(default)]
    pub detail_concurrency: usize,
    #[serde(default)]
    pub eviction: EvictionPolicy,
}

/// Backoff settings for every upstream call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "duration")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "duration")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

/// What happens to a series once upstream stops reporting it.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EvictionPolicy {
    /// Keep every series with its last value for the lifetime of the process
    #[default]
    Retain,
    /// Drop all resource series at the start of each scrape
    ResetPerScrape,
}

/// The four independent collector toggles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnabledCollectors {
    pub devices: bool,
    pub users: bool,
    pub tunnels: bool,
    pub dex: bool,
}

impl EnabledCollectors {
    pub fn all() -> Self {
        Self {
            devices: true,
            users: true,
            tunnels: true,
            dex: true,
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        !(self.devices || self.users || self.tunnels || self.dex)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("api_base_url", &self.api_base_url.as_str())
            .field("debug", &self.debug)
            .field("collectors", &self.enabled_collectors())
            .field("interface", &self.interface)
            .field("port", &self.port)
            .field("scrape_timeout", &self.scrape_timeout)
            .field("retry", &self.retry)
            .field("detail_concurrency", &self.detail_concurrency)
            .field("eviction", &self.eviction)
            .finish()
    }
}

impl Config {
    /// Loads and validates the layered configuration.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let config_dir = get_config_dir();
        Self::load(args, &config_dir.join("config.yaml"))
    }

    /// Like [`Config::new`], with an explicit config file. A missing file is not an error.
    pub fn load(args: Args, config_file: &Path) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        debug!(path = %config_file.display(), "Looking for a config file");
        builder = builder.add_source(
            config::File::from(config_file.to_path_buf())
                .format(config::FileFormat::Yaml)
                .required(false),
        );

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.api_token.trim().is_empty() {
            return Err(invalid("an API token is required, pass --apikey or set API_KEY"));
        }
        if self.account_id.trim().is_empty() {
            return Err(invalid("an account id is required, pass --accountid or set ACCOUNT_ID"));
        }
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(invalid(format!("api_base_url must be http(s), got {}", self.api_base_url)));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !self.retry.multiplier.is_finite() {
            return Err(invalid("retry.multiplier must be a finite number"));
        }
        if self.scrape_timeout.is_zero() {
            return Err(invalid("scrape_timeout must be greater than zero"));
        }
        Ok(())
    }

    pub fn enabled_collectors(&self) -> EnabledCollectors {
        EnabledCollectors {
            devices: self.devices,
            users: self.users,
            tunnels: self.tunnels,
            dex: self.dex,
        }
    }

    /// `interface:port`, all interfaces when no interface is set.
    pub fn listen_address(&self) -> String {
        let interface = match self.interface.trim() {
            "" => "0.0.0.0",
            interface => interface,
        };
        format!("{interface}:{}", self.port)
    }

    /// The effective configuration as YAML, without the token.
    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(self)
    }
}

fn invalid(message: impl Into<String>) -> config::ConfigError {
    config::ConfigError::Message(message.into())
}
