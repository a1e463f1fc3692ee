use crate::EvictionPolicy;
use clap::{
    builder::BoolishValueParser,
    Parser,
};
use std::time::Duration;

/// Prometheus exporter for Cloudflare Zero Trust
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Cloudflare API token with read access to the account.
    #[clap(long = "apikey", env = "API_KEY", value_name = "TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Cloudflare account id.
    #[clap(long = "accountid", env = "ACCOUNT_ID", value_name = "ID")]
    pub account_id: Option<String>,

    /// Base URL of the Cloudflare v4 API.
    #[clap(long, env = "API_BASE_URL", value_name = "URL")]
    pub api_base_url: Option<String>,

    /// Enables debug logging and a summary line per scrape. `--debug false` overrides the config file.
    #[clap(
        long,
        env = "DEBUG",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub debug: Option<bool>,

    /// Collect device metrics.
    #[clap(
        long,
        env = "DEVICES",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub devices: Option<bool>,

    /// Collect user metrics.
    #[clap(
        long,
        env = "USERS",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub users: Option<bool>,

    /// Collect tunnel metrics.
    #[clap(
        long,
        env = "TUNNELS",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub tunnels: Option<bool>,

    /// Collect DEX test metrics, including the per-test traceroute details.
    #[clap(
        long,
        env = "DEX",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub dex: Option<bool>,

    /// Interface to listen on. Empty means all interfaces.
    #[clap(long, env = "INTERFACE", value_name = "ADDR")]
    pub interface: Option<String>,

    /// Port to listen on.
    #[clap(long, env = "PORT")]
    pub port: Option<u16>,

    /// Deadline for one whole scrape, e.g. `25s`.
    #[clap(long, env = "SCRAPE_TIMEOUT", value_parser = humantime::parse_duration)]
    pub scrape_timeout: Option<Duration>,

    /// Calls per upstream request, the first one included.
    #[clap(long, env = "RETRY_MAX_ATTEMPTS")]
    pub retry_max_attempts: Option<u32>,

    /// Delay before the first retry, e.g. `1s`.
    #[clap(long, env = "RETRY_BASE_DELAY", value_parser = humantime::parse_duration)]
    pub retry_base_delay: Option<Duration>,

    /// Maximum number of DEX test details fetched at the same time. 0 fetches all at once.
    #[clap(long, env = "DETAIL_CONCURRENCY")]
    pub detail_concurrency: Option<usize>,

    /// What happens to series that upstream stops reporting.
    #[clap(long, env = "EVICTION", value_enum)]
    pub eviction: Option<EvictionPolicy>,

    /// Print the effective configuration (without the token) and exit.
    #[clap(long, action)]
    pub print_config: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(api_token) = &self.api_token {
                cache.insert("api_token".to_string(), api_token.clone().into());
            }
            if let Some(account_id) = &self.account_id {
                cache.insert("account_id".to_string(), account_id.clone().into());
            }
            if let Some(api_base_url) = &self.api_base_url {
                cache.insert("api_base_url".to_string(), api_base_url.clone().into());
            }
            for (key, enabled) in [
                ("debug", self.debug),
                ("devices", self.devices),
                ("users", self.users),
                ("tunnels", self.tunnels),
                ("dex", self.dex),
            ] {
                if let Some(enabled) = enabled {
                    cache.insert(key.to_string(), enabled.into());
                }
            }
            if let Some(interface) = &self.interface {
                cache.insert("interface".to_string(), interface.clone().into());
            }
            if let Some(port) = self.port {
                cache.insert("port".to_string(), (port as u64).into());
            }
            if let Some(timeout) = self.scrape_timeout {
                cache.insert("scrape_timeout".to_string(), humantime::format_duration(timeout).to_string().into());
            }
            if let Some(attempts) = self.retry_max_attempts {
                cache.insert("retry.max_attempts".to_string(), (attempts as u64).into());
            }
            if let Some(delay) = self.retry_base_delay {
                cache.insert("retry.base_delay".to_string(), humantime::format_duration(delay).to_string().into());
            }
            if let Some(concurrency) = self.detail_concurrency {
                cache.insert("detail_concurrency".to_string(), (concurrency as u64).into());
            }
            if let Some(eviction) = self.eviction {
                cache.insert("eviction".to_string(), eviction.to_string().into());
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();

    format!(
        "{}

Authors: {author}

Config directory: {config_dir_path}",
        clap::crate_version!()
    )
}
