//! # zerotrust-exporter
//!
//! Prometheus exporter for Cloudflare Zero Trust. Every `GET /metrics` polls the enabled resource kinds of one
//! account (devices, users, tunnels, DEX tests) and answers with the accumulated gauges.
//!
//! This crate is the composition root: it builds the upstream client, the registry and the scraper from the
//! [`Config`] and hands them to the HTTP server.

#[macro_use]
extern crate tracing;

mod logging;

use cloudflare_api_client::CloudflareClient;
use color_eyre::Result;
use eyre::Context as _;
pub use logging::init_logging;
use std::sync::Arc;
pub use zerotrust_exporter_config::{
    Args,
    Config,
};
use zerotrust_exporter_collector::{
    MetricRegistry,
    ScrapeSettings,
    Scraper,
};

pub fn init_errors() -> Result<()> {
    color_eyre::install()
}

/// Builds the scraper from `config`.
pub fn build_scraper(config: &Config) -> Result<Scraper> {
    let client = CloudflareClient::new(config.api_base_url.clone(), config.api_token.clone())
        .wrap_err("Failed to build the upstream HTTP client")?;
    let registry = Arc::new(MetricRegistry::new().wrap_err("Failed to register the exporter metrics")?);

    Ok(Scraper::new(Arc::new(client), registry, ScrapeSettings::from(config)))
}

/// Serves `/metrics` until Ctrl-C.
pub async fn run(config: Config) -> Result<()> {
    let scraper = Arc::new(build_scraper(&config)?);
    let collectors = config.enabled_collectors();

    info!(
        account = %config.account_id,
        ?collectors,
        scrape_timeout = ?config.scrape_timeout,
        eviction = %config.eviction,
        "Starting zerotrust exporter"
    );
    if collectors.is_empty() {
        warn!("No collectors enabled, /metrics will only expose the exporter's own metrics");
    }
    debug!(?config, "Effective configuration");

    let address = config.listen_address();
    zerotrust_exporter_http::run_server(&address, scraper)
        .await
        .wrap_err_with(|| format!("HTTP server on {address} failed"))?;

    info!("Exporter stopped");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use temp_dir::TempDir;
    use zerotrust_exporter_collector::ScrapePhase;

    #[test]
    fn scraper_follows_the_config() {
        let dir = TempDir::new().unwrap();
        let args = Args {
            api_token: Some("token".to_string()),
            account_id: Some("acc".to_string()),
            tunnels: Some(true),
            detail_concurrency: Some(4),
            ..Default::default()
        };
        let config = Config::load(args, &dir.child("config.yaml")).unwrap();

        let scraper = build_scraper(&config).unwrap();
        assert_eq!(scraper.settings().account_id, "acc");
        assert!(scraper.settings().collectors.tunnels);
        assert!(!scraper.settings().collectors.devices);
        assert_eq!(scraper.settings().detail_concurrency, 4);
        assert_eq!(scraper.phase(), ScrapePhase::Idle);
    }
}
