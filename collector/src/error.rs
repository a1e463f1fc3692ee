use crate::{
    metrics::MetricError,
    retry::RetryError,
};
use cloudflare_api_client::UpstreamError;

pub type CollectorResult<T> = Result<T, CollectorError>;

#[derive(thiserror::Error, Debug)]
pub enum CollectorError {
    #[error("Upstream call failed: {0}")]
    Upstream(#[from] RetryError<UpstreamError>),
    #[error("Cannot decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Cannot publish metrics: {0}")]
    Metric(#[from] MetricError),
    #[error("Collector task did not finish: {0}")]
    Task(String),
}

/// Failures of a whole scrape. Collector failures are not among them; they end up in the registry.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("Cannot serialize the registry: {0}")]
    Encode(#[from] MetricError),
    #[error("Scrape task did not finish: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CollectorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CollectorError::Upstream(RetryError::Cancelled { .. }))
    }
}
