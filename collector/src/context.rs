use crate::{
    error::CollectorError,
    metrics::MetricRegistry,
    retry::RetryExecutor,
};
use cloudflare_api_client::UpstreamClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a collector needs for one scrape. Cheap to clone; all clones share the same cancellation token.
#[derive(Clone)]
pub struct ScrapeContext {
    inner: Arc<ScrapeContextInner>,
}

struct ScrapeContextInner {
    account_id: String,
    client: Arc<dyn UpstreamClient>,
    registry: Arc<MetricRegistry>,
    retry: RetryExecutor,
    cancel: CancellationToken,
}

impl ScrapeContext {
    pub fn new(
        account_id: impl Into<String>,
        client: Arc<dyn UpstreamClient>,
        registry: Arc<MetricRegistry>,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            inner: Arc::new(ScrapeContextInner {
                account_id: account_id.into(),
                client,
                registry,
                retry,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn account_id(&self) -> &str {
        &self.inner.account_id
    }

    pub fn client(&self) -> &dyn UpstreamClient {
        self.inner.client.as_ref()
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.inner.registry
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.inner.retry
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Failure bookkeeping at the collector boundary: error counter, liveness gauge, log.
    pub fn record_failure(&self, collector: &'static str, error: &CollectorError) {
        self.registry().record_api_error(collector);
        self.registry().set_up(false);
        if error.is_cancelled() {
            warn!(collector, "Collector cancelled by the scrape deadline");
        } else {
            error!(collector, %error, "Collector failed");
        }
    }
}

impl std::fmt::Debug for ScrapeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeContext")
            .field("account_id", &self.inner.account_id)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
