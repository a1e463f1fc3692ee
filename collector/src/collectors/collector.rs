use crate::{
    context::ScrapeContext,
    error::{
        CollectorError,
        CollectorResult,
    },
    metrics::MetricSample,
};
use cloudflare_api_client::{
    GetRequest,
    ListRequest,
    ResourceKind,
    UpstreamFuture,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Deserializer,
};
use std::{
    future::Future,
    pin::Pin,
    time::Instant,
};

pub type CollectorFuture<'a, T> = Pin<Box<dyn Future<Output = CollectorResult<T>> + Send + 'a>>;

/// Trait for turning one upstream resource kind into gauges
pub trait Collector: Send + Sync {
    /// What the collector needs before it can start (for example the device snapshot)
    type Input: Send + 'static;
    /// What the collector hands on to the rest of the scrape
    type Output: Send + 'static;

    /// Get the name of this collector, used as the `collector` label of the exporter counters
    fn name(&self) -> &'static str;

    /// Fetch, decode and publish. Nothing may be published when this returns an error.
    fn collect<'a>(&'a self, ctx: &'a ScrapeContext, input: Self::Input) -> CollectorFuture<'a, Self::Output>;

    /// Run [`collect`](Collector::collect) and do the failure bookkeeping at the collector boundary
    fn run<'a>(&'a self, ctx: &'a ScrapeContext, input: Self::Input) -> CollectorFuture<'a, Self::Output> {
        Box::pin(async move {
            let started = Instant::now();
            match self.collect(ctx, input).await {
                Ok(output) => {
                    debug!(collector = self.name(), elapsed = ?started.elapsed(), "Collector finished");
                    Ok(output)
                }
                Err(error) => {
                    ctx.record_failure(self.name(), &error);
                    Err(error)
                }
            }
        })
    }
}

/// A value fetched through the retry executor, with the number of retries it took.
#[derive(Debug)]
pub(crate) struct Fetched<T> {
    pub value: T,
    pub retries: u32,
}

/// One logical upstream call: every attempt counts as an API call, every extra attempt as a retry.
pub(crate) async fn call_upstream<'a, T, F>(
    ctx: &'a ScrapeContext,
    collector: &'static str,
    mut call: F,
) -> CollectorResult<Fetched<T>>
where
    F: FnMut() -> UpstreamFuture<'a, T>,
{
    let outcome = ctx
        .retry()
        .execute_with_report(ctx.cancellation_token(), || {
            ctx.registry().record_api_call(collector);
            call()
        })
        .await;

    let retries = outcome.report.retries();
    ctx.registry().record_retries(collector, retries);

    Ok(Fetched {
        value: outcome.result?,
        retries,
    })
}

/// Every item of `kind`, page by page. A failed page fails the whole listing.
pub(crate) async fn fetch_all(
    ctx: &ScrapeContext,
    collector: &'static str,
    kind: ResourceKind,
) -> CollectorResult<Vec<serde_json::Value>> {
    let mut items = Vec::new();
    let mut page = 1;

    loop {
        let fetched = call_upstream(ctx, collector, || {
            ctx.client()
                .list(ListRequest::new(kind, ctx.account_id()).with_page(page))
        })
        .await?;

        let info = fetched.value.info;
        items.extend(fetched.value.items);
        if info.is_last(page) {
            break;
        }
        page += 1;
    }

    trace!(collector, %kind, pages = page, items = items.len(), "Listing complete");
    Ok(items)
}

/// A single resource of `kind` by id.
pub(crate) async fn fetch_one(
    ctx: &ScrapeContext,
    collector: &'static str,
    kind: ResourceKind,
    resource_id: &str,
) -> CollectorResult<Fetched<serde_json::Value>> {
    call_upstream(ctx, collector, || {
        ctx.client()
            .get(GetRequest::new(kind, ctx.account_id(), resource_id))
    })
    .await
}

pub(crate) fn decode<T: DeserializeOwned>(what: &'static str, value: serde_json::Value) -> CollectorResult<T> {
    serde_json::from_value(value).map_err(|source| CollectorError::Decode { what, source })
}

/// Upstream records send `null` for fields they have no value for; those become empty label values.
pub(crate) fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Publishes every sample or none of them.
pub(crate) fn publish(ctx: &ScrapeContext, samples: &[MetricSample]) -> CollectorResult<usize> {
    Ok(ctx.registry().publish(samples)?)
}
