use super::Collector;
use crate::{
    context::ScrapeContext,
    error::{
        CollectorError,
        CollectorResult,
    },
};
use futures::future::join_all;
use std::{
    num::NonZeroUsize,
    sync::Arc,
};
use tokio::sync::Semaphore;

/// Runs one collector once per input, concurrently, and waits for every run to end.
///
/// Runs are isolated: a failing run does its own failure bookkeeping and never cancels its siblings. The only
/// thing that stops them all is the scrape's cancellation token.
#[derive(Debug, Clone, Copy, Default)]
pub struct FanoutPool {
    concurrency: Option<NonZeroUsize>,
}

/// Results in input order.
#[derive(Debug)]
pub struct FanoutReport<T> {
    pub results: Vec<CollectorResult<T>>,
}

impl<T> FanoutReport<T> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|result| result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

impl FanoutPool {
    /// At most `concurrency` runs in flight; 0 means one task per input with no cap.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: NonZeroUsize::new(concurrency),
        }
    }

    pub fn concurrency(&self) -> Option<usize> {
        self.concurrency.map(NonZeroUsize::get)
    }

    pub async fn run<C>(&self, collector: Arc<C>, ctx: &ScrapeContext, inputs: Vec<C::Input>) -> FanoutReport<C::Output>
    where
        C: Collector + 'static,
    {
        let permits = self.concurrency.map(|limit| Arc::new(Semaphore::new(limit.get())));
        debug!(collector = collector.name(), tasks = inputs.len(), limit = ?self.concurrency(), "Starting fan-out");

        let handles = inputs
            .into_iter()
            .map(|input| {
                tokio::task::spawn({
                    let collector = Arc::clone(&collector);
                    let ctx = ctx.clone();
                    let permits = permits.clone();
                    async move {
                        let _permit = match permits {
                            Some(permits) => match permits.acquire_owned().await {
                                Ok(permit) => Some(permit),
                                Err(error) => {
                                    let error = CollectorError::Task(error.to_string());
                                    ctx.record_failure(collector.name(), &error);
                                    return Err(error);
                                }
                            },
                            None => None,
                        };
                        collector.run(&ctx, input).await
                    }
                })
            })
            .collect::<Vec<_>>();

        let results = join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|error| {
                    let error = CollectorError::Task(error.to_string());
                    ctx.record_failure(collector.name(), &error);
                    Err(error)
                })
            })
            .collect();

        let report = FanoutReport { results };
        debug!(
            collector = collector.name(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Fan-out finished"
        );
        report
    }
}
