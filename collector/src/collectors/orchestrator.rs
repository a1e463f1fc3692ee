use super::{
    Collector,
    DetailOutput,
    DevicesCollector,
    DexDetailCollector,
    DexTestsCollector,
    FanoutPool,
    TunnelsCollector,
    UsersCollector,
};
use crate::{
    context::ScrapeContext,
    error::{
        CollectorError,
        CollectorResult,
        ScrapeError,
    },
    metrics::MetricRegistry,
    rendezvous::{
        self,
        RendezvousReceiver,
        RendezvousSender,
    },
    retry::{
        RetryExecutor,
        RetryPolicy,
    },
};
use cloudflare_api_client::UpstreamClient;
use futures::future::join_all;
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        Mutex as StdMutex,
        PoisonError,
    },
    time::{
        Duration,
        Instant,
    },
};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
};
use tokio_util::sync::DropGuard;
use zerotrust_exporter_config::{
    Config,
    EnabledCollectors,
    EvictionPolicy,
};

/// What the scraper reads from the configuration. Never changed after startup.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub account_id: String,
    pub collectors: EnabledCollectors,
    pub retry: RetryPolicy,
    /// Shared deadline for every upstream call and backoff of one scrape
    pub scrape_timeout: Duration,
    /// Cap on concurrent detail fetches, 0 for none
    pub detail_concurrency: usize,
    pub eviction: EvictionPolicy,
}

impl From<&Config> for ScrapeSettings {
    fn from(config: &Config) -> Self {
        Self {
            account_id: config.account_id.clone(),
            collectors: config.enabled_collectors(),
            retry: RetryPolicy::from(&config.retry),
            scrape_timeout: config.scrape_timeout,
            detail_concurrency: config.detail_concurrency,
            eviction: config.eviction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrapePhase {
    /// No scrape has run yet
    #[default]
    Idle,
    Running,
    /// Every task of the last scrape has terminated
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorStatus {
    Disabled,
    Succeeded,
    Failed(String),
}

impl CollectorStatus {
    fn from_result<T>(result: &CollectorResult<T>) -> Self {
        match result {
            Ok(_) => CollectorStatus::Succeeded,
            Err(error) => CollectorStatus::Failed(error.to_string()),
        }
    }
}

impl fmt::Display for CollectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorStatus::Disabled => f.write_str("disabled"),
            CollectorStatus::Succeeded => f.write_str("ok"),
            CollectorStatus::Failed(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Outcome of one scrape, for logging and tests. The metrics themselves live in the registry.
#[derive(Debug)]
pub struct ScrapeReport {
    pub duration: Duration,
    /// Top-level collectors by name, disabled ones included
    pub collectors: BTreeMap<&'static str, CollectorStatus>,
    /// Detail fetches by test id
    pub details: BTreeMap<String, CollectorResult<DetailOutput>>,
}

impl ScrapeReport {
    pub fn is_degraded(&self) -> bool {
        self.collectors
            .values()
            .any(|status| matches!(status, CollectorStatus::Failed(_)))
            || self.details.values().any(|detail| detail.is_err())
    }
}

/// What a single top-level task hands back when it terminates.
struct TaskOutcome {
    name: &'static str,
    status: CollectorStatus,
    details: BTreeMap<String, CollectorResult<DetailOutput>>,
}

impl TaskOutcome {
    fn new(name: &'static str, status: CollectorStatus) -> Self {
        Self {
            name,
            status,
            details: BTreeMap::new(),
        }
    }
}

/// Runs whole scrapes: one concurrent task per enabled collector, the device snapshot rendezvous, the detail
/// fan-out and the scrape deadline.
///
/// Scrapes are serialized, so a registry reset or an encode never interleaves with another scrape's writes. A
/// started scrape runs on its own task and always reaches [`ScrapePhase::Completed`], even when the caller stops
/// waiting for it (a Prometheus scrape timeout, a dropped connection).
pub struct Scraper {
    inner: Arc<ScraperInner>,
}

struct ScraperInner {
    client: Arc<dyn UpstreamClient>,
    registry: Arc<MetricRegistry>,
    settings: ScrapeSettings,
    lock: Arc<Mutex<()>>,
    phase: StdMutex<ScrapePhase>,
}

impl Scraper {
    pub fn new(client: Arc<dyn UpstreamClient>, registry: Arc<MetricRegistry>, settings: ScrapeSettings) -> Self {
        Self {
            inner: Arc::new(ScraperInner {
                client,
                registry,
                settings,
                lock: Arc::new(Mutex::new(())),
                phase: StdMutex::new(ScrapePhase::Idle),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.inner.registry
    }

    pub fn settings(&self) -> &ScrapeSettings {
        &self.inner.settings
    }

    pub fn phase(&self) -> ScrapePhase {
        *self.inner.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one scrape to completion. Collector failures end up in the report and the registry, never here.
    pub async fn scrape(&self) -> Result<ScrapeReport, ScrapeError> {
        let serialized = Arc::clone(&self.inner.lock).lock_owned().await;
        let scrape = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            async move {
                let _serialized = serialized;
                inner.scrape_locked().await
            }
        });
        Ok(scrape.await?)
    }

    /// Runs one scrape and serializes the registry before the next scrape may start.
    pub async fn scrape_and_encode(&self) -> Result<String, ScrapeError> {
        let serialized = Arc::clone(&self.inner.lock).lock_owned().await;
        let scrape = tokio::spawn({
            let inner = Arc::clone(&self.inner);
            async move {
                let _serialized = serialized;
                inner.scrape_locked().await;
                inner.registry.encode()
            }
        });
        Ok(scrape.await??)
    }
}

impl ScraperInner {
    fn enter(&self, phase: ScrapePhase) {
        let mut current = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        trace!(from = ?*current, to = ?phase, "Scrape phase change");
        *current = phase;
    }

    async fn scrape_locked(&self) -> ScrapeReport {
        let started = Instant::now();
        self.enter(ScrapePhase::Running);

        if self.settings.eviction == EvictionPolicy::ResetPerScrape {
            self.registry.reset_dynamic();
        }
        self.registry.set_up(true);

        let calls_before = self.registry.api_calls_total();
        let errors_before = self.registry.api_errors_total();

        let ctx = ScrapeContext::new(
            self.settings.account_id.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.registry),
            RetryExecutor::new(self.settings.retry),
        );
        let _deadline = self.arm_deadline(&ctx);

        let enabled = self.settings.collectors;
        let (devices_tx, devices_rx) = rendezvous::channel();
        let mut outcomes = Vec::new();
        let mut tasks: Vec<(&'static str, JoinHandle<TaskOutcome>)> = Vec::new();

        if enabled.devices {
            tasks.push((DevicesCollector::NAME, tokio::spawn(devices_task(ctx.clone(), devices_tx))));
        } else {
            devices_tx.close();
            outcomes.push(TaskOutcome::new(DevicesCollector::NAME, CollectorStatus::Disabled));
        }

        if enabled.users {
            tasks.push((UsersCollector::NAME, tokio::spawn(users_task(ctx.clone(), devices_rx))));
        } else {
            outcomes.push(TaskOutcome::new(UsersCollector::NAME, CollectorStatus::Disabled));
        }

        if enabled.tunnels {
            tasks.push((TunnelsCollector::NAME, tokio::spawn(tunnels_task(ctx.clone()))));
        } else {
            outcomes.push(TaskOutcome::new(TunnelsCollector::NAME, CollectorStatus::Disabled));
        }

        if enabled.dex {
            let pool = FanoutPool::new(self.settings.detail_concurrency);
            tasks.push((DexTestsCollector::NAME, tokio::spawn(dex_task(ctx.clone(), pool))));
        } else {
            outcomes.push(TaskOutcome::new(DexTestsCollector::NAME, CollectorStatus::Disabled));
        }

        let (names, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (name, joined) in names.into_iter().zip(join_all(handles).await) {
            let outcome = joined.unwrap_or_else(|error| {
                let error = CollectorError::Task(error.to_string());
                ctx.record_failure(name, &error);
                TaskOutcome::new(name, CollectorStatus::Failed(error.to_string()))
            });
            outcomes.push(outcome);
        }

        let duration = started.elapsed();
        self.registry.observe_scrape_duration(duration);
        self.enter(ScrapePhase::Completed);

        let mut report = ScrapeReport {
            duration,
            collectors: BTreeMap::new(),
            details: BTreeMap::new(),
        };
        for outcome in outcomes {
            report.collectors.insert(outcome.name, outcome.status);
            report.details.extend(outcome.details);
        }

        debug!(
            ?duration,
            api_calls = self.registry.api_calls_total() - calls_before,
            api_errors = self.registry.api_errors_total() - errors_before,
            details = report.details.len(),
            up = self.registry.is_up(),
            "Scrape completed"
        );
        report
    }

    /// Cancels the scrape's token once the deadline passes. Dropping the guard ends the watchdog.
    fn arm_deadline(&self, ctx: &ScrapeContext) -> DropGuard {
        let token = ctx.cancellation_token().clone();
        let timeout = self.settings.scrape_timeout;

        tokio::spawn({
            let token = token.clone();
            async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {},
                    _ = tokio::time::sleep(timeout) => {
                        warn!(?timeout, "Scrape deadline reached, cancelling collectors");
                        token.cancel();
                    }
                }
            }
        });

        token.drop_guard()
    }
}

impl fmt::Debug for Scraper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scraper")
            .field("settings", &self.inner.settings)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

async fn devices_task(ctx: ScrapeContext, snapshot: RendezvousSender<super::DeviceSnapshot>) -> TaskOutcome {
    let result = DevicesCollector.run(&ctx, ()).await;
    let status = CollectorStatus::from_result(&result);
    match result {
        Ok(devices) => {
            if !snapshot.deliver(devices) {
                trace!("Device snapshot not needed, users collector is not running");
            }
        }
        Err(_) => snapshot.close(),
    }
    TaskOutcome::new(DevicesCollector::NAME, status)
}

async fn users_task(ctx: ScrapeContext, snapshot: RendezvousReceiver<super::DeviceSnapshot>) -> TaskOutcome {
    let result = UsersCollector.run(&ctx, snapshot).await;
    TaskOutcome::new(UsersCollector::NAME, CollectorStatus::from_result(&result))
}

async fn tunnels_task(ctx: ScrapeContext) -> TaskOutcome {
    let result = TunnelsCollector.run(&ctx, ()).await;
    TaskOutcome::new(TunnelsCollector::NAME, CollectorStatus::from_result(&result))
}

/// The test listing first, then one detail fetch per listed test.
async fn dex_task(ctx: ScrapeContext, pool: FanoutPool) -> TaskOutcome {
    let test_ids = match DexTestsCollector.run(&ctx, ()).await {
        Ok(test_ids) => test_ids,
        Err(error) => return TaskOutcome::new(DexTestsCollector::NAME, CollectorStatus::Failed(error.to_string())),
    };

    let report = pool
        .run(Arc::new(DexDetailCollector), &ctx, test_ids.clone())
        .await;

    TaskOutcome {
        name: DexTestsCollector::NAME,
        status: CollectorStatus::Succeeded,
        details: test_ids.into_iter().zip(report.results).collect(),
    }
}
