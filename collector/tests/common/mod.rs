//! In-memory upstream for scrape scenarios.

#![allow(dead_code)]

use cloudflare_api_client::{
    GetRequest,
    ListRequest,
    Page,
    PageInfo,
    ResourceKind,
    UpstreamClient,
    UpstreamError,
    UpstreamFuture,
};
use reqwest::StatusCode;
use serde_json::{
    json,
    Value,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicU32,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};
use zerotrust_exporter_collector::{
    MetricRegistry,
    RetryPolicy,
    ScrapeSettings,
    Scraper,
};
use zerotrust_exporter_config::{
    EnabledCollectors,
    EvictionPolicy,
};

enum ListScript {
    Pages(Vec<Vec<Value>>),
    /// Serves `pages`, then fails the page right after them
    FailAfter(Vec<Vec<Value>>, StatusCode),
    Fail(StatusCode),
    Hang,
}

struct DetailScript {
    /// 503 responses still to hand out before the value
    flaky: AtomicU32,
    value: Value,
}

#[derive(Default)]
pub struct FakeUpstream {
    lists: HashMap<ResourceKind, ListScript>,
    details: HashMap<String, DetailScript>,
    calls: Mutex<HashMap<ResourceKind, u32>>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single page listing.
    pub fn with_list(self, kind: ResourceKind, items: Vec<Value>) -> Self {
        self.with_pages(kind, vec![items])
    }

    pub fn with_pages(mut self, kind: ResourceKind, pages: Vec<Vec<Value>>) -> Self {
        self.lists.insert(kind, ListScript::Pages(pages));
        self
    }

    /// Serves `pages` while announcing one more page, which answers with `status`.
    pub fn with_failing_last_page(mut self, kind: ResourceKind, pages: Vec<Vec<Value>>, status: u16) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.lists.insert(kind, ListScript::FailAfter(pages, status));
        self
    }

    /// Every call for `kind` answers with `status`.
    pub fn with_list_failure(mut self, kind: ResourceKind, status: u16) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.lists.insert(kind, ListScript::Fail(status));
        self
    }

    /// Calls for `kind` never answer.
    pub fn with_hanging_list(mut self, kind: ResourceKind) -> Self {
        self.lists.insert(kind, ListScript::Hang);
        self
    }

    /// The detail of `test_id`, after `flaky` 503 responses.
    pub fn with_detail(mut self, test_id: &str, value: Value, flaky: u32) -> Self {
        self.details.insert(
            test_id.to_string(),
            DetailScript {
                flaky: AtomicU32::new(flaky),
                value,
            },
        );
        self
    }

    pub fn calls(&self, kind: ResourceKind) -> u32 {
        self.calls.lock().unwrap().get(&kind).copied().unwrap_or_default()
    }

    fn record(&self, kind: ResourceKind) {
        *self.calls.lock().unwrap().entry(kind).or_default() += 1;
    }
}

fn status(kind: ResourceKind, status: StatusCode) -> UpstreamError {
    UpstreamError::Status {
        url: format!("https://api.test/{kind}"),
        status,
        body: String::new(),
    }
}

impl UpstreamClient for FakeUpstream {
    fn list<'a>(&'a self, request: ListRequest<'a>) -> UpstreamFuture<'a, Page> {
        Box::pin(async move {
            self.record(request.kind);
            match self.lists.get(&request.kind) {
                None => Ok(Page::default()),
                Some(ListScript::Pages(pages)) => {
                    let index = request.paging.page.saturating_sub(1) as usize;
                    let items = pages.get(index).cloned().unwrap_or_default();
                    Ok(Page {
                        info: PageInfo {
                            page: request.paging.page,
                            per_page: request.paging.per_page,
                            total_count: pages.iter().map(Vec::len).sum::<usize>() as u32,
                            total_pages: pages.len() as u32,
                        },
                        items,
                    })
                }
                Some(ListScript::FailAfter(pages, code)) => {
                    let index = request.paging.page.saturating_sub(1) as usize;
                    let Some(items) = pages.get(index) else {
                        return Err(status(request.kind, *code));
                    };
                    Ok(Page {
                        info: PageInfo {
                            page: request.paging.page,
                            per_page: request.paging.per_page,
                            total_count: 0,
                            total_pages: pages.len() as u32 + 1,
                        },
                        items: items.clone(),
                    })
                }
                Some(ListScript::Fail(code)) => Err(status(request.kind, *code)),
                Some(ListScript::Hang) => std::future::pending().await,
            }
        })
    }

    fn get<'a>(&'a self, request: GetRequest<'a>) -> UpstreamFuture<'a, Value> {
        Box::pin(async move {
            self.record(request.kind);
            let Some(script) = self.details.get(request.resource_id) else {
                return Err(status(request.kind, StatusCode::NOT_FOUND));
            };
            let remaining = script.flaky.load(Ordering::SeqCst);
            if remaining > 0 {
                script.flaky.store(remaining - 1, Ordering::SeqCst);
                return Err(status(request.kind, StatusCode::SERVICE_UNAVAILABLE));
            }
            Ok(script.value.clone())
        })
    }
}

pub fn device(id: &str, status: &str, email: &str) -> Value {
    json!({
        "device_id": id,
        "device_name": format!("{id}-laptop"),
        "status": status,
        "person_email": email,
        "colo": "FRA",
        "mode": "warp+doh",
        "platform": "linux",
        "version": "2024.6.415.0",
        "timestamp": "2024-07-01T10:00:00Z",
    })
}

pub fn user(id: &str, email: &str) -> Value {
    json!({"id": id, "email": email, "gateway_seat": true, "access_seat": false})
}

pub fn tunnel(id: &str, name: &str, status: &str) -> Value {
    json!({"id": id, "name": name, "status": status})
}

pub fn dex_test(id: &str, kind: &str, avg_ms: f64) -> Value {
    let history = json!({"history": [{"avgMs": avg_ms, "timePeriod": {"value": 1, "units": "hours"}}]});
    let mut test = json!({"id": id, "name": format!("{id}-name"), "kind": kind, "description": "", "host": "1.1.1.1"});
    match kind {
        "http" => test["httpResults"] = json!({"resourceFetchTime": history}),
        _ => test["tracerouteResults"] = json!({"roundTripTime": history}),
    }
    test
}

pub fn traceroute_detail(name: &str, rtt: f64) -> Value {
    let series = |value: f64| {
        json!({"slots": [
            {"timestamp": "2024-07-01T10:00:00Z", "value": value - 1.0},
            {"timestamp": "2024-07-01T10:01:00Z", "value": value},
        ]})
    };
    json!({
        "kind": "traceroute",
        "name": name,
        "host": "1.1.1.1",
        "interval": "minute",
        "tracerouteStats": {
            "roundTripTimeMs": series(rtt),
            "hopsCount": series(8.0),
            "packetLossPct": series(1.0),
            "availabilityPct": series(100.0),
        },
    })
}

pub fn settings(collectors: EnabledCollectors) -> ScrapeSettings {
    ScrapeSettings {
        account_id: "acc".to_string(),
        collectors,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(100),
        },
        scrape_timeout: Duration::from_secs(5),
        detail_concurrency: 0,
        eviction: EvictionPolicy::Retain,
    }
}

pub fn scraper(upstream: Arc<FakeUpstream>, settings: ScrapeSettings) -> Scraper {
    Scraper::new(upstream, Arc::new(MetricRegistry::new().unwrap()), settings)
}

/// Series of one family.
pub fn series(registry: &MetricRegistry, family: &str) -> Vec<(String, f64)> {
    registry
        .snapshot()
        .into_iter()
        .filter(|(identity, _)| identity.starts_with(&format!("{family}{{")))
        .collect()
}
