//! # HTTP surface
//!
//! - **`/metrics`**: one full scrape per request, answered with the Prometheus text format. Always 200 unless the
//!   registry itself cannot be serialized.
//! - **`/healthz`**: process liveness.

#[macro_use]
extern crate tracing;

pub mod error;
pub mod router;

use std::{
    future::Future,
    io,
    sync::Arc,
};
use tokio::net::TcpListener;
use zerotrust_exporter_collector::Scraper;

/// Binds `address` and serves until Ctrl-C.
pub async fn run_server(address: &str, scraper: Arc<Scraper>) -> io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "Serving metrics on /metrics");
    serve(listener, scraper, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves. In-flight scrapes are allowed to finish.
pub async fn serve<F>(listener: TcpListener, scraper: Arc<Scraper>, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router::create_router(scraper))
        .with_graceful_shutdown(shutdown)
        .await
}

pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down..."),
        Err(error) => {
            error!(%error, "Cannot listen for Ctrl-C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
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
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use zerotrust_exporter_collector::{
        MetricRegistry,
        RetryPolicy,
        ScrapeSettings,
    };
    use zerotrust_exporter_config::{
        EnabledCollectors,
        EvictionPolicy,
    };

    /// One connected device; tunnels always fail with a terminal error.
    struct Upstream;

    impl UpstreamClient for Upstream {
        fn list<'a>(&'a self, request: ListRequest<'a>) -> UpstreamFuture<'a, Page> {
            Box::pin(async move {
                match request.kind {
                    ResourceKind::Devices => Ok(Page {
                        items: vec![json!({"device_id": "d1", "device_name": "laptop", "status": "connected"})],
                        info: PageInfo {
                            total_pages: 1,
                            ..Default::default()
                        },
                    }),
                    _ => Err(UpstreamError::Unsuccessful {
                        url: "https://api.test/tunnels".to_string(),
                        messages: "forbidden".to_string(),
                    }),
                }
            })
        }

        fn get<'a>(&'a self, _request: GetRequest<'a>) -> UpstreamFuture<'a, serde_json::Value> {
            Box::pin(async { Ok(serde_json::Value::Null) })
        }
    }

    async fn start(collectors: EnabledCollectors) -> (String, oneshot::Sender<()>) {
        let settings = ScrapeSettings {
            account_id: "acc".to_string(),
            collectors,
            retry: RetryPolicy::default(),
            scrape_timeout: Duration::from_secs(5),
            detail_concurrency: 0,
            eviction: EvictionPolicy::Retain,
        };
        let registry = Arc::new(MetricRegistry::new().unwrap());
        let scraper = Arc::new(Scraper::new(Arc::new(Upstream), registry, settings));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (stop, stopped) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, scraper, async {
            let _ = stopped.await;
        }));
        (base, stop)
    }

    #[tokio::test]
    async fn metrics_are_served_as_text() {
        let (base, _stop) = start(EnabledCollectors {
            devices: true,
            ..EnabledCollectors::none()
        })
        .await;

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), 200);
        let content_type = response.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"), "{content_type}");

        let body = response.text().await.unwrap();
        assert!(body.contains("zerotrust_exporter_up 1"), "{body}");
        assert!(body.contains(r#"device_id="d1""#), "{body}");
        assert!(body.contains("zerotrust_exporter_scrape_duration_seconds_count 1"), "{body}");
    }

    #[tokio::test]
    async fn collector_failures_still_answer_200() {
        let (base, _stop) = start(EnabledCollectors {
            devices: true,
            tunnels: true,
            ..EnabledCollectors::none()
        })
        .await;

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), 200);

        let body = response.text().await.unwrap();
        assert!(body.contains("zerotrust_exporter_up 0"), "{body}");
        assert!(body.contains(r#"zerotrust_exporter_api_errors_total{collector="tunnels"} 1"#), "{body}");
        assert!(body.contains(r#"device_id="d1""#), "{body}");
    }

    #[tokio::test]
    async fn healthz_answers_without_scraping() {
        let (base, stop) = start(EnabledCollectors::none()).await;

        let response = reqwest::get(format!("{base}/healthz")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");

        stop.send(()).unwrap();
    }
}
