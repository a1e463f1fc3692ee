//! # Zero Trust scrape engine
//!
//! Everything that happens between "Prometheus asked for `/metrics`" and "the registry is ready to be
//! serialized".
//!
//! ## Architecture
//!
//! - **`retry`**: bounded exponential backoff around a single upstream call
//! - **`metrics`**: the process-wide [`MetricRegistry`], keyed by metric name plus a canonical label set
//! - **`rendezvous`**: the one-shot device snapshot handoff from the devices collector to the users collector
//! - **`collectors`**: one [`Collector`] per resource kind, plus the [`FanoutPool`] for per-test details and the
//!   [`Scraper`] that runs a whole scrape
//!
//! A failing collector never fails the scrape. It bumps the error counter, zeroes the liveness gauge and
//! publishes nothing for its resource kind, while the other collectors carry on.

#[macro_use]
extern crate tracing;

pub mod collectors;
pub mod context;
pub mod error;
pub mod metrics;
pub mod rendezvous;
pub mod retry;

pub use collectors::*;
pub use context::ScrapeContext;
pub use error::{
    CollectorError,
    CollectorResult,
    ScrapeError,
};
pub use metrics::{
    LabelSet,
    MetricError,
    MetricIdentity,
    MetricRegistry,
    MetricSample,
};
pub use retry::{
    RetryError,
    RetryExecutor,
    RetryPolicy,
};
