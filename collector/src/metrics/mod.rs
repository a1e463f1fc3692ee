//! # Metrics Module
//!
//! The metric registry shared by every collector of every scrape.
//!
//! ## Key Components
//!
//! - **`LabelSet`** / **`MetricIdentity`**: a metric name plus labels with unique, sorted keys
//! - **`MetricRegistry`**: get-or-create gauges by identity, exporter self-metrics, text exposition
//! - **`names`**: every metric name the exporter publishes
//!
//! ## Retention
//!
//! Gauge identities accumulate across scrapes and keep their latest value. Nothing is evicted unless the
//! registry is told to [`reset_dynamic`](MetricRegistry::reset_dynamic), which the scraper does before each
//! scrape when the `reset-per-scrape` eviction policy is configured.

mod labels;
pub mod names;
mod registry;

pub use labels::{
    GaugeFamily,
    LabelSet,
    MetricIdentity,
    MetricSample,
};
pub use registry::MetricRegistry;

#[derive(thiserror::Error, Debug)]
pub enum MetricError {
    #[error("Label {0:?} appears more than once")]
    DuplicateLabel(String),
    #[error("Metric {name} is registered with labels {expected:?} but was used with {found:?}")]
    LabelMismatch {
        name: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
    #[error("Exposition output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}
