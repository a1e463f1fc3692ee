//! # Collectors Module
//!
//! One collector per upstream resource kind, and the machinery that runs them for a scrape.
//!
//! ## Architecture
//!
//! - **`Collector` trait**: fetch, decode and publish one resource kind; failure bookkeeping happens in
//!   [`Collector::run`]
//! - **`DevicesCollector`**: connected devices, hands the snapshot to the users collector
//! - **`UsersCollector`**: users that own at least one connected device
//! - **`TunnelsCollector`**: tunnel health
//! - **`DexTestsCollector`**: DEX tests and their 1 hour average latency; yields the test ids
//! - **`DexDetailCollector`**: latest traceroute statistics of one test, run through the **`FanoutPool`**
//! - **`Scraper`**: starts the enabled collectors for one scrape and waits for all of them
//!
//! ## Data Sources
//!
//! Everything is read through the [`UpstreamClient`](cloudflare_api_client::UpstreamClient), each call wrapped in
//! the scrape's [`RetryExecutor`](crate::RetryExecutor).

mod collector;
mod devices;
mod dex_detail;
mod fanout;
mod orchestrator;
mod tunnels;
mod users;

pub use collector::{
    Collector,
    CollectorFuture,
};
pub use devices::{
    DeviceSnapshot,
    DeviceStatus,
    DevicesCollector,
};
pub use dex_detail::{
    DetailOutput,
    DexDetailCollector,
    TracerouteTestDetail,
};
pub use dex_tests::{
    DexTest,
    DexTestsCollector,
};
pub use fanout::{
    FanoutPool,
    FanoutReport,
};
pub use orchestrator::{
    CollectorStatus,
    ScrapePhase,
    ScrapeReport,
    ScrapeSettings,
    Scraper,
};
pub use tunnels::{
    Tunnel,
    TunnelsCollector,
};
pub use users::{
    AccessUser,
    UsersCollector,
};
