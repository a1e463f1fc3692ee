//! # Cloudflare API client
//!
//! A small client for the parts of the Cloudflare v4 JSON API the exporter polls.
//!
//! The collectors never talk to `reqwest` directly. They go through the [`UpstreamClient`] trait, which has two
//! operations:
//!
//! - **`list`**: fetch one page of a resource collection (devices, users, tunnels, DEX tests)
//! - **`get`**: fetch one resource by id (a single traceroute test)
//!
//! Both return the raw JSON items; decoding into typed records is the caller's business. Every response is
//! unwrapped from the `{success, errors, messages, result, result_info}` envelope, and non-2xx statuses,
//! `success: false` envelopes and malformed bodies all surface as [`UpstreamError`].

#[macro_use]
extern crate tracing;

mod client;
mod error;
mod resource;

pub use client::CloudflareClient;
pub use error::UpstreamError;
pub use resource::{
    GetRequest,
    ListRequest,
    Page,
    PageInfo,
    Paging,
    ResourceKind,
    TimeWindow,
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
};

/// Boxed future returned by the [`UpstreamClient`] operations.
pub type UpstreamFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UpstreamError>> + Send + 'a>>;

/// One authenticated call against the upstream API per invocation.
pub trait UpstreamClient: Send + Sync {
    /// Fetch a single page of a resource collection.
    fn list<'a>(&'a self, request: ListRequest<'a>) -> UpstreamFuture<'a, Page>;

    /// Fetch a single resource by id.
    fn get<'a>(&'a self, request: GetRequest<'a>) -> UpstreamFuture<'a, serde_json::Value>;
}

impl<T: UpstreamClient + ?Sized> UpstreamClient for Arc<T> {
    fn list<'a>(&'a self, request: ListRequest<'a>) -> UpstreamFuture<'a, Page> {
        (**self).list(request)
    }

    fn get<'a>(&'a self, request: GetRequest<'a>) -> UpstreamFuture<'a, serde_json::Value> {
        (**self).get(request)
    }
}
