use chrono::{
    DateTime,
    SecondsFormat,
    Utc,
};
use serde::Deserialize;

/// Page size used for every list call.
pub const PER_PAGE: u32 = 50;

/// The upstream resource collections the exporter knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    Devices,
    Users,
    Tunnels,
    DexTests,
    TracerouteTest,
}

impl ResourceKind {
    /// Path relative to the API base url.
    pub fn path(&self, account_id: &str, resource_id: Option<&str>) -> String {
        let collection = match self {
            ResourceKind::Devices => "dex/fleet-status/devices",
            ResourceKind::Users => "access/users",
            ResourceKind::Tunnels => "cfd_tunnel",
            ResourceKind::DexTests => "dex/tests",
            ResourceKind::TracerouteTest => "dex/traceroute-tests",
        };
        match resource_id {
            Some(id) => format!("accounts/{account_id}/{collection}/{id}"),
            None => format!("accounts/{account_id}/{collection}"),
        }
    }

    /// Fixed query parameters sent with every request for this kind.
    pub fn extra_query(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ResourceKind::Devices => &[("sort_by", "device_id"), ("status", "connected"), ("source", "last_seen")],
            ResourceKind::Tunnels => &[("is_deleted", "false")],
            ResourceKind::TracerouteTest => &[("interval", "minute")],
            ResourceKind::Users | ResourceKind::DexTests => &[],
        }
    }

    /// Names of the (start, end) query parameters, for kinds that take a time window.
    pub fn window_params(&self) -> Option<(&'static str, &'static str)> {
        match self {
            ResourceKind::Devices => Some(("time_start", "time_end")),
            ResourceKind::DexTests | ResourceKind::TracerouteTest => Some(("timeStart", "timeEnd")),
            ResourceKind::Users | ResourceKind::Tunnels => None,
        }
    }

    /// How far back the default window reaches.
    pub fn default_window(&self) -> Option<chrono::Duration> {
        match self {
            ResourceKind::Devices => Some(chrono::Duration::minutes(3)),
            ResourceKind::DexTests | ResourceKind::TracerouteTest => Some(chrono::Duration::hours(1)),
            ResourceKind::Users | ResourceKind::Tunnels => None,
        }
    }

    /// Key under `result` holding the item array, when `result` is not the array itself.
    pub fn items_key(&self) -> Option<&'static str> {
        match self {
            ResourceKind::DexTests => Some("tests"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The window of `length` ending at `end`.
    pub fn trailing(length: chrono::Duration, end: DateTime<Utc>) -> Self {
        Self {
            start: end - length,
            end,
        }
    }

    fn format(time: &DateTime<Utc>) -> String {
        time.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: PER_PAGE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListRequest<'a> {
    pub kind: ResourceKind,
    pub account_id: &'a str,
    pub paging: Paging,
    pub window: Option<TimeWindow>,
}

impl<'a> ListRequest<'a> {
    /// First page with the kind's default time window ending now.
    pub fn new(kind: ResourceKind, account_id: &'a str) -> Self {
        Self {
            kind,
            account_id,
            paging: Paging::default(),
            window: kind.default_window().map(|length| TimeWindow::trailing(length, Utc::now())),
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.paging.page = page;
        self
    }

    pub(crate) fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![
            ("per_page".to_string(), self.paging.per_page.to_string()),
            ("page".to_string(), self.paging.page.to_string()),
        ];
        query.extend(window_query(self.kind, self.window.as_ref()));
        query.extend(static_query(self.kind));
        query
    }
}

#[derive(Debug, Clone)]
pub struct GetRequest<'a> {
    pub kind: ResourceKind,
    pub account_id: &'a str,
    pub resource_id: &'a str,
    pub window: Option<TimeWindow>,
}

impl<'a> GetRequest<'a> {
    pub fn new(kind: ResourceKind, account_id: &'a str, resource_id: &'a str) -> Self {
        Self {
            kind,
            account_id,
            resource_id,
            window: kind.default_window().map(|length| TimeWindow::trailing(length, Utc::now())),
        }
    }

    pub(crate) fn query(&self) -> Vec<(String, String)> {
        let mut query = window_query(self.kind, self.window.as_ref());
        query.extend(static_query(self.kind));
        query
    }
}

fn window_query(kind: ResourceKind, window: Option<&TimeWindow>) -> Vec<(String, String)> {
    match (kind.window_params(), window) {
        (Some((start, end)), Some(window)) => vec![
            (end.to_string(), TimeWindow::format(&window.end)),
            (start.to_string(), TimeWindow::format(&window.start)),
        ],
        _ => Vec::new(),
    }
}

fn static_query(kind: ResourceKind) -> impl Iterator<Item = (String, String)> {
    kind.extra_query()
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
}

/// One page of raw items.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<serde_json::Value>,
    pub info: PageInfo,
}

/// The `result_info` block of a list response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub total_pages: u32,
}

impl PageInfo {
    /// Whether `page` is the final page. A response without pagination info is a single page.
    pub fn is_last(&self, page: u32) -> bool {
        page >= self.total_pages
    }
}
