//! Metric names exposed by the exporter.

use super::GaugeFamily;

pub const DEVICES_STATUS: GaugeFamily = GaugeFamily {
    name: "zerotrust_devices_status",
    help: "Connected devices seen in the last few minutes (always 1)",
};

pub const USERS_UP: GaugeFamily = GaugeFamily {
    name: "zerotrust_users_up",
    help: "Users with at least one connected device (always 1)",
};

pub const TUNNELS_UP: GaugeFamily = GaugeFamily {
    name: "zerotrust_tunnels_up",
    help: "Tunnel health (1 = healthy, 0 = anything else)",
};

pub const DEX_TEST_1H_AVG_MS: GaugeFamily = GaugeFamily {
    name: "zerotrust_dex_test_1h_avg_ms",
    help: "Average DEX test latency over the last hour in milliseconds",
};

pub const TRACEROUTE_RTT: GaugeFamily = GaugeFamily {
    name: "zerotrust_traceroute_rtt",
    help: "Most recent traceroute round trip time in milliseconds",
};

pub const TRACEROUTE_HOPS: GaugeFamily = GaugeFamily {
    name: "zerotrust_traceroute_hops",
    help: "Most recent traceroute hop count",
};

pub const TRACEROUTE_PACKET_LOSS: GaugeFamily = GaugeFamily {
    name: "zerotrust_traceroute_packet_loss",
    help: "Most recent traceroute packet loss in percent",
};

pub const TRACEROUTE_AVAILABILITY: GaugeFamily = GaugeFamily {
    name: "zerotrust_traceroute_availability",
    help: "Most recent traceroute availability in percent",
};

pub const EXPORTER_UP: &str = "zerotrust_exporter_up";
pub const SCRAPE_DURATION: &str = "zerotrust_exporter_scrape_duration_seconds";
pub const API_CALLS: &str = "zerotrust_exporter_api_calls_total";
pub const API_ERRORS: &str = "zerotrust_exporter_api_errors_total";
pub const API_RETRIES: &str = "zerotrust_exporter_api_retries_total";
