use super::collector::{
    decode,
    fetch_all,
    null_as_empty,
    publish,
    Collector,
    CollectorFuture,
};
use crate::{
    context::ScrapeContext,
    error::CollectorResult,
    metrics::{
        names,
        LabelSet,
        MetricSample,
    },
};
use cloudflare_api_client::ResourceKind;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Connected devices of one scrape, keyed by device id.
pub type DeviceSnapshot = BTreeMap<String, DeviceStatus>;

const CONNECTED: &str = "connected";

/// One entry of the fleet status device listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceStatus {
    #[serde(rename = "device_id")]
    pub id: String,
    #[serde(rename = "device_name", default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub platform: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub version: String,
    #[serde(rename = "person_email", default, deserialize_with = "null_as_empty")]
    pub owner_email: String,
    /// Point of presence the device was last seen at
    #[serde(default, deserialize_with = "null_as_empty")]
    pub colo: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mode: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub timestamp: String,
}

impl DeviceStatus {
    pub fn is_connected(&self) -> bool {
        self.status == CONNECTED
    }
}

/// Publishes one `zerotrust_devices_status` gauge per connected device and hands the snapshot to the users
/// collector.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevicesCollector;

impl DevicesCollector {
    pub const NAME: &'static str = "devices";
}

impl Collector for DevicesCollector {
    type Input = ();
    type Output = DeviceSnapshot;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext, _input: ()) -> CollectorFuture<'a, DeviceSnapshot> {
        Box::pin(async move {
            let items = fetch_all(ctx, Self::NAME, ResourceKind::Devices).await?;
            let fetched = items.len();

            let devices = items
                .into_iter()
                .map(|item| decode::<DeviceStatus>("device status", item))
                .collect::<CollectorResult<Vec<_>>>()?;
            let snapshot = connected(devices);

            publish(ctx, &samples(&snapshot)?)?;
            debug!(fetched, connected = snapshot.len(), "Device metrics collected");
            Ok(snapshot)
        })
    }
}

fn connected(devices: Vec<DeviceStatus>) -> DeviceSnapshot {
    devices
        .into_iter()
        .filter(DeviceStatus::is_connected)
        .map(|device| (device.id.clone(), device))
        .collect()
}

fn samples(snapshot: &DeviceSnapshot) -> CollectorResult<Vec<MetricSample>> {
    snapshot
        .values()
        .map(|device| {
            let labels = LabelSet::from_pairs([
                ("device_id", device.id.as_str()),
                ("device_name", device.name.as_str()),
                ("user_email", device.owner_email.as_str()),
                ("colo", device.colo.as_str()),
                ("mode", device.mode.as_str()),
                ("platform", device.platform.as_str()),
                ("version", device.version.as_str()),
            ])?;
            Ok(MetricSample::new(names::DEVICES_STATUS, labels, 1.0))
        })
        .collect()
}
