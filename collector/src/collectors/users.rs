use super::{
    collector::{
        decode,
        fetch_all,
        null_as_empty,
        publish,
        Collector,
        CollectorFuture,
    },
    devices::{
        DeviceSnapshot,
        DeviceStatus,
    },
};
use crate::{
    context::ScrapeContext,
    error::CollectorResult,
    metrics::{
        names,
        LabelSet,
        MetricSample,
    },
    rendezvous::RendezvousReceiver,
};
use cloudflare_api_client::ResourceKind;
use serde::Deserialize;

/// One Access user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccessUser {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default)]
    pub gateway_seat: Option<bool>,
    #[serde(default)]
    pub access_seat: Option<bool>,
}

impl AccessUser {
    /// The first connected device owned by this user, in ascending device id order.
    pub fn matching_device<'s>(&self, snapshot: &'s DeviceSnapshot) -> Option<&'s DeviceStatus> {
        if self.email.is_empty() {
            return None;
        }
        snapshot.values().find(|device| device.owner_email == self.email)
    }
}

/// Publishes `zerotrust_users_up` for every user that owns a connected device.
///
/// The user listing is fetched while the devices collector is still running; correlation waits for the device
/// snapshot. A closed rendezvous (devices disabled or failed) counts as an empty snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct UsersCollector;

impl UsersCollector {
    pub const NAME: &'static str = "users";
}

impl Collector for UsersCollector {
    type Input = RendezvousReceiver<DeviceSnapshot>;
    type Output = usize;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext, devices: Self::Input) -> CollectorFuture<'a, usize> {
        Box::pin(async move {
            let (items, snapshot) = tokio::join!(fetch_all(ctx, Self::NAME, ResourceKind::Users), devices.recv());
            let snapshot = snapshot.unwrap_or_else(|| {
                debug!("No device snapshot for this scrape, correlating against an empty one");
                DeviceSnapshot::new()
            });

            let users = items?
                .into_iter()
                .map(|item| decode::<AccessUser>("access user", item))
                .collect::<CollectorResult<Vec<_>>>()?;

            let samples = samples(&users, &snapshot)?;
            let published = publish(ctx, &samples)?;
            debug!(users = users.len(), published, "User metrics collected");
            Ok(published)
        })
    }
}

fn seat(value: Option<bool>) -> &'static str {
    if value.unwrap_or(false) {
        "true"
    } else {
        "false"
    }
}

fn samples(users: &[AccessUser], snapshot: &DeviceSnapshot) -> CollectorResult<Vec<MetricSample>> {
    users
        .iter()
        .filter(|user| user.matching_device(snapshot).is_some())
        .map(|user| {
            let labels = LabelSet::from_pairs([
                ("gateway_seat", seat(user.gateway_seat)),
                ("access_seat", seat(user.access_seat)),
                ("user_id", user.id.as_str()),
                ("user_email", user.email.as_str()),
            ])?;
            Ok(MetricSample::new(names::USERS_UP, labels, 1.0))
        })
        .collect()
}
