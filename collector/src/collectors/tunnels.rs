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

const HEALTHY: &str = "healthy";

/// One Cloudflare Tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Tunnel {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub status: String,
}

impl Tunnel {
    pub fn is_healthy(&self) -> bool {
        self.status == HEALTHY
    }
}

/// Publishes `zerotrust_tunnels_up`: 1 for healthy tunnels, 0 for degraded, down or inactive ones.
#[derive(Debug, Default, Clone, Copy)]
pub struct TunnelsCollector;

impl TunnelsCollector {
    pub const NAME: &'static str = "tunnels";
}

impl Collector for TunnelsCollector {
    type Input = ();
    type Output = usize;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext, _input: ()) -> CollectorFuture<'a, usize> {
        Box::pin(async move {
            let tunnels = fetch_all(ctx, Self::NAME, ResourceKind::Tunnels)
                .await?
                .into_iter()
                .map(|item| decode::<Tunnel>("tunnel", item))
                .collect::<CollectorResult<Vec<_>>>()?;

            let published = publish(ctx, &samples(&tunnels)?)?;
            debug!(
                tunnels = published,
                healthy = tunnels.iter().filter(|tunnel| tunnel.is_healthy()).count(),
                "Tunnel metrics collected"
            );
            Ok(published)
        })
    }
}

fn samples(tunnels: &[Tunnel]) -> CollectorResult<Vec<MetricSample>> {
    tunnels
        .iter()
        .map(|tunnel| {
            let labels = LabelSet::from_pairs([("id", tunnel.id.as_str()), ("name", tunnel.name.as_str())])?;
            let value = if tunnel.is_healthy() { 1.0 } else { 0.0 };
            Ok(MetricSample::new(names::TUNNELS_UP, labels, value))
        })
        .collect()
}
