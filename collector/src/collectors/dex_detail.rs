use super::{
    collector::{
        decode,
        fetch_one,
        null_as_empty,
        publish,
        Collector,
        CollectorFuture,
    },
    dex_tests::TRACEROUTE,
};
use crate::{
    context::ScrapeContext,
    error::CollectorResult,
    metrics::{
        names,
        GaugeFamily,
        LabelSet,
        MetricSample,
    },
};
use cloudflare_api_client::ResourceKind;
use serde::Deserialize;

/// Time series statistics of one traceroute test.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteTestDetail {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub host: String,
    #[serde(default)]
    pub traceroute_stats: Option<TracerouteStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracerouteStats {
    #[serde(default)]
    pub round_trip_time_ms: Series,
    #[serde(default)]
    pub hops_count: Series,
    #[serde(default)]
    pub packet_loss_pct: Series,
    #[serde(default)]
    pub availability_pct: Series,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Slot {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub timestamp: String,
    /// Upstream reports `null` for minutes without data
    #[serde(default)]
    pub value: Option<f64>,
}

impl Series {
    /// The slot with the greatest timestamp among those carrying a value. Timestamps are fixed-width RFC 3339
    /// strings, so comparing them as text orders them in time. On equal timestamps the earlier slot wins.
    pub fn latest(&self) -> Option<&Slot> {
        let with_value = self.slots.iter().filter(|slot| slot.value.is_some());
        with_value.fold(None, |latest, slot| match latest {
            Some(current) if slot.timestamp <= current.timestamp => Some(current),
            _ => Some(slot),
        })
    }
}

impl TracerouteStats {
    fn series(&self) -> [(GaugeFamily, &Series); 4] {
        [
            (names::TRACEROUTE_RTT, &self.round_trip_time_ms),
            (names::TRACEROUTE_HOPS, &self.hops_count),
            (names::TRACEROUTE_PACKET_LOSS, &self.packet_loss_pct),
            (names::TRACEROUTE_AVAILABILITY, &self.availability_pct),
        ]
    }
}

/// What one detail fetch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailOutput {
    pub test_id: String,
    /// Number of gauges published (0 when skipped)
    pub published: usize,
    /// Retries the detail call needed before it succeeded
    pub retries: u32,
    /// The test is not a traceroute test
    pub skipped: bool,
}

/// Fetches one test's minute-resolution statistics and publishes the most recent value of each traceroute series.
/// Run once per test id through the [`FanoutPool`](super::FanoutPool).
#[derive(Debug, Default, Clone, Copy)]
pub struct DexDetailCollector;

impl DexDetailCollector {
    pub const NAME: &'static str = "dex_detail";
}

impl Collector for DexDetailCollector {
    type Input = String;
    type Output = DetailOutput;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn collect<'a>(&'a self, ctx: &'a ScrapeContext, test_id: String) -> CollectorFuture<'a, DetailOutput> {
        Box::pin(async move {
            let fetched = fetch_one(ctx, Self::NAME, ResourceKind::TracerouteTest, &test_id).await?;
            let detail: TracerouteTestDetail = decode("traceroute test", fetched.value)?;

            let mut output = DetailOutput {
                test_id,
                retries: fetched.retries,
                ..Default::default()
            };

            if detail.kind != TRACEROUTE {
                trace!(test_id = %output.test_id, kind = %detail.kind, "Not a traceroute test, skipping");
                output.skipped = true;
                return Ok(output);
            }

            output.published = publish(ctx, &samples(&output.test_id, &detail)?)?;
            Ok(output)
        })
    }
}

/// One sample per series that has at least one slot.
fn samples(test_id: &str, detail: &TracerouteTestDetail) -> CollectorResult<Vec<MetricSample>> {
    let Some(stats) = &detail.traceroute_stats else {
        return Ok(Vec::new());
    };

    let mut samples = Vec::new();
    for (family, series) in stats.series() {
        let Some(value) = series.latest().and_then(|slot| slot.value) else {
            continue;
        };
        let labels = LabelSet::from_pairs([
            ("test_id", test_id),
            ("test_name", detail.name.as_str()),
            ("host", detail.host.as_str()),
        ])?;
        samples.push(MetricSample::new(family, labels, value));
    }
    Ok(samples)
}
