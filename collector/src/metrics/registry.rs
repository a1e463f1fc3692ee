use super::{
    names,
    GaugeFamily,
    LabelSet,
    MetricError,
    MetricIdentity,
    MetricSample,
};
use prometheus::{
    core::Collector as _,
    Encoder,
    Gauge,
    GaugeVec,
    Histogram,
    HistogramOpts,
    IntCounterVec,
    Opts,
    Registry,
    TextEncoder,
};
use std::{
    collections::{
        hash_map::Entry,
        BTreeMap,
        HashMap,
    },
    sync::{
        Mutex,
        PoisonError,
    },
    time::Duration,
};

const SCRAPE_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 60.0];

struct GaugeFamilyVec {
    label_names: Vec<String>,
    vec: GaugeVec,
}

/// Thread-safe registry behind `/metrics`.
///
/// Dynamic gauge families are created on first use with the label keys of that first identity; later
/// identities of the same family must use the same keys.
pub struct MetricRegistry {
    registry: Registry,
    gauges: Mutex<HashMap<&'static str, GaugeFamilyVec>>,
    up: Gauge,
    scrape_duration: Histogram,
    api_calls: IntCounterVec,
    api_errors: IntCounterVec,
    api_retries: IntCounterVec,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry").finish_non_exhaustive()
    }
}

impl MetricRegistry {
    pub fn new() -> Result<Self, MetricError> {
        let registry = Registry::new();

        let up = Gauge::with_opts(Opts::new(
            names::EXPORTER_UP,
            "Whether the last scrape finished without upstream errors (1 = yes, 0 = no)",
        ))?;
        up.set(1.0);
        registry.register(Box::new(up.clone()))?;

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(names::SCRAPE_DURATION, "Time spent answering a scrape")
                .buckets(SCRAPE_DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(scrape_duration.clone()))?;

        let api_calls = IntCounterVec::new(
            Opts::new(names::API_CALLS, "Upstream API requests issued"),
            &["collector"],
        )?;
        registry.register(Box::new(api_calls.clone()))?;

        let api_errors = IntCounterVec::new(
            Opts::new(names::API_ERRORS, "Collector runs that failed"),
            &["collector"],
        )?;
        registry.register(Box::new(api_errors.clone()))?;

        let api_retries = IntCounterVec::new(
            Opts::new(names::API_RETRIES, "Upstream API requests that were retried"),
            &["collector"],
        )?;
        registry.register(Box::new(api_retries.clone()))?;

        Ok(Self {
            registry,
            gauges: Mutex::new(HashMap::new()),
            up,
            scrape_duration,
            api_calls,
            api_errors,
            api_retries,
        })
    }

    /// Returns the gauge for `identity`, creating its family and series on first use.
    ///
    /// Calling this twice with equal identities yields handles to the same series.
    pub fn get_or_create_gauge(&self, identity: &MetricIdentity) -> Result<Gauge, MetricError> {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        self.gauge_locked(&mut gauges, identity)
    }

    /// Sets every sample, or none of them if any identity is inconsistent with its family.
    pub fn publish(&self, samples: &[MetricSample]) -> Result<usize, MetricError> {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);

        let mut pending: HashMap<&'static str, Vec<&str>> = HashMap::new();
        for sample in samples {
            let name = sample.identity.family.name;
            let found = sample.identity.labels.label_names();
            let expected: Vec<&str> = match gauges.get(name) {
                Some(family) => family.label_names.iter().map(String::as_str).collect(),
                None => pending.entry(name).or_insert_with(|| found.clone()).clone(),
            };
            if expected != found {
                return Err(label_mismatch(name, &expected, &found));
            }
        }

        for sample in samples {
            self.gauge_locked(&mut gauges, &sample.identity)?.set(sample.value);
        }
        Ok(samples.len())
    }

    fn gauge_locked(
        &self,
        gauges: &mut HashMap<&'static str, GaugeFamilyVec>,
        identity: &MetricIdentity,
    ) -> Result<Gauge, MetricError> {
        let family = match gauges.entry(identity.family.name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.register_family(identity.family, &identity.labels)?),
        };

        let found = identity.labels.label_names();
        let expected: Vec<&str> = family.label_names.iter().map(String::as_str).collect();
        if expected != found {
            return Err(label_mismatch(identity.family.name, &expected, &found));
        }

        Ok(family.vec.get_metric_with(&identity.labels.as_map())?)
    }

    fn register_family(&self, family: GaugeFamily, labels: &LabelSet) -> Result<GaugeFamilyVec, MetricError> {
        let label_names = labels.label_names();
        let vec = GaugeVec::new(Opts::new(family.name, family.help), &label_names)?;
        self.registry.register(Box::new(vec.clone()))?;
        debug!(metric = family.name, ?label_names, "registered gauge family");
        Ok(GaugeFamilyVec {
            label_names: label_names.into_iter().map(str::to_string).collect(),
            vec,
        })
    }

    pub fn set_gauge(&self, identity: &MetricIdentity, value: f64) -> Result<(), MetricError> {
        self.get_or_create_gauge(identity)?.set(value);
        Ok(())
    }

    /// Drops every dynamic gauge series. Families stay registered.
    pub fn reset_dynamic(&self) {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        for family in gauges.values() {
            family.vec.reset();
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.set(if up { 1.0 } else { 0.0 });
    }

    pub fn is_up(&self) -> bool {
        self.up.get() > 0.0
    }

    pub fn observe_scrape_duration(&self, elapsed: Duration) {
        self.scrape_duration.observe(elapsed.as_secs_f64());
    }

    pub fn scrape_count(&self) -> u64 {
        self.scrape_duration.get_sample_count()
    }

    pub fn record_api_call(&self, collector: &str) {
        self.api_calls.with_label_values(&[collector]).inc();
    }

    pub fn record_api_error(&self, collector: &str) {
        self.api_errors.with_label_values(&[collector]).inc();
    }

    pub fn record_retries(&self, collector: &str, retries: u32) {
        if retries > 0 {
            self.api_retries.with_label_values(&[collector]).inc_by(u64::from(retries));
        }
    }

    pub fn api_calls(&self, collector: &str) -> u64 {
        self.api_calls.with_label_values(&[collector]).get()
    }

    pub fn api_errors(&self, collector: &str) -> u64 {
        self.api_errors.with_label_values(&[collector]).get()
    }

    pub fn api_retries(&self, collector: &str) -> u64 {
        self.api_retries.with_label_values(&[collector]).get()
    }

    pub fn api_calls_total(&self) -> u64 {
        counter_total(&self.api_calls)
    }

    pub fn api_errors_total(&self) -> u64 {
        counter_total(&self.api_errors)
    }

    /// Every dynamic gauge series as `name{sorted labels}` → value.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = BTreeMap::new();

        for family in gauges.values() {
            for metric_family in family.vec.collect() {
                for metric in metric_family.get_metric() {
                    let mut labels = LabelSet::new();
                    for pair in metric.get_label() {
                        // The prometheus client rejects duplicate label names, so this cannot fail.
                        let _ = labels.insert(pair.get_name(), pair.get_value());
                    }
                    snapshot.insert(
                        format!("{}{}", metric_family.get_name(), labels),
                        metric.get_gauge().get_value(),
                    );
                }
            }
        }

        snapshot
    }

    /// Text exposition of everything registered.
    pub fn encode(&self) -> Result<String, MetricError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn label_mismatch(name: &'static str, expected: &[&str], found: &[&str]) -> MetricError {
    MetricError::LabelMismatch {
        name,
        expected: expected.iter().map(|label| label.to_string()).collect(),
        found: found.iter().map(|label| label.to_string()).collect(),
    }
}

fn counter_total(vec: &IntCounterVec) -> u64 {
    vec.collect()
        .iter()
        .flat_map(|family| family.get_metric())
        .map(|metric| metric.get_counter().get_value() as u64)
        .sum()
}
