use super::MetricError;
use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    fmt,
};

/// Name and help text of a dynamically labelled gauge family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GaugeFamily {
    pub name: &'static str,
    pub help: &'static str,
}

/// Label key/value pairs with unique keys, kept sorted so that insertion order never affects identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Deref)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, MetricError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut labels = Self::new();
        for (key, value) in pairs {
            labels.insert(key, value)?;
        }
        Ok(labels)
    }

    /// Adds a label, rejecting a key that is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), MetricError> {
        let key = key.into();
        if self.0.contains_key(&key) {
            return Err(MetricError::DuplicateLabel(key));
        }
        self.0.insert(key, value.into());
        Ok(())
    }

    pub fn label_names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub(crate) fn as_map(&self) -> HashMap<&str, &str> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str())).collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, (key, value)) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}=\"")?;
            for c in value.chars() {
                match c {
                    '\\' => f.write_str("\\\\")?,
                    '"' => f.write_str("\\\"")?,
                    '\n' => f.write_str("\\n")?,
                    c => write!(f, "{c}")?,
                }
            }
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

/// Metric name plus canonical label set: the key of one time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricIdentity {
    pub family: GaugeFamily,
    pub labels: LabelSet,
}

impl MetricIdentity {
    pub fn new(family: GaugeFamily, labels: LabelSet) -> Self {
        Self { family, labels }
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family.name, self.labels)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub identity: MetricIdentity,
    pub value: f64,
}

impl MetricSample {
    pub fn new(family: GaugeFamily, labels: LabelSet, value: f64) -> Self {
        Self {
            identity: MetricIdentity::new(family, labels),
            value,
        }
    }
}
