//! Metric records and the sinks that receive them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Measurement name for every libvirt record
pub const MEASUREMENT: &str = "libvirt";

/// Stats for one domain from one collection cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub domain: String,

    /// Raw `state.state` value, empty when the dump had none
    pub state: String,

    /// Numeric counters keyed by their dotted name
    pub fields: BTreeMap<String, u64>,
}

impl MetricRecord {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            state: String::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Always exactly `domain` and `state`
    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("domain".to_string(), self.domain.clone()),
            ("state".to_string(), self.state.clone()),
        ])
    }

    pub fn field(&self, key: &str) -> Option<u64> {
        self.fields.get(key).copied()
    }

    /// Hand this record to a sink under the libvirt measurement
    pub fn emit(&self, sink: &dyn MetricSink) {
        sink.add_fields(MEASUREMENT, &self.fields, &self.tags());
    }
}

/// Receives parsed metrics
pub trait MetricSink: Send + Sync {
    fn add_fields(
        &self,
        measurement: &str,
        fields: &BTreeMap<String, u64>,
        tags: &BTreeMap<String, String>,
    );
}

/// A metric as stored by `MemorySink`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, u64>,
    pub received_at: DateTime<Utc>,
}

impl Metric {
    /// Single-line JSON encoding
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `measurement,tag=v,... field=vu,...` in line protocol.
    ///
    /// Empty tag values are left out. Returns `None` for a metric without
    /// fields, which line protocol cannot express.
    pub fn to_line(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }

        let mut line = escape(&self.measurement, MEASUREMENT_SPECIAL);
        for (key, value) in self.tags.iter().filter(|(_, v)| !v.is_empty()) {
            line.push(',');
            line.push_str(&escape(key, KEY_SPECIAL));
            line.push('=');
            line.push_str(&escape(value, KEY_SPECIAL));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{}={v}u", escape(k, KEY_SPECIAL)))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));
        Some(line)
    }
}

const MEASUREMENT_SPECIAL: &[char] = &[',', ' '];
const KEY_SPECIAL: &[char] = &[',', '=', ' '];

/// Backslash-escape line-protocol delimiters
fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// In-memory accumulator
#[derive(Debug, Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<Metric>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far
    pub fn metrics(&self) -> Vec<Metric> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains_measurement(&self, measurement: &str) -> bool {
        self.lock().iter().any(|m| m.measurement == measurement)
    }

    /// First metric under `measurement` whose tags equal `tags`
    pub fn find(&self, measurement: &str, tags: &BTreeMap<String, String>) -> Option<Metric> {
        self.lock()
            .iter()
            .find(|m| m.measurement == measurement && &m.tags == tags)
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Metric>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricSink for MemorySink {
    fn add_fields(
        &self,
        measurement: &str,
        fields: &BTreeMap<String, u64>,
        tags: &BTreeMap<String, String>,
    ) {
        self.lock().push(Metric {
            measurement: measurement.to_string(),
            tags: tags.clone(),
            fields: fields.clone(),
            received_at: Utc::now(),
        });
    }
}
