//! Metric value types and their JSON wire form.

use crate::domain::errors::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a metric, which selects its mutation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time reading, overwritten on update
    Gauge,
    /// Running total, each update adds a delta
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(StoreError::UnsupportedKind(other.to_string())),
        }
    }
}

/// A typed metric value. The variant is the metric's kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse the textual form used by path-parameter updates.
    pub fn parse(kind: MetricKind, id: &str, raw: &str) -> Result<Self, StoreError> {
        let parse_error = || StoreError::ParseError {
            id: id.to_string(),
            kind,
            raw: raw.to_string(),
        };
        match kind {
            MetricKind::Gauge => raw
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(parse_error),
            MetricKind::Counter => raw
                .parse::<i64>()
                .map(MetricValue::Counter)
                .map_err(|_| parse_error()),
        }
    }
}

/// Counters print as integers, gauges with the shortest representation that
/// round-trips to the same `f64`.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{}", v),
            MetricValue::Counter(d) => write!(f, "{}", d),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(id: impl Into<String>, value: MetricValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }

    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self::new(id, MetricValue::Gauge(value))
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self::new(id, MetricValue::Counter(delta))
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// JSON representation of a metric as exchanged between agent and collector
/// and as written to snapshot files.
///
/// `kind` stays a raw string so that an unknown kind is reported as
/// unsupported rather than as malformed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMetric {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl WireMetric {
    /// A read request: identifies a metric without carrying its value.
    pub fn query(id: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            id: id.into(),
            kind: kind.as_str().to_string(),
            delta: None,
            value: None,
            hash: None,
        }
    }

    pub fn parsed_kind(&self) -> Result<MetricKind, StoreError> {
        self.kind.parse()
    }

    /// Convert to the typed model. Fails when the kind is unknown or when the
    /// field matching the kind is absent.
    pub fn to_metric(&self) -> Result<Metric, StoreError> {
        let kind = self.parsed_kind()?;
        let value = match kind {
            MetricKind::Gauge => self.value.map(MetricValue::Gauge),
            MetricKind::Counter => self.delta.map(MetricValue::Counter),
        };
        value
            .map(|value| Metric::new(self.id.clone(), value))
            .ok_or_else(|| StoreError::MissingValue {
                id: self.id.clone(),
                kind,
            })
    }
}

impl From<&Metric> for WireMetric {
    fn from(metric: &Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        Self {
            id: metric.id.clone(),
            kind: metric.kind().as_str().to_string(),
            delta,
            value,
            hash: None,
        }
    }
}

/// Either a single wire metric or an array of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WirePayload {
    Batch(Vec<WireMetric>),
    Single(WireMetric),
}

impl WirePayload {
    pub fn into_batch(self) -> Vec<WireMetric> {
        match self {
            WirePayload::Batch(batch) => batch,
            WirePayload::Single(metric) => vec![metric],
        }
    }
}

/// Serialize metrics as a snapshot document: a JSON array of wire metrics.
pub fn encode_snapshot(metrics: &[Metric]) -> serde_json::Result<Vec<u8>> {
    let wire: Vec<WireMetric> = metrics.iter().map(WireMetric::from).collect();
    serde_json::to_vec(&wire)
}

/// Parse a snapshot document produced by [`encode_snapshot`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Metric>, StoreError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    let wire: Vec<WireMetric> = serde_json::from_slice(bytes)
        .map_err(|e| StoreError::MalformedSnapshot(e.to_string()))?;
    wire.iter().map(WireMetric::to_metric).collect()
}
