//! Canonical metric model
//!
//! Mirrors the OTLP metric data kinds with owned, serializable fields. These
//! are the payload bodies of `metric_record` events.

use serde::{Serialize, Serializer};

use crate::otlp::attributes::{Attributes, is_zero};

/// `f64` that serializes non-finite values as strings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float(pub f64);

impl Serialize for Float {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.is_finite() {
            serializer.serialize_f64(self.0)
        } else {
            serializer.serialize_str(&self.0.to_string())
        }
    }
}

/// One metric, as emitted in a `metric_record` payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    /// Metric name
    pub name: String,
    /// Metric description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Metric unit
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit: String,
    /// Typed data
    pub data: MetricData,
}

impl MetricRecord {
    /// Latest data point time, used as the event timestamp
    pub fn latest_time_unix_nano(&self) -> u64 {
        match &self.data {
            MetricData::Gauge { data_points } | MetricData::Sum { data_points, .. } => {
                data_points.iter().map(|p| p.time_unix_nano).max()
            }
            MetricData::Histogram { data_points, .. } => {
                data_points.iter().map(|p| p.time_unix_nano).max()
            }
            MetricData::ExponentialHistogram { data_points, .. } => {
                data_points.iter().map(|p| p.time_unix_nano).max()
            }
            MetricData::Summary { data_points } => {
                data_points.iter().map(|p| p.time_unix_nano).max()
            }
            MetricData::Unknown => None,
        }
        .unwrap_or(0)
    }

    /// Total number of data points
    pub fn data_point_count(&self) -> usize {
        match &self.data {
            MetricData::Gauge { data_points } | MetricData::Sum { data_points, .. } => {
                data_points.len()
            }
            MetricData::Histogram { data_points, .. } => data_points.len(),
            MetricData::ExponentialHistogram { data_points, .. } => data_points.len(),
            MetricData::Summary { data_points } => data_points.len(),
            MetricData::Unknown => 0,
        }
    }
}

/// Metric data by kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricData {
    /// Last-value samples
    Gauge {
        /// Data points
        data_points: Vec<NumberDataPoint>,
    },
    /// Sums over time
    Sum {
        /// Data points
        data_points: Vec<NumberDataPoint>,
        /// Delta or cumulative
        aggregation_temporality: Temporality,
        /// Whether the sum only grows
        is_monotonic: bool,
    },
    /// Explicit-bucket histogram
    Histogram {
        /// Data points
        data_points: Vec<HistogramDataPoint>,
        /// Delta or cumulative
        aggregation_temporality: Temporality,
    },
    /// Base-2 exponential histogram
    ExponentialHistogram {
        /// Data points
        data_points: Vec<ExponentialHistogramDataPoint>,
        /// Delta or cumulative
        aggregation_temporality: Temporality,
    },
    /// Quantile summary
    Summary {
        /// Data points
        data_points: Vec<SummaryDataPoint>,
    },
    /// Data kind not set or not recognised
    Unknown,
}

/// Aggregation temporality; unknown values pass through as raw integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporality {
    /// 0
    Unspecified,
    /// 1
    Delta,
    /// 2
    Cumulative,
    /// Anything else
    Unknown(i32),
}

impl From<i32> for Temporality {
    fn from(raw: i32) -> Self {
        match raw {
            0 => Temporality::Unspecified,
            1 => Temporality::Delta,
            2 => Temporality::Cumulative,
            other => Temporality::Unknown(other),
        }
    }
}

impl Serialize for Temporality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Temporality::Unspecified => serializer.serialize_str("unspecified"),
            Temporality::Delta => serializer.serialize_str("delta"),
            Temporality::Cumulative => serializer.serialize_str("cumulative"),
            Temporality::Unknown(raw) => serializer.serialize_i32(*raw),
        }
    }
}

/// Integer or double sample value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberValue {
    /// Integer value
    Int(i64),
    /// Double value
    Double(f64),
}

impl Serialize for NumberValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NumberValue::Int(i) => serializer.serialize_i64(*i),
            NumberValue::Double(d) => Float(*d).serialize(serializer),
        }
    }
}

/// Sample linked to a trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exemplar {
    /// Attributes filtered out of the data point
    pub filtered_attributes: Attributes,
    /// Nanoseconds since epoch
    pub time_unix_nano: u64,
    /// Sample value
    pub value: Option<NumberValue>,
    /// Hex trace id, if recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Hex span id, if recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

/// Gauge or sum sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberDataPoint {
    /// Point attributes
    pub attributes: Attributes,
    /// Nanoseconds since epoch; 0 when unset
    pub start_time_unix_nano: u64,
    /// Nanoseconds since epoch
    pub time_unix_nano: u64,
    /// Value, absent when the sender left it unset
    pub value: Option<NumberValue>,
    /// Exemplars
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<Exemplar>,
    /// Data point flags
    #[serde(skip_serializing_if = "is_zero")]
    pub flags: u32,
}

/// Explicit-bucket histogram sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramDataPoint {
    /// Point attributes
    pub attributes: Attributes,
    /// Nanoseconds since epoch; 0 when unset
    pub start_time_unix_nano: u64,
    /// Nanoseconds since epoch
    pub time_unix_nano: u64,
    /// Number of samples
    pub count: u64,
    /// Sum of samples
    pub sum: Option<Float>,
    /// Per-bucket counts
    pub bucket_counts: Vec<u64>,
    /// Bucket upper bounds
    pub explicit_bounds: Vec<Float>,
    /// Smallest sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Float>,
    /// Largest sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Float>,
    /// Exemplars
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<Exemplar>,
    /// Data point flags
    #[serde(skip_serializing_if = "is_zero")]
    pub flags: u32,
}

/// One side of an exponential histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExponentialBuckets {
    /// Index of the first bucket
    pub offset: i32,
    /// Per-bucket counts
    pub bucket_counts: Vec<u64>,
}

/// Exponential histogram sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExponentialHistogramDataPoint {
    /// Point attributes
    pub attributes: Attributes,
    /// Nanoseconds since epoch; 0 when unset
    pub start_time_unix_nano: u64,
    /// Nanoseconds since epoch
    pub time_unix_nano: u64,
    /// Number of samples
    pub count: u64,
    /// Sum of samples
    pub sum: Option<Float>,
    /// Resolution
    pub scale: i32,
    /// Samples in the zero bucket
    pub zero_count: u64,
    /// Width of the zero bucket
    pub zero_threshold: Float,
    /// Positive buckets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive: Option<ExponentialBuckets>,
    /// Negative buckets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative: Option<ExponentialBuckets>,
    /// Smallest sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Float>,
    /// Largest sample
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Float>,
    /// Exemplars
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exemplars: Vec<Exemplar>,
    /// Data point flags
    #[serde(skip_serializing_if = "is_zero")]
    pub flags: u32,
}

/// Quantile value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValueAtQuantile {
    /// Quantile in [0, 1]
    pub quantile: Float,
    /// Value at that quantile
    pub value: Float,
}

/// Summary sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDataPoint {
    /// Point attributes
    pub attributes: Attributes,
    /// Nanoseconds since epoch; 0 when unset
    pub start_time_unix_nano: u64,
    /// Nanoseconds since epoch
    pub time_unix_nano: u64,
    /// Number of samples
    pub count: u64,
    /// Sum of samples
    pub sum: Float,
    /// Quantiles
    pub quantile_values: Vec<ValueAtQuantile>,
    /// Data point flags
    #[serde(skip_serializing_if = "is_zero")]
    pub flags: u32,
}
