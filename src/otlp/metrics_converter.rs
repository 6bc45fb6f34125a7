//! Metric converter
//!
//! One `metric_record` event per `Metric`, carrying every data point of that
//! metric. All five OTLP data kinds are mapped; a metric with no data set is
//! emitted with `type: "unknown"` rather than dropped.

use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::metrics::v1::{
    Exemplar as ProtoExemplar,
    ExponentialHistogramDataPoint as ProtoExponentialHistogramDataPoint,
    HistogramDataPoint as ProtoHistogramDataPoint, Metric, NumberDataPoint as ProtoNumberDataPoint,
    SummaryDataPoint as ProtoSummaryDataPoint, exemplar, exponential_histogram_data_point, metric,
    number_data_point,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ConversionError;
use crate::event::{EventIdGenerator, EventType, TelemetryEvent, timestamp_from_nanos};
use crate::otlp::attributes::{Attributes, Resource, Scope};
use crate::otlp::metrics_data::*;
use crate::otlp::span::optional_id_hex;
use crate::otlp::{Conversion, RejectedRecord};

#[derive(Serialize)]
struct MetricPayload<'a> {
    #[serde(flatten)]
    metric: &'a MetricRecord,
    resource_attributes: &'a Attributes,
    scope: &'a Scope,
}

/// Convert a metrics export request into canonical events
pub fn convert_metrics(
    request: &ExportMetricsServiceRequest,
    ids: &mut EventIdGenerator,
) -> Conversion {
    let mut conversion = Conversion::default();

    for (ri, resource_metrics) in request.resource_metrics.iter().enumerate() {
        let resource = Resource::from_proto(resource_metrics.resource.as_ref());

        for (si, scope_metrics) in resource_metrics.scope_metrics.iter().enumerate() {
            let scope = Scope::from_proto(scope_metrics.scope.as_ref());

            for (mi, proto_metric) in scope_metrics.metrics.iter().enumerate() {
                conversion.record_count += 1;
                let result = proto_metric_to_record(proto_metric)
                    .and_then(|record| metric_event(&record, &scope, &resource, ids));
                match result {
                    Ok(event) => conversion.events.push(event),
                    Err(error) => {
                        let location =
                            format!("resource_metrics[{ri}].scope_metrics[{si}].metrics[{mi}]");
                        warn!(
                            location = %location,
                            metric = %proto_metric.name,
                            code = error.code(),
                            error = %error,
                            "Rejected metric"
                        );
                        conversion.rejected.push(RejectedRecord { location, error });
                    }
                }
            }
        }
    }

    debug!(
        metrics = conversion.record_count,
        events = conversion.events.len(),
        rejected = conversion.rejected.len(),
        "Converted metrics export request"
    );

    conversion
}

fn metric_event(
    record: &MetricRecord,
    scope: &Scope,
    resource: &Resource,
    ids: &mut EventIdGenerator,
) -> Result<TelemetryEvent, ConversionError> {
    let payload = MetricPayload {
        metric: record,
        resource_attributes: &resource.attributes,
        scope,
    };
    Ok(TelemetryEvent::new(
        ids.next_id(),
        EventType::MetricRecord,
        serde_json::to_value(&payload)?,
    )
    .with_timestamp(timestamp_from_nanos(record.latest_time_unix_nano())))
}

/// Map a wire metric into the canonical model
pub fn proto_metric_to_record(metric: &Metric) -> Result<MetricRecord, ConversionError> {
    let data = match &metric.data {
        Some(metric::Data::Gauge(gauge)) => MetricData::Gauge {
            data_points: gauge
                .data_points
                .iter()
                .map(number_point)
                .collect::<Result<_, _>>()?,
        },
        Some(metric::Data::Sum(sum)) => MetricData::Sum {
            data_points: sum
                .data_points
                .iter()
                .map(number_point)
                .collect::<Result<_, _>>()?,
            aggregation_temporality: Temporality::from(sum.aggregation_temporality),
            is_monotonic: sum.is_monotonic,
        },
        Some(metric::Data::Histogram(histogram)) => MetricData::Histogram {
            data_points: histogram
                .data_points
                .iter()
                .map(histogram_point)
                .collect::<Result<_, _>>()?,
            aggregation_temporality: Temporality::from(histogram.aggregation_temporality),
        },
        Some(metric::Data::ExponentialHistogram(histogram)) => MetricData::ExponentialHistogram {
            data_points: histogram
                .data_points
                .iter()
                .map(exponential_point)
                .collect::<Result<_, _>>()?,
            aggregation_temporality: Temporality::from(histogram.aggregation_temporality),
        },
        Some(metric::Data::Summary(summary)) => MetricData::Summary {
            data_points: summary.data_points.iter().map(summary_point).collect(),
        },
        #[allow(unreachable_patterns)]
        _ => MetricData::Unknown,
    };

    Ok(MetricRecord {
        name: metric.name.clone(),
        description: metric.description.clone(),
        unit: metric.unit.clone(),
        data,
    })
}

fn number_point(point: &ProtoNumberDataPoint) -> Result<NumberDataPoint, ConversionError> {
    let value = match point.value {
        Some(number_data_point::Value::AsInt(i)) => Some(NumberValue::Int(i)),
        Some(number_data_point::Value::AsDouble(d)) => Some(NumberValue::Double(d)),
        None => None,
    };
    Ok(NumberDataPoint {
        attributes: Attributes::from_proto(&point.attributes),
        start_time_unix_nano: point.start_time_unix_nano,
        time_unix_nano: point.time_unix_nano,
        value,
        exemplars: exemplars(&point.exemplars)?,
        flags: point.flags,
    })
}

fn histogram_point(point: &ProtoHistogramDataPoint) -> Result<HistogramDataPoint, ConversionError> {
    Ok(HistogramDataPoint {
        attributes: Attributes::from_proto(&point.attributes),
        start_time_unix_nano: point.start_time_unix_nano,
        time_unix_nano: point.time_unix_nano,
        count: point.count,
        sum: point.sum.map(Float),
        bucket_counts: point.bucket_counts.clone(),
        explicit_bounds: point.explicit_bounds.iter().copied().map(Float).collect(),
        min: point.min.map(Float),
        max: point.max.map(Float),
        exemplars: exemplars(&point.exemplars)?,
        flags: point.flags,
    })
}

fn exponential_point(
    point: &ProtoExponentialHistogramDataPoint,
) -> Result<ExponentialHistogramDataPoint, ConversionError> {
    let buckets = |b: &exponential_histogram_data_point::Buckets| ExponentialBuckets {
        offset: b.offset,
        bucket_counts: b.bucket_counts.clone(),
    };
    Ok(ExponentialHistogramDataPoint {
        attributes: Attributes::from_proto(&point.attributes),
        start_time_unix_nano: point.start_time_unix_nano,
        time_unix_nano: point.time_unix_nano,
        count: point.count,
        sum: point.sum.map(Float),
        scale: point.scale,
        zero_count: point.zero_count,
        zero_threshold: Float(point.zero_threshold),
        positive: point.positive.as_ref().map(buckets),
        negative: point.negative.as_ref().map(buckets),
        min: point.min.map(Float),
        max: point.max.map(Float),
        exemplars: exemplars(&point.exemplars)?,
        flags: point.flags,
    })
}

fn summary_point(point: &ProtoSummaryDataPoint) -> SummaryDataPoint {
    SummaryDataPoint {
        attributes: Attributes::from_proto(&point.attributes),
        start_time_unix_nano: point.start_time_unix_nano,
        time_unix_nano: point.time_unix_nano,
        count: point.count,
        sum: Float(point.sum),
        quantile_values: point
            .quantile_values
            .iter()
            .map(|q| ValueAtQuantile {
                quantile: Float(q.quantile),
                value: Float(q.value),
            })
            .collect(),
        flags: point.flags,
    }
}

fn exemplars(exemplars: &[ProtoExemplar]) -> Result<Vec<Exemplar>, ConversionError> {
    exemplars
        .iter()
        .map(|e| {
            let value = match e.value {
                Some(exemplar::Value::AsInt(i)) => Some(NumberValue::Int(i)),
                Some(exemplar::Value::AsDouble(d)) => Some(NumberValue::Double(d)),
                None => None,
            };
            Ok(Exemplar {
                filtered_attributes: Attributes::from_proto(&e.filtered_attributes),
                time_unix_nano: e.time_unix_nano,
                value,
                trace_id: optional_id_hex(&e.trace_id, 16)?,
                span_id: optional_id_hex(&e.span_id, 8)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::metrics::v1::{Gauge, Sum};

    #[test]
    fn test_sum_maps_temporality() {
        let metric = Metric {
            name: "requests".to_string(),
            unit: "1".to_string(),
            data: Some(metric::Data::Sum(Sum {
                data_points: vec![ProtoNumberDataPoint {
                    time_unix_nano: 5,
                    value: Some(number_data_point::Value::AsInt(3)),
                    ..Default::default()
                }],
                aggregation_temporality: 2,
                is_monotonic: true,
            })),
            ..Default::default()
        };

        let record = proto_metric_to_record(&metric).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["data"]["type"], "sum");
        assert_eq!(json["data"]["aggregation_temporality"], "cumulative");
        assert_eq!(json["data"]["data_points"][0]["value"], 3);
        assert_eq!(record.latest_time_unix_nano(), 5);
    }

    #[test]
    fn test_missing_data_is_unknown() {
        let metric = Metric {
            name: "empty".to_string(),
            ..Default::default()
        };
        let record = proto_metric_to_record(&metric).unwrap();
        assert_eq!(record.data, MetricData::Unknown);
        assert_eq!(record.data_point_count(), 0);
    }

    #[test]
    fn test_non_finite_gauge_value() {
        let metric = Metric {
            name: "ratio".to_string(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![ProtoNumberDataPoint {
                    value: Some(number_data_point::Value::AsDouble(f64::NAN)),
                    ..Default::default()
                }],
            })),
            ..Default::default()
        };
        let json = serde_json::to_value(proto_metric_to_record(&metric).unwrap()).unwrap();
        assert_eq!(json["data"]["data_points"][0]["value"], "NaN");
    }

    #[test]
    fn test_bad_exemplar_trace_id_rejected() {
        let metric = Metric {
            name: "latency".to_string(),
            data: Some(metric::Data::Gauge(Gauge {
                data_points: vec![ProtoNumberDataPoint {
                    exemplars: vec![ProtoExemplar {
                        trace_id: vec![1; 4],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
            })),
            ..Default::default()
        };
        assert!(matches!(
            proto_metric_to_record(&metric),
            Err(ConversionError::InvalidTraceId(4))
        ));
    }
}
