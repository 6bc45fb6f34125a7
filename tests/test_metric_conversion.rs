//! Tests for converting OTLP metrics into canonical events

mod common;

use opentelemetry_proto::tonic::metrics::v1::{
    ExponentialHistogram, ExponentialHistogramDataPoint, Histogram, HistogramDataPoint, Metric,
    NumberDataPoint, Sum, Summary, SummaryDataPoint, exponential_histogram_data_point, metric,
    number_data_point, summary_data_point,
};
use serde_json::json;
use telemetry_ingest::EventType;
use telemetry_ingest::event::EventIdGenerator;
use telemetry_ingest::otlp::convert_metrics;
use telemetry_ingest::otlp::metrics_converter::proto_metric_to_record;
use telemetry_ingest::otlp::metrics_data::{MetricData, Temporality};

use common::{BASE_TIME_NANOS, gauge, kv, metrics_request, string_value};

fn metric(name: &str, data: metric::Data) -> Metric {
    Metric {
        name: name.to_string(),
        description: format!("{name} description"),
        unit: "ms".to_string(),
        data: Some(data),
        ..Default::default()
    }
}

#[test]
fn test_one_event_per_metric() {
    let request = metrics_request(vec![gauge("cpu", &[0.5, 0.7]), gauge("mem", &[0.1])]);
    let conversion = convert_metrics(&request, &mut EventIdGenerator::new());

    assert_eq!(conversion.record_count, 2);
    assert_eq!(conversion.events.len(), 2);
    assert!(
        conversion
            .events
            .iter()
            .all(|e| e.event_type == EventType::MetricRecord)
    );

    let cpu = &conversion.events[0].payload;
    assert_eq!(cpu["name"], json!("cpu"));
    assert_eq!(cpu["data"]["type"], json!("gauge"));
    assert_eq!(cpu["data"]["data_points"][1]["value"], json!(0.7));
    assert_eq!(cpu["scope"]["name"], json!("checkout-meter"));
    assert_eq!(cpu["resource_attributes"]["service.name"], json!("checkout"));
}

#[test]
fn test_timestamp_is_latest_point() {
    let request = metrics_request(vec![gauge("cpu", &[0.1, 0.2, 0.3])]);
    let conversion = convert_metrics(&request, &mut EventIdGenerator::new());
    let timestamp = conversion.events[0].timestamp.unwrap();
    assert_eq!(timestamp.timestamp_nanos_opt(), Some((BASE_TIME_NANOS + 2) as i64));
}

#[test]
fn test_monotonic_sum_with_int_points() {
    let sum = metric(
        "requests",
        metric::Data::Sum(Sum {
            data_points: vec![NumberDataPoint {
                attributes: vec![kv("route", string_value("/checkout"))],
                start_time_unix_nano: BASE_TIME_NANOS,
                time_unix_nano: BASE_TIME_NANOS + 60,
                value: Some(number_data_point::Value::AsInt(1234)),
                ..Default::default()
            }],
            aggregation_temporality: 2,
            is_monotonic: true,
        }),
    );
    let conversion = convert_metrics(&metrics_request(vec![sum]), &mut EventIdGenerator::new());
    let data = &conversion.events[0].payload["data"];

    assert_eq!(data["type"], json!("sum"));
    assert_eq!(data["aggregation_temporality"], json!("cumulative"));
    assert_eq!(data["is_monotonic"], json!(true));
    assert_eq!(data["data_points"][0]["value"], json!(1234));
    assert_eq!(data["data_points"][0]["attributes"]["route"], json!("/checkout"));
}

#[test]
fn test_histogram() {
    let histogram = metric(
        "latency",
        metric::Data::Histogram(Histogram {
            data_points: vec![HistogramDataPoint {
                time_unix_nano: BASE_TIME_NANOS,
                count: 6,
                sum: Some(123.5),
                bucket_counts: vec![1, 2, 3],
                explicit_bounds: vec![10.0, 100.0],
                min: Some(1.5),
                max: None,
                ..Default::default()
            }],
            aggregation_temporality: 1,
        }),
    );
    let record = proto_metric_to_record(&histogram).unwrap();
    let MetricData::Histogram {
        data_points,
        aggregation_temporality,
    } = &record.data
    else {
        panic!("expected histogram, got {:?}", record.data);
    };
    assert_eq!(*aggregation_temporality, Temporality::Delta);
    assert_eq!(data_points[0].bucket_counts, vec![1, 2, 3]);

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["data"]["data_points"][0]["sum"], json!(123.5));
    assert_eq!(json["data"]["data_points"][0]["explicit_bounds"], json!([10.0, 100.0]));
    assert_eq!(json["data"]["data_points"][0]["min"], json!(1.5));
    assert!(json["data"]["data_points"][0].get("max").is_none());
    assert_eq!(json["description"], json!("latency description"));
    assert_eq!(json["unit"], json!("ms"));
}

#[test]
fn test_exponential_histogram() {
    let exp = metric(
        "payload_size",
        metric::Data::ExponentialHistogram(ExponentialHistogram {
            data_points: vec![ExponentialHistogramDataPoint {
                time_unix_nano: BASE_TIME_NANOS,
                count: 5,
                scale: 3,
                zero_count: 1,
                positive: Some(exponential_histogram_data_point::Buckets {
                    offset: -2,
                    bucket_counts: vec![2, 2],
                }),
                ..Default::default()
            }],
            aggregation_temporality: 2,
        }),
    );
    let conversion = convert_metrics(&metrics_request(vec![exp]), &mut EventIdGenerator::new());
    let data = &conversion.events[0].payload["data"];

    assert_eq!(data["type"], json!("exponential_histogram"));
    assert_eq!(data["data_points"][0]["scale"], json!(3));
    assert_eq!(data["data_points"][0]["zero_count"], json!(1));
    assert_eq!(
        data["data_points"][0]["positive"],
        json!({"offset": -2, "bucket_counts": [2, 2]})
    );
}

#[test]
fn test_summary() {
    let summary = metric(
        "rpc_duration",
        metric::Data::Summary(Summary {
            data_points: vec![SummaryDataPoint {
                time_unix_nano: BASE_TIME_NANOS,
                count: 100,
                sum: 2500.0,
                quantile_values: vec![
                    summary_data_point::ValueAtQuantile {
                        quantile: 0.5,
                        value: 20.0,
                    },
                    summary_data_point::ValueAtQuantile {
                        quantile: 0.99,
                        value: 80.0,
                    },
                ],
                ..Default::default()
            }],
        }),
    );
    let conversion =
        convert_metrics(&metrics_request(vec![summary]), &mut EventIdGenerator::new());
    let data = &conversion.events[0].payload["data"];

    assert_eq!(data["type"], json!("summary"));
    assert_eq!(data["data_points"][0]["count"], json!(100));
    assert_eq!(
        data["data_points"][0]["quantile_values"][1],
        json!({"quantile": 0.99, "value": 80.0})
    );
}

#[test]
fn test_metric_without_data_is_unknown() {
    let empty = Metric {
        name: "mystery".to_string(),
        ..Default::default()
    };
    let conversion = convert_metrics(&metrics_request(vec![empty]), &mut EventIdGenerator::new());

    assert_eq!(conversion.events.len(), 1);
    let payload = &conversion.events[0].payload;
    assert_eq!(payload["data"], json!({"type": "unknown"}));
    assert!(conversion.events[0].timestamp.is_none());
}

#[test]
fn test_non_finite_values_survive_json() {
    let request = metrics_request(vec![gauge("weird", &[f64::NAN, f64::NEG_INFINITY])]);
    let conversion = convert_metrics(&request, &mut EventIdGenerator::new());
    let points = &conversion.events[0].payload["data"]["data_points"];
    assert_eq!(points[0]["value"], json!("NaN"));
    assert_eq!(points[1]["value"], json!("-inf"));
}
