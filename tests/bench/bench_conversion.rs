//! Performance benchmark for decoding and event conversion

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;
use telemetry_ingest::Config;
use telemetry_ingest::event::EventIdGenerator;
use telemetry_ingest::otlp::{
    ContentEncoding, ContentType, DecodeLimits, ProtocolDecoder, convert_logs, convert_traces,
};

fn attr(key: &str, value: &str) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.to_string())),
        }),
    }
}

fn trace_request(spans: usize) -> ExportTraceServiceRequest {
    let spans = (0..spans)
        .map(|i| {
            Span {
                trace_id: vec![0x42; 16],
                span_id: (i as u64 + 1).to_be_bytes().to_vec(),
                parent_span_id: if i == 0 { Vec::new() } else { 1u64.to_be_bytes().to_vec() },
                name: format!("bench-span-{}", i),
                kind: 1,
                start_time_unix_nano: 1_704_067_200_000_000_000,
                end_time_unix_nano: 1_704_067_201_000_000_000,
                attributes: vec![
                    attr("gen_ai.system", "openai"),
                    attr("gen_ai.request.model", "gpt-4o"),
                    attr("http.route", "/v1/chat"),
                ],
                ..Default::default()
            }
        })
        .collect();

    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: None,
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn logs_request(records: usize) -> ExportLogsServiceRequest {
    let log_records = (0..records)
        .map(|i| LogRecord {
            time_unix_nano: 1_704_067_200_000_000_000 + i as u64,
            severity_number: 9,
            severity_text: "INFO".to_string(),
            body: Some(AnyValue {
                value: Some(any_value::Value::StringValue(format!("log line {}", i))),
            }),
            attributes: vec![attr("component", "bench")],
            ..Default::default()
        })
        .collect();

    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: None,
            scope_logs: vec![ScopeLogs {
                log_records,
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn bench_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert_traces");
    for size in [10, 100, 1000] {
        let request = trace_request(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| convert_traces(black_box(request), &mut EventIdGenerator::new()));
        });
    }
    group.finish();

    let request = logs_request(100);
    c.bench_function("convert_logs_100", |b| {
        b.iter(|| convert_logs(black_box(&request), &mut EventIdGenerator::new()));
    });
}

fn bench_decode(c: &mut Criterion) {
    let decoder = ProtocolDecoder::new(DecodeLimits::from(&Config::default().server));
    let request = trace_request(100);
    let protobuf = request.encode_to_vec();
    let json = serde_json::to_vec(&request).unwrap_or_default();

    c.bench_function("decode_traces_protobuf_100", |b| {
        b.iter(|| {
            decoder.decode_bytes::<ExportTraceServiceRequest>(
                ContentType::Protobuf,
                ContentEncoding::Identity,
                black_box(&protobuf),
            )
        });
    });

    c.bench_function("decode_traces_json_100", |b| {
        b.iter(|| {
            decoder.decode_bytes::<ExportTraceServiceRequest>(
                ContentType::Json,
                ContentEncoding::Identity,
                black_box(&json),
            )
        });
    });
}

criterion_group!(benches, bench_conversion, bench_decode);
criterion_main!(benches);
