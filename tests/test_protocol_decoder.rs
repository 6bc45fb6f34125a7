//! Tests for OTLP/HTTP request decoding

mod common;

use std::io::Write;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use flate2::Compression;
use flate2::write::GzEncoder;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use telemetry_ingest::error::DecodeError;
use telemetry_ingest::otlp::{ContentEncoding, ContentType, DecodeLimits, ProtocolDecoder};

use common::{log_record, logs_request, span, trace_request};

fn decoder() -> ProtocolDecoder {
    ProtocolDecoder::new(DecodeLimits {
        max_body_bytes: 4096,
        max_decompressed_bytes: 16 * 1024,
    })
}

fn headers(content_type: &str, encoding: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, content_type.parse().unwrap());
    if let Some(encoding) = encoding {
        headers.insert(CONTENT_ENCODING, encoding.parse().unwrap());
    }
    headers
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_decode_protobuf() {
    let request = trace_request(vec![span(1, None, "root")]);
    let decoded: ExportTraceServiceRequest = decoder()
        .decode_request(
            &headers("application/x-protobuf", None),
            Body::from(request.encode_to_vec()),
        )
        .await
        .unwrap();
    assert_eq!(decoded, request);
}

#[tokio::test]
async fn test_decode_json_matches_protobuf() {
    let request = logs_request(vec![log_record("hello")]);
    let json = serde_json::to_vec(&request).unwrap();

    let from_json: ExportLogsServiceRequest = decoder()
        .decode_request(&headers("application/json; charset=utf-8", None), Body::from(json))
        .await
        .unwrap();
    let from_proto: ExportLogsServiceRequest = decoder()
        .decode_request(
            &headers("application/x-protobuf", None),
            Body::from(request.encode_to_vec()),
        )
        .await
        .unwrap();

    assert_eq!(from_json, from_proto);
}

#[tokio::test]
async fn test_decode_gzip_protobuf() {
    let request = trace_request(vec![span(1, None, "root"), span(2, Some(1), "child")]);
    let decoded: ExportTraceServiceRequest = decoder()
        .decode_request(
            &headers("application/x-protobuf", Some("gzip")),
            Body::from(gzip(&request.encode_to_vec())),
        )
        .await
        .unwrap();
    assert_eq!(decoded.resource_spans[0].scope_spans[0].spans.len(), 2);
}

#[tokio::test]
async fn test_unsupported_media_type_checked_before_body() {
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("text/plain", None),
            Body::from("irrelevant"),
        )
        .await;
    assert!(matches!(result, Err(DecodeError::UnsupportedMediaType(_))));

    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(&HeaderMap::new(), Body::empty())
        .await;
    assert!(matches!(result, Err(DecodeError::UnsupportedMediaType(_))));
}

#[tokio::test]
async fn test_unsupported_encoding() {
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", Some("br")),
            Body::from(vec![0u8; 8]),
        )
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.code(), "unsupported_content_encoding");
    assert_eq!(err.status_code().as_u16(), 415);
}

#[tokio::test]
async fn test_body_over_limit() {
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", None),
            Body::from(vec![0u8; 4097]),
        )
        .await;
    assert!(matches!(
        result,
        Err(DecodeError::PayloadTooLarge { limit: 4096 })
    ));
}

#[tokio::test]
async fn test_body_at_limit_is_read() {
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", None),
            Body::from(vec![0u8; 4096]),
        )
        .await;
    // zero bytes are not valid protobuf, but the size check passed
    assert!(matches!(result, Err(DecodeError::InvalidProtobuf(_))));
}

#[tokio::test]
async fn test_declared_length_over_limit() {
    let mut headers = headers("application/x-protobuf", None);
    headers.insert(CONTENT_LENGTH, "999999".parse().unwrap());
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(&headers, Body::from(vec![0u8; 4]))
        .await;
    assert!(matches!(result, Err(DecodeError::PayloadTooLarge { .. })));
}

#[tokio::test]
async fn test_decompression_bomb_rejected() {
    let compressed = gzip(&vec![0u8; 1024 * 1024]);
    assert!(compressed.len() < 4096);

    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", Some("gzip")),
            Body::from(compressed),
        )
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, DecodeError::DecompressedTooLarge { limit } if limit == 16 * 1024));
    assert_eq!(err.status_code().as_u16(), 413);
}

#[tokio::test]
async fn test_corrupt_gzip() {
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", Some("gzip")),
            Body::from("not gzip at all"),
        )
        .await;
    assert!(matches!(result, Err(DecodeError::DecompressionFailed(_))));
}

#[tokio::test]
async fn test_malformed_payloads() {
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", None),
            Body::from(vec![0xff, 0xff, 0xff]),
        )
        .await;
    assert!(matches!(result, Err(DecodeError::InvalidProtobuf(_))));

    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/json", None),
            Body::from("{\"resourceSpans\": ["),
        )
        .await;
    assert!(matches!(result, Err(DecodeError::InvalidJson(_))));
}

#[tokio::test]
async fn test_empty_request_rejected() {
    let empty = ExportTraceServiceRequest::default();
    let result = decoder()
        .decode_request::<ExportTraceServiceRequest>(
            &headers("application/x-protobuf", None),
            Body::from(empty.encode_to_vec()),
        )
        .await;
    let err = result.unwrap_err();
    assert!(matches!(err, DecodeError::EmptyRequest("resource spans")));
    assert_eq!(err.code(), "empty_request");
}

#[test]
fn test_decode_bytes_directly() {
    let request = trace_request(vec![span(3, None, "root")]);
    let decoded: ExportTraceServiceRequest = decoder()
        .decode_bytes(
            ContentType::Protobuf,
            ContentEncoding::Identity,
            &request.encode_to_vec(),
        )
        .unwrap();
    assert_eq!(decoded, request);
}
