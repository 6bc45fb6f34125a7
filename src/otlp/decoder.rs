//! OTLP/HTTP protocol decoder
//!
//! Turns an HTTP request body into a typed OTLP export request:
//!
//! 1. `Content-Type` must be `application/x-protobuf` or `application/json`
//!    (parameters such as `charset` are ignored); anything else, including a
//!    missing header, is rejected before the body is read.
//! 2. The wire body is read frame by frame and rejected as soon as it would
//!    exceed the configured ceiling, so oversized bodies are never buffered.
//! 3. A `Content-Encoding` containing `gzip` is inflated, bounded by a separate
//!    decompressed-size ceiling.
//! 4. The body is parsed as protobuf or as OTLP/JSON. Both paths produce the
//!    same prost message types.
//! 5. A request without any resource group is rejected.

use std::io::Read;

use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use bytes::{Bytes, BytesMut};
use flate2::read::MultiGzDecoder;
use http_body_util::BodyExt;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use prost::Message;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::DecodeError;
use crate::otlp::Signal;

/// Media type of an OTLP/HTTP body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// `application/x-protobuf`
    Protobuf,
    /// `application/json` (OTLP/JSON mapping)
    Json,
}

impl ContentType {
    /// Parse a raw `Content-Type` header value
    pub fn parse(raw: Option<&str>) -> Result<Self, DecodeError> {
        let raw = raw.ok_or_else(|| {
            DecodeError::UnsupportedMediaType("missing Content-Type header".to_string())
        })?;
        let media_type = raw.split(';').next().unwrap_or_default().trim();

        if media_type.eq_ignore_ascii_case("application/x-protobuf") {
            Ok(Self::Protobuf)
        } else if media_type.eq_ignore_ascii_case("application/json") {
            Ok(Self::Json)
        } else {
            Err(DecodeError::UnsupportedMediaType(raw.to_string()))
        }
    }

    /// Read the media type from request headers
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, DecodeError> {
        match headers.get(CONTENT_TYPE) {
            None => Self::parse(None),
            Some(value) => {
                let raw = value.to_str().map_err(|_| {
                    DecodeError::UnsupportedMediaType("non-ASCII Content-Type header".to_string())
                })?;
                Self::parse(Some(raw))
            }
        }
    }
}

/// Transport compression of an OTLP/HTTP body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// No compression
    Identity,
    /// gzip
    Gzip,
}

impl ContentEncoding {
    /// Parse a raw `Content-Encoding` header value
    pub fn parse(raw: Option<&str>) -> Result<Self, DecodeError> {
        let Some(raw) = raw else {
            return Ok(Self::Identity);
        };
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.contains("gzip") {
            Ok(Self::Gzip)
        } else if normalized.is_empty() || normalized == "identity" {
            Ok(Self::Identity)
        } else {
            Err(DecodeError::UnsupportedContentEncoding(raw.to_string()))
        }
    }

    /// Read the encoding from request headers
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, DecodeError> {
        match headers.get(CONTENT_ENCODING) {
            None => Ok(Self::Identity),
            Some(value) => {
                let raw = value.to_str().map_err(|_| {
                    DecodeError::UnsupportedContentEncoding(
                        "non-ASCII Content-Encoding header".to_string(),
                    )
                })?;
                Self::parse(Some(raw))
            }
        }
    }
}

/// An OTLP collector export request
pub trait ExportRequest: Message + Default + DeserializeOwned {
    /// Signal carried by this request type
    const SIGNAL: Signal;

    /// Number of top-level resource groups
    fn resource_group_count(&self) -> usize;
}

impl ExportRequest for ExportTraceServiceRequest {
    const SIGNAL: Signal = Signal::Traces;

    fn resource_group_count(&self) -> usize {
        self.resource_spans.len()
    }
}

impl ExportRequest for ExportLogsServiceRequest {
    const SIGNAL: Signal = Signal::Logs;

    fn resource_group_count(&self) -> usize {
        self.resource_logs.len()
    }
}

impl ExportRequest for ExportMetricsServiceRequest {
    const SIGNAL: Signal = Signal::Metrics;

    fn resource_group_count(&self) -> usize {
        self.resource_metrics.len()
    }
}

/// Size limits applied while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Ceiling for the wire (possibly compressed) body
    pub max_body_bytes: usize,
    /// Ceiling for the body after gzip inflation
    pub max_decompressed_bytes: usize,
}

impl From<&ServerConfig> for DecodeLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            max_decompressed_bytes: config.max_decompressed_bytes,
        }
    }
}

/// Stateless OTLP/HTTP request decoder
#[derive(Debug, Clone, Copy)]
pub struct ProtocolDecoder {
    limits: DecodeLimits,
}

impl ProtocolDecoder {
    /// Create a decoder with the given limits
    pub fn new(limits: DecodeLimits) -> Self {
        Self { limits }
    }

    /// Limits in effect
    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    /// Decode a full request: headers first, then the size-limited body
    pub async fn decode_request<T: ExportRequest>(
        &self,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<T, DecodeError> {
        let content_type = ContentType::from_headers(headers)?;
        let encoding = ContentEncoding::from_headers(headers)?;
        check_content_length(headers, self.limits.max_body_bytes)?;

        let raw = read_limited(body, self.limits.max_body_bytes).await?;
        self.decode_bytes(content_type, encoding, &raw)
    }

    /// Decode an already-buffered wire body
    pub fn decode_bytes<T: ExportRequest>(
        &self,
        content_type: ContentType,
        encoding: ContentEncoding,
        raw: &[u8],
    ) -> Result<T, DecodeError> {
        if raw.len() > self.limits.max_body_bytes {
            return Err(DecodeError::PayloadTooLarge {
                limit: self.limits.max_body_bytes,
            });
        }

        let decompressed;
        let payload: &[u8] = match encoding {
            ContentEncoding::Identity => raw,
            ContentEncoding::Gzip => {
                decompressed = gunzip(raw, self.limits.max_decompressed_bytes)?;
                &decompressed
            }
        };

        let request: T = match content_type {
            ContentType::Protobuf => {
                T::decode(payload).map_err(|e| DecodeError::InvalidProtobuf(e.to_string()))?
            }
            ContentType::Json => serde_json::from_slice(payload)
                .map_err(|e| DecodeError::InvalidJson(e.to_string()))?,
        };

        if request.resource_group_count() == 0 {
            return Err(DecodeError::EmptyRequest(T::SIGNAL.resource_group_name()));
        }

        debug!(
            signal = T::SIGNAL.as_str(),
            content_type = ?content_type,
            encoding = ?encoding,
            wire_bytes = raw.len(),
            payload_bytes = payload.len(),
            resource_groups = request.resource_group_count(),
            "Decoded OTLP export request"
        );

        Ok(request)
    }
}

/// Reject early when the declared length already exceeds the limit
pub fn check_content_length(headers: &HeaderMap, limit: usize) -> Result<(), DecodeError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match declared {
        Some(len) if len > limit as u64 => Err(DecodeError::PayloadTooLarge { limit }),
        _ => Ok(()),
    }
}

/// Read a body frame by frame, failing as soon as `limit` would be exceeded
pub async fn read_limited(body: Body, limit: usize) -> Result<Bytes, DecodeError> {
    let mut body = body;
    let mut buf = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|e| DecodeError::BodyRead(e.to_string()))?;
        if let Ok(data) = frame.into_data() {
            if buf.len() + data.len() > limit {
                return Err(DecodeError::PayloadTooLarge { limit });
            }
            buf.extend_from_slice(&data);
        }
    }

    Ok(buf.freeze())
}

/// Inflate a gzip body, bounded by `limit` decompressed bytes
pub fn gunzip(raw: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    MultiGzDecoder::new(raw)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    if out.len() > limit {
        return Err(DecodeError::DecompressedTooLarge { limit });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_parameters_ignored() {
        assert_eq!(
            ContentType::parse(Some("application/json; charset=utf-8")).unwrap(),
            ContentType::Json
        );
        assert_eq!(
            ContentType::parse(Some("application/x-protobuf")).unwrap(),
            ContentType::Protobuf
        );
    }

    #[test]
    fn test_content_type_prefix_is_not_enough() {
        assert!(ContentType::parse(Some("application/jsonx")).is_err());
        assert!(ContentType::parse(Some("application/protobuf")).is_err());
        assert!(ContentType::parse(None).is_err());
    }

    #[test]
    fn test_content_encoding() {
        assert_eq!(ContentEncoding::parse(None).unwrap(), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::parse(Some("GZIP")).unwrap(), ContentEncoding::Gzip);
        assert_eq!(
            ContentEncoding::parse(Some("identity")).unwrap(),
            ContentEncoding::Identity
        );
        assert!(matches!(
            ContentEncoding::parse(Some("br")),
            Err(DecodeError::UnsupportedContentEncoding(_))
        ));
    }

    #[test]
    fn test_gunzip_rejects_garbage() {
        assert!(matches!(
            gunzip(b"definitely not gzip", 1024),
            Err(DecodeError::DecompressionFailed(_))
        ));
    }
}
