//! Embedded API

pub mod public;

pub use public::{BatchOutcome, IngestPipeline, OtlpIngestOutcome, ValidationReport};
