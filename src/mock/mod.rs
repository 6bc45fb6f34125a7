//! Mock backends
//!
//! In-memory event stream used by the test suite and by the binary when the
//! `memory` stream backend is selected.

pub mod service;

pub use service::MockEventStream;
