//! In-memory event stream for development and testing
//!
//! Records every appended batch per tenant and hands out Redis-style
//! `{ms}-{seq}` offsets. Failure can be switched on to exercise the
//! publish-error path.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::auth::ProjectId;
use crate::error::PublishError;
use crate::event::{Batch, TelemetryEvent};
use crate::stream::{EventStream, StreamOffset};

/// Mock stream state
#[derive(Debug, Default)]
struct MockStreamState {
    /// Appended batches per tenant, in append order
    batches: HashMap<ProjectId, Vec<Batch>>,
    /// Offset sequence
    sequence: u64,
    /// Count of append calls, including failed ones
    append_calls: u64,
    /// When set, every append fails
    failing: bool,
}

/// Mock event stream for testing
#[derive(Debug, Clone)]
pub struct MockEventStream {
    state: Arc<RwLock<MockStreamState>>,
}

impl MockEventStream {
    /// Create an empty mock stream
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockStreamState::default())),
        }
    }

    /// Make every subsequent append fail (or succeed again)
    pub async fn set_failing(&self, failing: bool) {
        self.state.write().await.failing = failing;
    }

    /// Batches appended for `project_id`, in order
    pub async fn batches(&self, project_id: &ProjectId) -> Vec<Batch> {
        let state = self.state.read().await;
        state.batches.get(project_id).cloned().unwrap_or_default()
    }

    /// Events appended for `project_id`, flattened in stream order
    pub async fn events(&self, project_id: &ProjectId) -> Vec<TelemetryEvent> {
        let state = self.state.read().await;
        state
            .batches
            .get(project_id)
            .map(|batches| batches.iter().flat_map(|b| b.events.clone()).collect())
            .unwrap_or_default()
    }

    /// Events appended across all tenants
    pub async fn total_events(&self) -> usize {
        let state = self.state.read().await;
        state.batches.values().flatten().map(Batch::len).sum()
    }

    /// Get the number of append calls received
    pub async fn append_calls_count(&self) -> u64 {
        self.state.read().await.append_calls
    }

    /// Assert that the expected number of batches were appended for a tenant
    pub async fn assert_batches_appended(
        &self,
        project_id: &ProjectId,
        expected_count: usize,
    ) -> Result<(), String> {
        let state = self.state.read().await;
        let actual = state.batches.get(project_id).map_or(0, Vec::len);
        if actual != expected_count {
            Err(format!(
                "Expected {} batches, but received {}",
                expected_count, actual
            ))
        } else {
            Ok(())
        }
    }

    /// Reset the mock stream state (for test isolation)
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = MockStreamState::default();
    }
}

impl Default for MockEventStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStream for MockEventStream {
    async fn append(&self, batch: &Batch) -> Result<StreamOffset, PublishError> {
        let mut state = self.state.write().await;
        state.append_calls += 1;
        if state.failing {
            return Err(PublishError::Unavailable(
                "mock stream set to fail".to_string(),
            ));
        }

        state.sequence += 1;
        let offset = StreamOffset(format!(
            "{}-{}",
            batch.timestamp.timestamp_millis(),
            state.sequence
        ));
        state
            .batches
            .entry(batch.project_id)
            .or_default()
            .push(batch.clone());
        debug!(batch_id = %batch.batch_id, offset = %offset, "Mock stream appended batch");
        Ok(offset)
    }
}
