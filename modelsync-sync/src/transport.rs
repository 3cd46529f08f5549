//! Transport layer abstraction.
//!
//! The engine hands a [`MergedQuery`] to a transport and gets the raw
//! response payload back. Authentication, retries and timeouts belong to the
//! transport.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncResult;
use crate::request::MergedQuery;

/// Executes composite queries against the backend.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Executes one composite query and returns the raw response body
    /// (`{"data": {...}, "errors": [...]}`).
    async fn execute(&self, query: &MergedQuery) -> SyncResult<Value>;
}

/// Mock transport for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// A transport that replays scripted responses in order and records
    /// every query it was asked to execute.
    #[derive(Debug, Clone, Default)]
    pub struct MockTransport {
        responses: Arc<Mutex<VecDeque<SyncResult<Value>>>>,
        executed: Arc<Mutex<Vec<MergedQuery>>>,
        delay: Option<Duration>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Delays every response, to widen race windows in tests.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Queues a successful response.
        pub fn push_response(&self, response: Value) {
            self.responses.lock().unwrap().push_back(Ok(response));
        }

        /// Queues a failure.
        pub fn push_error(&self, error: SyncError) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        /// Queries executed so far.
        pub fn executed(&self) -> Vec<MergedQuery> {
            self.executed.lock().unwrap().clone()
        }

        pub fn remaining(&self) -> usize {
            self.responses.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl SyncTransport for MockTransport {
        async fn execute(&self, query: &MergedQuery) -> SyncResult<Value> {
            self.executed.lock().unwrap().push(query.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(SyncError::Network("no scripted response".into())))
        }
    }
}
