//! MCP session state.
//!
//! Holds the injected store handle and everything a tool call needs from the
//! process. A session is cheap to clone and is shared by every concurrent
//! invocation; it carries no per-call state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{McpError, Result};
use crate::sequence::{SequenceGenerator, DEFAULT_COUNTERS_COLLECTION};
use crate::store::DocumentStore;

/// Default deadline for a single tool call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// MCP session state.
#[derive(Clone)]
pub struct McpSession {
    store: Arc<dyn DocumentStore>,
    sequences: SequenceGenerator,
    call_timeout: Duration,
}

impl McpSession {
    /// Create a new MCP session over a document store.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let sequences = SequenceGenerator::new(Arc::clone(&store), DEFAULT_COUNTERS_COLLECTION);
        Self {
            store,
            sequences,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Keep identifier counters in a different collection.
    pub fn with_counters_collection(mut self, collection: impl Into<String>) -> Self {
        self.sequences = SequenceGenerator::new(Arc::clone(&self.store), collection);
        self
    }

    /// Change the per-call deadline.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The underlying document store.
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// The identifier generator.
    pub fn sequences(&self) -> &SequenceGenerator {
        &self.sequences
    }

    /// A fresh context for one invocation, using the session deadline.
    pub fn call_context(&self) -> CallContext {
        CallContext::new(CancellationToken::new(), self.call_timeout)
    }
}

/// Cancellation and deadline for one tool invocation.
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl CallContext {
    /// Create a context from a cancellation token and a deadline.
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    /// Token that cancels this invocation.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deadline for this invocation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drive a write that must not be abandoned once issued.
    ///
    /// Cancellation is honoured only before the operation starts. After
    /// that it runs to completion; the operation itself must bound its own
    /// duration (see [`DocumentStore::next_sequence`]).
    pub async fn run_to_completion<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }
        op.await
    }

    /// Drive a storage operation, giving up on cancellation or deadline.
    ///
    /// The losing future is dropped, which releases any cursor it holds.
    pub async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(McpError::Cancelled),
            res = tokio::time::timeout(self.timeout, op) => {
                res.map_err(|_| McpError::Timeout(self.timeout))?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_passes_through_result() {
        let ctx = CallContext::new(CancellationToken::new(), Duration::from_secs(1));
        assert_eq!(ctx.run(async { Ok(7) }).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let ctx = CallContext::new(CancellationToken::new(), Duration::from_millis(20));
        let err = ctx
            .run(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_to_completion_outlives_deadline_and_cancel() {
        let token = CancellationToken::new();
        let ctx = CallContext::new(token.clone(), Duration::from_millis(10));
        let value = ctx
            .run_to_completion(async {
                token.cancel();
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok(5)
            })
            .await
            .unwrap();
        assert_eq!(value, 5);

        // Already cancelled: the operation never starts.
        let err = ctx
            .run_to_completion(async { Ok::<_, McpError>(6) })
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_observes_cancellation() {
        let token = CancellationToken::new();
        let ctx = CallContext::new(token.clone(), Duration::from_secs(60));
        token.cancel();
        let err = ctx
            .run(std::future::pending::<Result<()>>())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Cancelled));
    }
}
