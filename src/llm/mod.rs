//! Model client abstraction
//!
//! The transport itself is an external collaborator: the loop only needs a
//! client that can complete plain, streamed, and structured-JSON prompts,
//! and that tolerates concurrent calls from parallel runs.

pub(crate) mod retry;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::TransportError;

pub use retry::{with_retry, RetryPolicy};

/// Lazily produced model tokens. Each item is one text chunk.
pub type TokenStream = BoxStream<'static, Result<String, TransportError>>;

/// An opaque completion transport.
///
/// Implementations must support safe concurrent invocation: many runs may
/// call the same client simultaneously.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Plain completion: the whole response as one string.
    async fn complete(&self, prompt: &str) -> Result<String, TransportError>;

    /// Streamed completion. The default adapter wraps `complete` in a
    /// single-chunk stream for clients without native streaming.
    async fn complete_stream(&self, prompt: &str) -> Result<TokenStream, TransportError> {
        let text = self.complete(prompt).await?;
        Ok(tokio_stream::once(Ok(text)).boxed())
    }

    /// Structured completion: the client is asked to produce JSON matching
    /// `schema`. The returned value is *not* trusted; the planner validates
    /// it independently.
    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    struct OneShot;

    #[async_trait]
    impl LlmClient for OneShot {
        async fn complete(&self, _prompt: &str) -> Result<String, TransportError> {
            Ok("hello".to_string())
        }

        async fn complete_structured(
            &self,
            _prompt: &str,
            _schema: &serde_json::Value,
        ) -> Result<serde_json::Value, TransportError> {
            Ok(serde_json::json!({}))
        }
    }

    #[tokio::test]
    async fn test_default_stream_adapter_yields_one_chunk() {
        let client = OneShot;
        let mut stream = assert_ok!(client.complete_stream("hi").await);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, "hello");
        assert!(stream.next().await.is_none());
    }
}
