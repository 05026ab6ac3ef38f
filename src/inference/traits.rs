//! Completion backend trait.

use crate::error::UpstreamError;
use crate::types::{CompletionChunk, CompletionRequest, CompletionResult};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Lazy, finite stream of chunks from one streaming completion.
pub type ChunkStream = BoxStream<'static, Result<CompletionChunk, UpstreamError>>;

/// A remote completion service bound to one set of credentials.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Single-shot completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, UpstreamError>;

    /// Open a streaming completion. Errors here mean nothing was received.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, UpstreamError>;
}
