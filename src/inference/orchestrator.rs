//! Completion orchestration: credential selection, envelope sealing, and
//! single-shot or streaming dispatch.
//!
//! Streaming runs as a producer/consumer pair. A spawned task pulls chunks
//! from upstream into a bounded channel; the calling task drains that
//! channel into the caller's transport until the finish marker. Cancelling
//! the token or dropping the transport receiver stops both sides at once.
//!
//! Per call: `Open -> (chunk)* -> Finished` or `Open -> Error`.

use crate::error::{GatewayError, UpstreamError};
use crate::inference::envelope;
use crate::inference::registry::CredentialRegistry;
use crate::inference::retry::{self, MAX_ATTEMPTS};
use crate::inference::traits::ChunkStream;
use crate::telemetry::{kinds, Telemetry};
use crate::types::*;
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Capacity of the channel between the upstream reader and the transport writer.
const CHUNK_BUFFER: usize = 32;

/// Top-level façade over the completion service.
pub struct CompletionOrchestrator {
    registry: Arc<CredentialRegistry>,
    telemetry: Arc<dyn Telemetry>,
    max_attempts: u32,
}

impl CompletionOrchestrator {
    pub fn new(registry: Arc<CredentialRegistry>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            registry,
            telemetry,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn registry(&self) -> &CredentialRegistry {
        &self.registry
    }

    pub fn telemetry(&self) -> &Arc<dyn Telemetry> {
        &self.telemetry
    }

    /// Single-shot completion with bounded retry.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        purpose: Purpose,
        params: CompletionParams,
    ) -> Result<CompletionResult, GatewayError> {
        self.complete_with(messages, purpose, params, Ok).await
    }

    /// Single-shot completion where `parse` runs inside the retry, so a
    /// malformed answer is retried like a failed call.
    pub async fn complete_with<T, P>(
        &self,
        messages: Vec<ChatMessage>,
        purpose: Purpose,
        params: CompletionParams,
        parse: P,
    ) -> Result<T, GatewayError>
    where
        P: Fn(CompletionResult) -> Result<T, UpstreamError>,
    {
        let handle = self.registry.resolve(purpose).await?;
        let request = CompletionRequest {
            messages: envelope::seal(messages),
            params,
        };
        let request_id = ulid::Ulid::new().to_string();
        debug!(
            "[{}] Completion for {} via {} credentials",
            request_id, purpose, handle.source
        );

        let request = &request;
        let parse = &parse;
        let result = retry::with_retry(
            self.max_attempts,
            self.telemetry.as_ref(),
            purpose.as_str(),
            |_state| {
                let client = handle.client().clone();
                async move {
                    let completion = client.complete(request).await?;
                    parse(completion)
                }
            },
        )
        .await;

        if result.is_ok() {
            debug!("[{}] Completion for {} succeeded", request_id, purpose);
        }
        result
    }

    /// Open an upstream stream, retrying establishment up to `attempts`
    /// times. Nothing has been forwarded when this returns.
    pub async fn open_stream(
        &self,
        messages: Vec<ChatMessage>,
        purpose: Purpose,
        params: CompletionParams,
        attempts: u32,
    ) -> Result<ChunkStream, GatewayError> {
        let handle = self.registry.resolve(purpose).await?;
        let request = CompletionRequest {
            messages: envelope::seal(messages),
            params,
        };

        if attempts <= 1 {
            return handle
                .client()
                .stream(&request)
                .await
                .map_err(GatewayError::from);
        }

        let request = &request;
        retry::with_retry(attempts, self.telemetry.as_ref(), purpose.as_str(), |_state| {
            let client = handle.client().clone();
            async move { client.stream(request).await }
        })
        .await
    }

    /// Streaming completion written to `transport` as it arrives.
    pub async fn complete_streaming(
        &self,
        messages: Vec<ChatMessage>,
        purpose: Purpose,
        params: CompletionParams,
        transport: mpsc::Sender<StreamFrame>,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, GatewayError> {
        let upstream = self.open_stream(messages, purpose, params, 1).await?;
        self.forward_stream(upstream, purpose, transport, cancel)
            .await
    }

    /// Drain `upstream` into `transport`.
    ///
    /// Content chunks become [`StreamFrame::Data`]; the finish marker becomes
    /// exactly one [`StreamFrame::Done`] and nothing is written after it. On
    /// an upstream error the frames already sent stay sent, the transport is
    /// released and the error is returned.
    pub async fn forward_stream(
        &self,
        upstream: ChunkStream,
        purpose: Purpose,
        transport: mpsc::Sender<StreamFrame>,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, GatewayError> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        let upstream_cancel = cancel.child_token();
        let producer = tokio::spawn(pump_upstream(upstream, chunk_tx, upstream_cancel.clone()));

        let mut frames = 0usize;
        let cancelled = |frames| StreamOutcome {
            state: StreamState::Finished,
            frames_forwarded: frames,
            cancelled: true,
        };

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(cancelled(frames)),
                _ = transport.closed() => break Ok(cancelled(frames)),
                next = chunk_rx.recv() => next,
            };

            match next {
                Some(Ok(CompletionChunk::Content(text))) => {
                    if !deliver(&transport, StreamFrame::Data(text), &cancel).await {
                        break Ok(cancelled(frames));
                    }
                    frames += 1;
                }
                Some(Ok(CompletionChunk::Finish { reason })) => {
                    debug!("Stream for {} finished ({})", purpose, reason);
                    let delivered = deliver(&transport, StreamFrame::Done, &cancel).await;
                    break Ok(StreamOutcome {
                        state: StreamState::Finished,
                        frames_forwarded: frames,
                        cancelled: !delivered,
                    });
                }
                Some(Err(e)) => break Err(e),
                None => break Err(UpstreamError::Truncated),
            }
        };

        upstream_cancel.cancel();
        producer.abort();
        drop(transport);

        match result {
            Ok(outcome) => {
                if outcome.cancelled {
                    info!(
                        "Stream for {} cancelled by caller after {} frames",
                        purpose, outcome.frames_forwarded
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    "Stream for {} failed after {} frames ({} -> {}): {}",
                    purpose,
                    frames,
                    StreamState::Open,
                    StreamState::Error,
                    e
                );
                self.telemetry.record_event(
                    kinds::COMPLETION_STREAM_FAILED,
                    json!({
                        "purpose": purpose.as_str(),
                        "frames_forwarded": frames,
                        "error": e.to_string(),
                    }),
                );
                Err(GatewayError::Upstream(e))
            }
        }
    }
}

/// Pull chunks from upstream until a terminal item, cancellation, or the
/// consumer going away.
async fn pump_upstream(
    mut upstream: ChunkStream,
    chunks: mpsc::Sender<Result<CompletionChunk, UpstreamError>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = upstream.next() => next,
        };
        let Some(item) = next else {
            return;
        };
        let terminal = !matches!(item, Ok(CompletionChunk::Content(_)));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = chunks.send(item) => {
                if sent.is_err() {
                    return;
                }
            }
        }

        if terminal {
            return;
        }
    }
}

/// Write one frame unless the caller cancels first. False if not delivered.
async fn deliver(
    transport: &mpsc::Sender<StreamFrame>,
    frame: StreamFrame,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = transport.send(frame) => sent.is_ok(),
    }
}
