//! OpenAI-compatible chat completions over HTTP.
//!
//! Single-shot calls parse one JSON body; streaming calls parse the
//! server-sent-events body line by line into [`CompletionChunk`]s.

use crate::config::ApiCredentials;
use crate::error::{ConfigurationError, UpstreamError};
use crate::inference::traits::{ChunkStream, CompletionBackend};
use crate::types::*;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Inference client bound to one API key.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    base_url: String,
    api_key: String,
    organization: Option<String>,
    http: reqwest::Client,
}

// -- OpenAI-compatible request/response types --------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<MessagePayload<'a>>,
    max_tokens: u32,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl InferenceClient {
    /// Create a client for `purpose` from its resolved credentials.
    pub fn from_credentials(
        purpose: Purpose,
        creds: &ApiCredentials,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = creds.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| ConfigurationError::InvalidClient {
                purpose,
                reason: e.to_string(),
            })?;

        let base_url = creds.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: creds.api_key.clone(),
            organization: creds.organization.clone(),
            http,
        })
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &request.params.model,
            messages: request
                .messages
                .iter()
                .map(|m| MessagePayload {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: request.params.max_tokens,
            temperature: request.params.temperature,
            stream,
            response_format: request
                .params
                .json_response
                .then_some(ResponseFormat { r#type: "json_object" }),
        };

        debug!(
            "Completion request to model {} ({} messages, stream={})",
            request.params.model,
            request.messages.len(),
            stream
        );

        let mut req = self.http.post(&url).bearer_auth(&self.api_key).json(&body);
        if let Some(org) = &self.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl CompletionBackend for InferenceClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, UpstreamError> {
        let resp = self.send(request, false).await?;
        let body: ChatResponse = resp.json().await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or(UpstreamError::EmptyResponse)?;

        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResult {
            content: choice.message.content,
            finish_reason: choice.finish_reason,
            usage,
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, UpstreamError> {
        let resp = self.send(request, true).await?;
        let body = resp
            .bytes_stream()
            .map(|r| r.map(|b| b.to_vec()).map_err(UpstreamError::from))
            .boxed();
        Ok(sse_chunks(body))
    }
}

// -- Server-sent events ------------------------------------------------------

struct SseState {
    body: BoxStream<'static, Result<Vec<u8>, UpstreamError>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<CompletionChunk, UpstreamError>>,
    saw_finish: bool,
    done: bool,
}

impl SseState {
    /// Parse every complete line in the buffer.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let Some(data) = line.trim().strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                if !self.saw_finish {
                    self.saw_finish = true;
                    self.pending.push_back(Ok(CompletionChunk::Finish {
                        reason: "stop".into(),
                    }));
                }
                self.done = true;
                return;
            }

            match serde_json::from_str::<StreamPayload>(data) {
                Ok(payload) => {
                    if let Some(choice) = payload.choices.into_iter().next() {
                        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                            self.pending.push_back(Ok(CompletionChunk::Content(content)));
                        }
                        if let Some(reason) = choice.finish_reason {
                            self.saw_finish = true;
                            self.pending
                                .push_back(Ok(CompletionChunk::Finish { reason }));
                        }
                    }
                }
                Err(e) => {
                    self.pending.push_back(Err(UpstreamError::from(e)));
                    self.done = true;
                    return;
                }
            }
        }
    }
}

/// Turn a raw SSE byte stream into completion chunks.
pub(crate) fn sse_chunks(body: BoxStream<'static, Result<Vec<u8>, UpstreamError>>) -> ChunkStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        saw_finish: false,
        done: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                return Some((item, st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    st.buffer.extend_from_slice(&bytes);
                    st.drain_lines();
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(e));
                    st.done = true;
                }
                None => {
                    st.buffer.push(b'\n');
                    st.drain_lines();
                    st.done = true;
                }
            }
        }
    })
    .boxed()
}
