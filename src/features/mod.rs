//! Product operations built on the orchestrator.
//!
//! Each operation declares its own policy on top of the shared retry:
//! URL safety degrades to a conservative default, everything else surfaces
//! the error to the caller.

pub mod moderation;
pub mod motivation;
pub mod tasks;
pub mod url_safety;

pub use moderation::UsernameVerdict;
pub use motivation::{DeviceType, HabitOption, MotivationRequest, Tone};
pub use tasks::{BrainDumpTask, Subtask, SubtaskPlan, SubtaskRequest};
pub use url_safety::{UrlSafetyRequest, UrlSafetyVerdict};

use crate::config::{normalize_config, GatewayConfig, GuardLimits, ModelConfig};
use crate::error::{GatewayError, UpstreamError};
use crate::guard::{wrap_untrusted, InputGuard};
use crate::i18n::{keys, MessageCatalog, Translator};
use crate::inference::{CompletionOrchestrator, CredentialRegistry};
use crate::metadata::{HttpPageFetcher, MetadataCache};
use crate::prompts::PromptStore;
use crate::telemetry::Telemetry;
use crate::types::CompletionResult;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a [`Gateway`] is assembled from.
pub struct GatewayParts {
    pub orchestrator: Arc<CompletionOrchestrator>,
    pub metadata: Arc<MetadataCache>,
    pub prompts: Arc<PromptStore>,
    pub translator: Arc<dyn Translator>,
    pub guard: InputGuard,
    pub models: ModelConfig,
    pub limits: GuardLimits,
}

/// The feature-level entry point.
pub struct Gateway {
    orchestrator: Arc<CompletionOrchestrator>,
    metadata: Arc<MetadataCache>,
    prompts: Arc<PromptStore>,
    translator: Arc<dyn Translator>,
    guard: InputGuard,
    models: ModelConfig,
    limits: GuardLimits,
}

impl Gateway {
    pub fn new(parts: GatewayParts) -> Self {
        Self {
            orchestrator: parts.orchestrator,
            metadata: parts.metadata,
            prompts: parts.prompts,
            translator: parts.translator,
            guard: parts.guard,
            models: parts.models,
            limits: parts.limits,
        }
    }

    /// Build the full stack from configuration. Credentials are normalised
    /// once here; clients are only built when a purpose is first used.
    pub fn from_config(config: &GatewayConfig, telemetry: Arc<dyn Telemetry>) -> Result<Self> {
        let keyed = normalize_config(&config.completion);
        let registry = Arc::new(CredentialRegistry::new(keyed, telemetry.clone()));
        let orchestrator = Arc::new(CompletionOrchestrator::new(registry, telemetry.clone()));
        let guard = InputGuard::new(telemetry.clone());

        let fetcher = HttpPageFetcher::new(PAGE_FETCH_TIMEOUT).context("Failed to build page fetcher")?;
        let metadata = Arc::new(MetadataCache::new(
            config.resolved_cache_dir(),
            Arc::new(fetcher),
            guard.clone(),
            config.limits,
            telemetry.clone(),
        ));

        let prompts = Arc::new(PromptStore::load(config.resolved_prompts_path(), telemetry));
        let translator: Arc<dyn Translator> = match config.resolved_translations_path() {
            Some(path) => match MessageCatalog::load(Path::new(&path)) {
                Ok(catalog) => Arc::new(catalog),
                Err(e) => {
                    warn!("Using built-in messages: {:#}", e);
                    Arc::new(MessageCatalog::default())
                }
            },
            None => Arc::new(MessageCatalog::default()),
        };

        info!("Gateway ready ({} prompts)", prompts.all_prompts().len());

        Ok(Self::new(GatewayParts {
            orchestrator,
            metadata,
            prompts,
            translator,
            guard,
            models: config.models.clone(),
            limits: config.limits,
        }))
    }

    pub fn orchestrator(&self) -> &CompletionOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &CredentialRegistry {
        self.orchestrator.registry()
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub fn guard(&self) -> &InputGuard {
        &self.guard
    }

    pub fn limits(&self) -> GuardLimits {
        self.limits
    }

    /// The text to show an end user for `err`, in `lang`.
    ///
    /// Busy and rejected-input errors use the translated catalog messages;
    /// anything else is reported as-is.
    pub fn user_message(&self, err: &GatewayError, lang: &str) -> String {
        match err {
            GatewayError::ServiceBusy => self.translator.translate(keys::SERVICE_BUSY, lang),
            GatewayError::InvalidInput { .. } => self.translator.translate(keys::INVALID_INPUT, lang),
            other => other.to_string(),
        }
    }

    fn telemetry(&self) -> &dyn Telemetry {
        self.orchestrator.telemetry().as_ref()
    }

    /// Sanitise an optional field and frame it; empty stays empty.
    fn untrusted_field(&self, text: Option<&str>) -> String {
        self.guard
            .sanitize_field(text)
            .map(|t| wrap_untrusted(&t))
            .unwrap_or_default()
    }
}

/// Parse the model's JSON answer, tolerating a surrounding code fence.
pub(crate) fn parse_json<T: DeserializeOwned>(result: CompletionResult) -> Result<T, UpstreamError> {
    let content = result.content.ok_or(UpstreamError::EmptyResponse)?;
    let body = strip_code_fence(&content);
    if body.is_empty() {
        return Err(UpstreamError::EmptyResponse);
    }
    Ok(serde_json::from_str(body)?)
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::{ApiCredentials, PurposeKeyedConfig};
    use crate::error::ConfigurationError;
    use crate::inference::traits::ChunkStream;
    use crate::inference::CompletionBackend;
    use crate::metadata::{FetchedPage, PageFetcher};
    use crate::prompts::PromptEntry;
    use crate::telemetry::RecordingTelemetry;
    use crate::types::*;
    use async_trait::async_trait;
    use futures::{stream, StreamExt};
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Backend that replays scripted answers and records every request.
    #[derive(Default)]
    pub struct FakeBackend {
        replies: Mutex<VecDeque<Result<CompletionResult, UpstreamError>>>,
        chunks: Vec<Result<CompletionChunk, UpstreamError>>,
        stream_failures: AtomicU32,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeBackend {
        pub fn replying(replies: Vec<Result<&str, UpstreamError>>) -> Self {
            let replies = replies
                .into_iter()
                .map(|r| {
                    r.map(|content| CompletionResult {
                        content: Some(content.to_string()),
                        ..Default::default()
                    })
                })
                .collect();
            Self {
                replies: Mutex::new(replies),
                ..Default::default()
            }
        }

        pub fn streaming(chunks: &[&str], stream_failures: u32) -> Self {
            let mut scripted: Vec<Result<CompletionChunk, UpstreamError>> = chunks
                .iter()
                .map(|c| Ok(CompletionChunk::Content(c.to_string())))
                .collect();
            scripted.push(Ok(CompletionChunk::Finish {
                reason: "stop".into(),
            }));
            Self {
                chunks: scripted,
                stream_failures: AtomicU32::new(stream_failures),
                ..Default::default()
            }
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for FakeBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult, UpstreamError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(UpstreamError::Transport("no scripted reply".into())))
        }

        async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, UpstreamError> {
            self.requests.lock().unwrap().push(request.clone());
            let failures = self.stream_failures.load(Ordering::SeqCst);
            if failures > 0 {
                self.stream_failures.store(failures - 1, Ordering::SeqCst);
                return Err(UpstreamError::Timeout);
            }
            Ok(stream::iter(self.chunks.clone()).boxed())
        }
    }

    /// Fetcher serving fixed pages; anything else is a transport error.
    #[derive(Default)]
    pub struct StaticFetcher {
        pub pages: HashMap<String, FetchedPage>,
        pub calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, UpstreamError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| UpstreamError::Transport("unreachable".into()))
        }
    }

    pub struct TestGateway {
        pub gateway: Gateway,
        pub backend: Arc<FakeBackend>,
        pub fetcher: Arc<StaticFetcher>,
        pub telemetry: Arc<RecordingTelemetry>,
        _tmp: TempDir,
    }

    pub const PT_SERVICE_BUSY: &str = "O serviço de IA está demorando para responder.";

    fn test_catalog() -> MessageCatalog {
        let mut catalog = MessageCatalog::default();
        catalog
            .merge_yaml(&format!("pt:\n  common.service_busy: {}\n", PT_SERVICE_BUSY))
            .unwrap();
        catalog
    }

    pub fn gateway_with(backend: FakeBackend, fetcher: StaticFetcher, prompts: &[(&str, &str)]) -> TestGateway {
        let tmp = TempDir::new().unwrap();
        let telemetry = Arc::new(RecordingTelemetry::new());
        let backend = Arc::new(backend);

        let mut keyed = PurposeKeyedConfig::default();
        keyed.insert(
            Purpose::General,
            ApiCredentials {
                api_key: "sk-test".into(),
                ..Default::default()
            },
        );
        let shared = backend.clone();
        let registry = Arc::new(CredentialRegistry::with_factory(
            keyed,
            telemetry.clone(),
            Arc::new(
                move |_: Purpose, _: &ApiCredentials| -> Result<Arc<dyn CompletionBackend>, ConfigurationError> {
                    Ok(shared.clone())
                },
            ),
        ));

        let guard = InputGuard::new(telemetry.clone());
        let fetcher = Arc::new(fetcher);
        let metadata = Arc::new(MetadataCache::new(
            tmp.path().join("cache"),
            fetcher.clone(),
            guard.clone(),
            GuardLimits::default(),
            telemetry.clone(),
        ));
        let prompts = prompts
            .iter()
            .map(|(id, raw)| PromptEntry {
                id: id.to_string(),
                raw: raw.to_string(),
            })
            .collect();

        let gateway = Gateway::new(GatewayParts {
            orchestrator: Arc::new(CompletionOrchestrator::new(registry, telemetry.clone())),
            metadata,
            prompts: Arc::new(PromptStore::with_prompts(prompts, telemetry.clone())),
            translator: Arc::new(test_catalog()),
            guard,
            models: ModelConfig::default(),
            limits: GuardLimits::default(),
        });

        TestGateway {
            gateway,
            backend,
            fetcher,
            telemetry,
            _tmp: tmp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn result(content: &str) -> CompletionResult {
        CompletionResult {
            content: Some(content.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain: Value = parse_json(result(r#"{"a":1}"#)).unwrap();
        assert_eq!(plain["a"], 1);
        let fenced: Value = parse_json(result("```json\n{\"a\":2}\n```")).unwrap();
        assert_eq!(fenced["a"], 2);
    }

    #[test]
    fn empty_and_malformed_answers_are_upstream_errors() {
        assert_eq!(
            parse_json::<Value>(CompletionResult::default()).unwrap_err(),
            UpstreamError::EmptyResponse
        );
        assert!(matches!(
            parse_json::<Value>(result("not json")).unwrap_err(),
            UpstreamError::Decode(_)
        ));
    }
}
