//! Per-purpose completion clients, built on first use and memoized.
//!
//! Each purpose owns a `OnceCell`, so concurrent first calls for the same
//! purpose share one construction. A configuration reload has no effect on
//! purposes already resolved until [`CredentialRegistry::reset`] is called.

use crate::config::{ApiCredentials, PurposeKeyedConfig};
use crate::error::ConfigurationError;
use crate::inference::client::InferenceClient;
use crate::inference::traits::CompletionBackend;
use crate::telemetry::{BreadcrumbLevel, Telemetry};
use crate::types::Purpose;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Builds a backend from resolved credentials.
pub type ClientFactory = Arc<
    dyn Fn(Purpose, &ApiCredentials) -> Result<Arc<dyn CompletionBackend>, ConfigurationError>
        + Send
        + Sync,
>;

/// Where a handle's credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Specific,
    GeneralFallback,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Specific => write!(f, "specific"),
            Self::GeneralFallback => write!(f, "general fallback"),
        }
    }
}

/// A memoized client for one purpose.
#[derive(Clone)]
pub struct ClientHandle {
    pub purpose: Purpose,
    pub source: CredentialSource,
    client: Arc<dyn CompletionBackend>,
}

impl ClientHandle {
    pub fn client(&self) -> &Arc<dyn CompletionBackend> {
        &self.client
    }

    /// Whether both handles wrap the very same client instance.
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("purpose", &self.purpose)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Lazily builds and caches one client per purpose.
pub struct CredentialRegistry {
    config: PurposeKeyedConfig,
    factory: ClientFactory,
    telemetry: Arc<dyn Telemetry>,
    slots: HashMap<Purpose, OnceCell<ClientHandle>>,
}

impl CredentialRegistry {
    /// Registry producing HTTP [`InferenceClient`]s.
    pub fn new(config: PurposeKeyedConfig, telemetry: Arc<dyn Telemetry>) -> Self {
        let factory: ClientFactory = Arc::new(
            |purpose: Purpose,
             creds: &ApiCredentials|
             -> Result<Arc<dyn CompletionBackend>, ConfigurationError> {
                let client = InferenceClient::from_credentials(purpose, creds)?;
                Ok(Arc::new(client))
            },
        );
        Self::with_factory(config, telemetry, factory)
    }

    /// Registry producing clients through a custom factory.
    pub fn with_factory(
        config: PurposeKeyedConfig,
        telemetry: Arc<dyn Telemetry>,
        factory: ClientFactory,
    ) -> Self {
        Self {
            config,
            factory,
            telemetry,
            slots: empty_slots(),
        }
    }

    /// The client for `purpose`, built on first call.
    pub async fn resolve(&self, purpose: Purpose) -> Result<ClientHandle, ConfigurationError> {
        let slot = self
            .slots
            .get(&purpose)
            .ok_or(ConfigurationError::MissingCredentials(purpose))?;

        slot.get_or_try_init(|| async { self.build(purpose) })
            .await
            .cloned()
    }

    fn build(&self, purpose: Purpose) -> Result<ClientHandle, ConfigurationError> {
        let (creds, source) = match self.config.get(purpose) {
            Some(creds) => (creds, CredentialSource::Specific),
            None => {
                let general = self
                    .config
                    .general()
                    .ok_or(ConfigurationError::MissingCredentials(purpose))?;
                self.telemetry.record_breadcrumb(
                    "credentials",
                    BreadcrumbLevel::Info,
                    &format!(
                        "No specific completion key found for {}, falling back to general key",
                        purpose
                    ),
                    json!({ "purpose": purpose.as_str() }),
                );
                info!("Using general completion key for {}", purpose);
                (general, CredentialSource::GeneralFallback)
            }
        };

        let client = (self.factory)(purpose, creds)?;
        debug!("Built completion client for {} ({})", purpose, source);

        Ok(ClientHandle {
            purpose,
            source,
            client,
        })
    }

    /// Which source each purpose would resolve from, without building anything.
    pub fn coverage(&self) -> Vec<(Purpose, Option<CredentialSource>)> {
        Purpose::ALL
            .iter()
            .map(|&p| {
                let source = if self.config.get(p).is_some() {
                    Some(CredentialSource::Specific)
                } else if self.config.general().is_some() {
                    Some(CredentialSource::GeneralFallback)
                } else {
                    None
                };
                (p, source)
            })
            .collect()
    }

    /// Swap in new configuration and drop every memoized client.
    pub fn reset(&mut self, config: PurposeKeyedConfig) {
        self.config = config;
        self.slots = empty_slots();
    }
}

fn empty_slots() -> HashMap<Purpose, OnceCell<ClientHandle>> {
    Purpose::ALL
        .iter()
        .map(|&p| (p, OnceCell::new()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::inference::traits::ChunkStream;
    use crate::telemetry::RecordingTelemetry;
    use crate::types::{CompletionRequest, CompletionResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Dummy(String);

    #[async_trait]
    impl CompletionBackend for Dummy {
        async fn complete(&self, _: &CompletionRequest) -> Result<CompletionResult, UpstreamError> {
            Ok(CompletionResult {
                content: Some(self.0.clone()),
                ..Default::default()
            })
        }

        async fn stream(&self, _: &CompletionRequest) -> Result<ChunkStream, UpstreamError> {
            Err(UpstreamError::EmptyResponse)
        }
    }

    fn counting_factory(counter: Arc<AtomicUsize>) -> ClientFactory {
        Arc::new(
            move |_purpose: Purpose,
                  creds: &ApiCredentials|
                  -> Result<Arc<dyn CompletionBackend>, ConfigurationError> {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Dummy(creds.api_key.clone())))
            },
        )
    }

    fn keyed(entries: &[(Purpose, &str)]) -> PurposeKeyedConfig {
        let mut cfg = PurposeKeyedConfig::default();
        for (purpose, key) in entries {
            cfg.insert(
                *purpose,
                ApiCredentials {
                    api_key: key.to_string(),
                    ..Default::default()
                },
            );
        }
        cfg
    }

    #[tokio::test]
    async fn same_purpose_resolves_to_same_handle() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = CredentialRegistry::with_factory(
            keyed(&[(Purpose::UrlSafety, "sk-url")]),
            Arc::new(RecordingTelemetry::new()),
            counting_factory(counter.clone()),
        );

        let a = registry.resolve(Purpose::UrlSafety).await.unwrap();
        let b = registry.resolve(Purpose::UrlSafety).await.unwrap();
        assert!(a.same_client(&b));
        assert_eq!(a.source, CredentialSource::Specific);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn falls_back_to_general_with_breadcrumb() {
        let telemetry = Arc::new(RecordingTelemetry::new());
        let registry = CredentialRegistry::with_factory(
            keyed(&[(Purpose::General, "sk-general")]),
            telemetry.clone(),
            counting_factory(Arc::new(AtomicUsize::new(0))),
        );

        let handle = registry.resolve(Purpose::SubtasksGeneration).await.unwrap();
        assert_eq!(handle.source, CredentialSource::GeneralFallback);

        let crumbs = telemetry.breadcrumbs();
        assert_eq!(crumbs.len(), 1);
        assert_eq!(crumbs[0].level, BreadcrumbLevel::Info);
        assert!(crumbs[0].message.contains("subtasks_generation"));
        assert!(telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn missing_everything_is_a_configuration_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = CredentialRegistry::with_factory(
            PurposeKeyedConfig::default(),
            Arc::new(RecordingTelemetry::new()),
            counting_factory(counter.clone()),
        );

        for purpose in Purpose::ALL {
            let err = registry.resolve(purpose).await.unwrap_err();
            assert_eq!(err, ConfigurationError::MissingCredentials(purpose));
            // Repeated calls keep failing rather than caching a partial handle.
            assert!(registry.resolve(purpose).await.is_err());
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_first_use_builds_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = Arc::new(CredentialRegistry::with_factory(
            keyed(&[(Purpose::General, "sk-general")]),
            Arc::new(RecordingTelemetry::new()),
            counting_factory(counter.clone()),
        ));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.resolve(Purpose::UsernameValidation).await.unwrap()
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(handles.windows(2).all(|w| w[0].same_client(&w[1])));
    }

    #[tokio::test]
    async fn reset_picks_up_new_configuration() {
        let mut registry = CredentialRegistry::with_factory(
            keyed(&[(Purpose::General, "sk-old")]),
            Arc::new(RecordingTelemetry::new()),
            counting_factory(Arc::new(AtomicUsize::new(0))),
        );
        let before = registry.resolve(Purpose::UrlSafety).await.unwrap();

        registry.reset(keyed(&[(Purpose::UrlSafety, "sk-new")]));
        let after = registry.resolve(Purpose::UrlSafety).await.unwrap();

        assert!(!before.same_client(&after));
        assert_eq!(after.source, CredentialSource::Specific);
        let request = CompletionRequest {
            messages: Vec::new(),
            params: Default::default(),
        };
        let result = after.client().complete(&request).await.unwrap();
        assert_eq!(result.content.as_deref(), Some("sk-new"));
    }

    #[test]
    fn coverage_reports_sources() {
        let registry = CredentialRegistry::with_factory(
            keyed(&[(Purpose::General, "g"), (Purpose::UrlSafety, "u")]),
            Arc::new(RecordingTelemetry::new()),
            counting_factory(Arc::new(AtomicUsize::new(0))),
        );
        let coverage: HashMap<_, _> = registry.coverage().into_iter().collect();
        assert_eq!(coverage[&Purpose::UrlSafety], Some(CredentialSource::Specific));
        assert_eq!(
            coverage[&Purpose::PushNotification],
            Some(CredentialSource::GeneralFallback)
        );
    }
}
