//! Configuration schema for promptgate.toml.

use crate::types::Purpose;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Directory for cached page metadata.
    pub cache_dir: String,

    /// YAML document holding prompt templates.
    pub prompts_path: String,

    /// Optional YAML message catalog for localized strings.
    pub translations_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Config version.
    pub version: u32,

    /// Completion service credentials, raw as written in the file.
    pub completion: RawCompletionConfig,

    /// Model used by each feature.
    pub models: ModelConfig,

    /// Character caps applied by the input guard.
    pub limits: GuardLimits,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            completion: RawCompletionConfig::default(),
            models: ModelConfig::default(),
            limits: GuardLimits::default(),
            cache_dir: "~/.promptgate/url-metadata-cache".into(),
            prompts_path: "~/.promptgate/prompts.yml".into(),
            translations_path: String::new(),
            log_level: "info".into(),
            version: 1,
        }
    }
}

impl GatewayConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    pub fn resolved_cache_dir(&self) -> String {
        self.resolve_path(&self.cache_dir)
    }

    pub fn resolved_prompts_path(&self) -> String {
        self.resolve_path(&self.prompts_path)
    }

    /// Resolved translations path, if one is configured.
    pub fn resolved_translations_path(&self) -> Option<String> {
        if self.translations_path.is_empty() {
            None
        } else {
            Some(self.resolve_path(&self.translations_path))
        }
    }
}

/// Credentials for one completion client.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &redact(&self.api_key))
            .field("organization", &self.organization)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn redact(key: &str) -> String {
    if key.is_empty() {
        String::new()
    } else {
        let tail: String = key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("***{}", tail)
    }
}

/// `[completion]` exactly as written, including the legacy single `api_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCompletionConfig {
    /// Completion API base URL shared by every purpose.
    pub base_url: String,

    /// Transport timeout shared by every purpose.
    pub timeout_secs: u64,

    /// Legacy single key. Becomes `general` when that table is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<ApiCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivational_message: Option<ApiCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_safety: Option<ApiCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_notification: Option<ApiCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_validation: Option<ApiCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtasks_generation: Option<ApiCredentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brain_dump_conversion: Option<ApiCredentials>,
}

impl Default for RawCompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 60,
            api_key: None,
            general: None,
            motivational_message: None,
            url_safety: None,
            push_notification: None,
            username_validation: None,
            subtasks_generation: None,
            brain_dump_conversion: None,
        }
    }
}

impl RawCompletionConfig {
    fn for_purpose(&self, purpose: Purpose) -> Option<&ApiCredentials> {
        match purpose {
            Purpose::General => self.general.as_ref(),
            Purpose::MotivationalMessage => self.motivational_message.as_ref(),
            Purpose::UrlSafety => self.url_safety.as_ref(),
            Purpose::PushNotification => self.push_notification.as_ref(),
            Purpose::UsernameValidation => self.username_validation.as_ref(),
            Purpose::SubtasksGeneration => self.subtasks_generation.as_ref(),
            Purpose::BrainDumpConversion => self.brain_dump_conversion.as_ref(),
        }
    }
}

/// Credentials keyed by purpose, with shared defaults already applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurposeKeyedConfig {
    credentials: HashMap<Purpose, ApiCredentials>,
}

impl PurposeKeyedConfig {
    pub fn get(&self, purpose: Purpose) -> Option<&ApiCredentials> {
        self.credentials.get(&purpose)
    }

    pub fn general(&self) -> Option<&ApiCredentials> {
        self.get(Purpose::General)
    }

    pub fn insert(&mut self, purpose: Purpose, credentials: ApiCredentials) {
        self.credentials.insert(purpose, credentials);
    }
}

/// One-time startup reshaping of `[completion]` into purpose-keyed credentials.
///
/// A legacy top-level `api_key` fills `general` when no `general` table is
/// present. Entries with an empty key are dropped. Missing `base_url` and
/// `timeout_secs` are inherited from the section.
pub fn normalize_config(raw: &RawCompletionConfig) -> PurposeKeyedConfig {
    let mut keyed = PurposeKeyedConfig::default();

    for purpose in Purpose::ALL {
        let explicit = raw.for_purpose(purpose).cloned();
        let creds = match (purpose, explicit, raw.api_key.as_deref()) {
            (_, Some(creds), _) => creds,
            (Purpose::General, None, Some(legacy)) => ApiCredentials {
                api_key: legacy.to_string(),
                ..Default::default()
            },
            _ => continue,
        };
        if creds.api_key.trim().is_empty() {
            continue;
        }

        keyed.insert(
            purpose,
            ApiCredentials {
                base_url: creds.base_url.or_else(|| Some(raw.base_url.clone())),
                timeout_secs: creds.timeout_secs.or(Some(raw.timeout_secs)),
                ..creds
            },
        );
    }

    keyed
}

/// Model and sampling preset per feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub motivational_message: String,
    pub chat_reply: String,
    pub url_safety: String,
    pub username_validation: String,
    pub subtasks_generation: String,
    pub brain_dump_conversion: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            motivational_message: "gpt-4o-mini".into(),
            chat_reply: "gpt-4o-mini".into(),
            url_safety: "gpt-4o-mini".into(),
            username_validation: "gpt-4o-mini".into(),
            subtasks_generation: "gpt-4o-mini".into(),
            brain_dump_conversion: "gpt-4o".into(),
        }
    }
}

/// Character caps applied before input reaches a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardLimits {
    pub default: usize,
    pub long_term_goal: usize,
    pub brain_dump: usize,
    pub metadata_title: usize,
    pub metadata_description: usize,
}

impl Default for GuardLimits {
    fn default() -> Self {
        Self {
            default: 300,
            long_term_goal: 200,
            brain_dump: 5000,
            metadata_title: 200,
            metadata_description: 500,
        }
    }
}
