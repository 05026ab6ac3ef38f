//! Is this URL on task for the user's current focus session?

use super::{parse_json, Gateway};
use crate::guard::wrap_untrusted;
use crate::i18n::keys;
use crate::inference::PromptEnvelope;
use crate::metadata::url::BLANK_URL;
use crate::metadata::{sanitize_url, Metadata};
use crate::prompts::fill_template;
use crate::telemetry::{kinds, BreadcrumbLevel};
use crate::types::{CompletionParams, Purpose};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Prompt-store id of the classification template.
pub const URL_SAFETY_PROMPT_ID: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSafetyRequest {
    pub url: String,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub tab_title: Option<String>,
    #[serde(default)]
    pub focus_mode: Option<String>,
    #[serde(default)]
    pub intention: Option<String>,
    #[serde(default, rename = "currentTaskInToDoPlayer", alias = "current_task")]
    pub current_task: Option<String>,
    #[serde(default, rename = "justificationForThisUrl", alias = "justification")]
    pub justification: Option<String>,
    #[serde(
        default,
        rename = "lastFiveJustificationsInThisFocusSession",
        alias = "last_five_justifications"
    )]
    pub last_five_justifications: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlSafetyVerdict {
    pub allowed_probability: f64,
    pub reason: String,
}

impl Gateway {
    /// Classify a URL. Never fails: a missing template or exhausted retries
    /// yield probability 0 with a localized reason.
    pub async fn check_url_safety(&self, request: &UrlSafetyRequest, lang: &str) -> UrlSafetyVerdict {
        let url = sanitize_url(&request.url);

        let metadata = match request.meta_description.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(description) => Metadata {
                title: request.tab_title.clone(),
                description: Some(description.to_string()),
            },
            None if url == BLANK_URL => Metadata::default(),
            None => self.metadata.get_metadata(&url).await,
        };

        let Some(template) = self.prompts.get_prompt(URL_SAFETY_PROMPT_ID) else {
            self.telemetry().record_event(
                kinds::PROMPT_MISSING,
                json!({ "prompt": URL_SAFETY_PROMPT_ID, "url": url }),
            );
            return self.url_safety_fallback(lang, "prompt_missing");
        };

        let prompt = fill_template(&template, &self.url_safety_values(&url, &metadata, request));
        let messages = PromptEnvelope::new().system(prompt).into_messages();
        let params = CompletionParams {
            model: self.models.url_safety.clone(),
            temperature: 0.0,
            max_tokens: 256,
            json_response: true,
        };

        self.telemetry().record_breadcrumb(
            "url_safety",
            BreadcrumbLevel::Debug,
            "Classifying URL",
            json!({ "url": url }),
        );

        match self
            .orchestrator
            .complete_with(messages, Purpose::UrlSafety, params, parse_json::<UrlSafetyVerdict>)
            .await
        {
            Ok(verdict) => {
                debug!("{} -> {}", url, verdict.allowed_probability);
                verdict
            }
            Err(e) => {
                warn!("URL safety for {} failed: {}", url, e);
                self.url_safety_fallback(lang, "completion_failed")
            }
        }
    }

    fn url_safety_values(
        &self,
        url: &str,
        metadata: &Metadata,
        request: &UrlSafetyRequest,
    ) -> HashMap<&'static str, String> {
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.is_empty());
        let title = non_empty(&metadata.title).or_else(|| request.tab_title.clone());
        let description = non_empty(&metadata.description).or_else(|| request.meta_description.clone());

        let justifications: Vec<String> = request
            .last_five_justifications
            .iter()
            .filter_map(|j| self.guard.sanitize_field(Some(j)))
            .collect();
        let justifications = serde_json::to_string(&justifications).unwrap_or_else(|_| "[]".into());

        HashMap::from([
            ("url", wrap_untrusted(&self.guard.sanitize(url))),
            ("tab_title", self.untrusted_field(title.as_deref())),
            ("meta_description", self.untrusted_field(description.as_deref())),
            ("focus_mode", self.untrusted_field(request.focus_mode.as_deref())),
            ("intention", self.untrusted_field(request.intention.as_deref())),
            (
                "justificationForThisUrl",
                self.untrusted_field(request.justification.as_deref()),
            ),
            (
                "currentTaskInToDoPlayer",
                self.untrusted_field(request.current_task.as_deref()),
            ),
            ("lastFiveJustificationsInThisFocusSession", wrap_untrusted(&justifications)),
        ])
    }

    fn url_safety_fallback(&self, lang: &str, cause: &str) -> UrlSafetyVerdict {
        self.telemetry()
            .record_event(kinds::URL_SAFETY_FALLBACK, json!({ "cause": cause }));
        UrlSafetyVerdict {
            allowed_probability: 0.0,
            reason: self.translator.translate(keys::AI_DECISION_FAIL, lang),
        }
    }
}
