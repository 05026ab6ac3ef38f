//! Streamed motivational summaries and chat replies.

use super::Gateway;
use crate::error::GatewayError;
use crate::guard::wrap_untrusted;
use crate::inference::retry::MAX_ATTEMPTS;
use crate::inference::PromptEnvelope;
use crate::telemetry::BreadcrumbLevel;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Default,
    FutureSelf,
    Factual,
}

impl Tone {
    fn describe(&self) -> &'static str {
        match self {
            Self::Default => "encouraging",
            Self::FutureSelf => "warm, future-self",
            Self::Factual => "factual",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    #[default]
    Mobile,
}

impl DeviceType {
    pub fn word_budget(&self) -> u32 {
        match self {
            Self::Desktop => 100,
            Self::Mobile => 50,
        }
    }
}

/// One habit and its streak data, as the client reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitOption {
    pub name: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotivationRequest {
    #[serde(default)]
    pub habits: Vec<HabitOption>,
    #[serde(default)]
    pub long_term_goals: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub device_type: DeviceType,
}

fn default_language() -> String {
    "English".to_string()
}

impl Gateway {
    /// The system prompt for a motivational summary. Goals failing
    /// validation are dropped without error.
    pub fn motivational_prompt(&self, request: &MotivationRequest) -> String {
        let goals: Vec<&str> = request
            .long_term_goals
            .iter()
            .map(String::as_str)
            .filter(|g| {
                self.guard
                    .validate(g, self.limits.long_term_goal, "long_term_goal")
                    .accepted
            })
            .filter(|g| !g.trim().is_empty())
            .collect();

        let words = request.device_type.word_budget();
        let tone = request.tone.describe();
        let language = &request.language;
        let habits = serde_json::to_string_pretty(&request.habits).unwrap_or_else(|_| "[]".into());
        let habits = wrap_untrusted(&habits);

        let goals_phrase = if goals.is_empty() {
            ""
        } else {
            " and the user's long term goals"
        };
        let goals_block = if goals.is_empty() {
            String::new()
        } else {
            format!("\n\nLong term goals: {}", wrap_untrusted(&goals.join(", ")))
        };

        let lead = format!(
            "Given the user's habits input below{goals_phrase}, generate a short message \
             (keep it below {words} words and add line breaks where appropriate) in a {tone} tone"
        );
        let body = match request.tone {
            Tone::Default => format!(
                "{lead} to keep them motivated in their daily habits. Write it in {language}."
            ),
            Tone::FutureSelf => format!(
                "{lead} as if you are the user's future self 20 years from now, encouraging them to \
                 work hard for that future version of themselves. Don't use past tense and don't \
                 start with 'Dear...'. Write it in {language}."
            ),
            Tone::Factual => format!(
                "{lead}. Talk to the user directly and summarise their habit streaks. Don't start \
                 with 'Based on your input,'. Write it in {language}."
            ),
        };

        format!("{body}\n\nHabits input: {habits}{goals_block}")
    }

    /// Stream a motivational summary to `transport`. An upstream timeout
    /// becomes [`GatewayError::ServiceBusy`].
    pub async fn motivational_summary(
        &self,
        request: &MotivationRequest,
        transport: mpsc::Sender<StreamFrame>,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, GatewayError> {
        self.guard.require(&request.language, self.limits.default, "language")?;

        self.telemetry().record_breadcrumb(
            "motivation",
            BreadcrumbLevel::Debug,
            "Creating motivational summary",
            json!({
                "habits": request.habits.len(),
                "language": request.language,
                "tone": request.tone,
            }),
        );

        let messages = PromptEnvelope::new()
            .system(self.motivational_prompt(request))
            .into_messages();
        let params = CompletionParams {
            model: self.models.motivational_message.clone(),
            temperature: 0.9,
            max_tokens: 400,
            json_response: false,
        };

        self.orchestrator
            .complete_streaming(messages, Purpose::MotivationalMessage, params, transport, cancel)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!("Motivational summary timed out");
                    GatewayError::ServiceBusy
                } else {
                    e
                }
            })
    }

    /// Stream a productivity-assistant reply to a chat history.
    ///
    /// Opening the upstream stream is retried; once frames are flowing a
    /// failure is reported, not retried.
    pub async fn chat_reply(
        &self,
        history: &[ChatMessage],
        language: &str,
        transport: mpsc::Sender<StreamFrame>,
        cancel: CancellationToken,
    ) -> Result<StreamOutcome, GatewayError> {
        let language = if language.trim().is_empty() {
            "English"
        } else {
            language
        };
        self.guard.require(language, self.limits.default, "language")?;

        let messages = PromptEnvelope::new()
            .system(chat_system_prompt(language))
            .history(history)
            .into_messages();
        let params = CompletionParams {
            model: self.models.chat_reply.clone(),
            temperature: 0.7,
            max_tokens: 300,
            json_response: false,
        };

        let upstream = self
            .orchestrator
            .open_stream(messages, Purpose::PushNotification, params, MAX_ATTEMPTS)
            .await?;
        self.orchestrator
            .forward_stream(upstream, Purpose::PushNotification, transport, cancel)
            .await
    }
}

fn chat_system_prompt(language: &str) -> String {
    format!(
        "You are a {language} speaking assistant (don't mention that you are a chatbot) helping \
         people to be productive and achieve the goals they set out to achieve. You are part of an \
         app that lets users block distracting apps and websites and practice the habits in their \
         daily routines. You are restricted to talking about productivity and habits and should \
         limit responses to 100 words. Please greet the user briefly."
    )
}
