//! Fire-and-forget telemetry sink.
//!
//! Events never affect control flow. The default sink forwards to `tracing`;
//! [`RecordingTelemetry`] keeps events in memory for inspection.

use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Breadcrumb severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreadcrumbLevel {
    Debug,
    Info,
    Warning,
}

/// Telemetry collaborator. Implementations must not panic or block.
pub trait Telemetry: Send + Sync {
    /// Record a discrete event (rejection, retry failure, cache anomaly).
    fn record_event(&self, kind: &str, payload: Value);

    /// Record a low-priority breadcrumb.
    fn record_breadcrumb(&self, category: &str, level: BreadcrumbLevel, message: &str, data: Value);
}

/// Sink that writes everything to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record_event(&self, kind: &str, payload: Value) {
        warn!(target: "promptgate::telemetry", kind, %payload, "telemetry event");
    }

    fn record_breadcrumb(&self, category: &str, level: BreadcrumbLevel, message: &str, data: Value) {
        match level {
            BreadcrumbLevel::Debug => {
                debug!(target: "promptgate::telemetry", category, %data, "{}", message)
            }
            BreadcrumbLevel::Info => {
                info!(target: "promptgate::telemetry", category, %data, "{}", message)
            }
            BreadcrumbLevel::Warning => {
                warn!(target: "promptgate::telemetry", category, %data, "{}", message)
            }
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub kind: String,
    pub payload: Value,
}

/// A recorded breadcrumb.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedBreadcrumb {
    pub category: String,
    pub level: BreadcrumbLevel,
    pub message: String,
    pub data: Value,
}

/// In-memory sink.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<RecordedEvent>>,
    breadcrumbs: Mutex<Vec<RecordedBreadcrumb>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Events of one kind.
    pub fn events_of(&self, kind: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    pub fn breadcrumbs(&self) -> Vec<RecordedBreadcrumb> {
        self.breadcrumbs.lock().map(|b| b.clone()).unwrap_or_default()
    }
}

impl Telemetry for RecordingTelemetry {
    fn record_event(&self, kind: &str, payload: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                kind: kind.to_string(),
                payload,
            });
        }
    }

    fn record_breadcrumb(&self, category: &str, level: BreadcrumbLevel, message: &str, data: Value) {
        if let Ok(mut crumbs) = self.breadcrumbs.lock() {
            crumbs.push(RecordedBreadcrumb {
                category: category.to_string(),
                level,
                message: message.to_string(),
                data,
            });
        }
    }
}

/// Event kinds emitted by the gateway.
pub mod kinds {
    pub const GUARD_REJECTED: &str = "guard.rejected";
    pub const GUARD_REDACTED: &str = "guard.redacted";
    pub const COMPLETION_ATTEMPT_FAILED: &str = "completion.attempt_failed";
    pub const COMPLETION_STREAM_FAILED: &str = "completion.stream_failed";
    pub const CACHE_IO_ERROR: &str = "metadata_cache.io_error";
    pub const PROMPT_MISSING: &str = "prompts.missing";
    pub const PROMPT_LOAD_FAILED: &str = "prompts.load_failed";
    pub const URL_SAFETY_FALLBACK: &str = "url_safety.fallback";
}
