//! Bounded retry for remote completion calls.
//!
//! Fixed attempt count, no delay between attempts, every upstream error is
//! retried. Callers decide what to do once attempts run out.

use crate::error::{GatewayError, UpstreamError};
use crate::telemetry::{kinds, Telemetry};
use serde_json::json;
use std::future::Future;
use tracing::warn;

/// Attempts per logical request.
pub const MAX_ATTEMPTS: u32 = 3;

/// Progress of one retried call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Run `call` until it succeeds or `max_attempts` calls have failed.
///
/// Each failure is logged and recorded as a telemetry event. The last error
/// is returned inside [`GatewayError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(
    max_attempts: u32,
    telemetry: &dyn Telemetry,
    operation: &str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut(RetryState) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let mut state = RetryState::new(max_attempts);
    loop {
        state.attempt += 1;
        match call(state).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "{} attempt {}/{} failed: {}",
                    operation, state.attempt, state.max_attempts, e
                );
                telemetry.record_event(
                    kinds::COMPLETION_ATTEMPT_FAILED,
                    json!({
                        "operation": operation,
                        "attempt": state.attempt,
                        "max_attempts": state.max_attempts,
                        "error": e.to_string(),
                    }),
                );
                if state.exhausted() {
                    return Err(GatewayError::RetriesExhausted {
                        attempts: state.attempt,
                        last: e,
                    });
                }
            }
        }
    }
}
