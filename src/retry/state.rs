//! Retry state machine.
//!
//! One [`RetryState`] tracks a single logical request across attempts:
//!
//! ```text
//! Attempting --ok--> Succeeded
//! Attempting --retryable, budget left--> Waiting --> Attempting
//! Attempting --fatal or budget spent--> Exhausted
//! Waiting --cancel--> Cancelled
//! ```

use bytes::Bytes;
use std::time::Duration;

use super::policy::RetryPolicy;
use crate::error::LlmError;

/// Where a logical request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPhase {
    Attempting,
    Waiting,
    Succeeded,
    Exhausted,
    Cancelled,
}

impl RetryPhase {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Succeeded | Self::Exhausted | Self::Cancelled)
    }
}

/// What the driver should do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then attempt again.
    Retry(Duration),
    /// Stop and surface the error.
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    phase: RetryPhase,
    /// Attempts started so far. Never exceeds `policy.max_attempts()`.
    attempts: u32,
    jitter: f64,
    total_delay: Duration,
    buffered_body: Option<Bytes>,
    last_error: Option<LlmError>,
}

impl RetryState {
    /// Fresh state. The jitter factor for the whole request is drawn here.
    pub fn new(policy: RetryPolicy) -> Self {
        let jitter = policy.jitter_sample();
        Self {
            policy,
            phase: RetryPhase::Attempting,
            attempts: 0,
            jitter,
            total_delay: Duration::ZERO,
            buffered_body: None,
            last_error: None,
        }
    }

    pub fn phase(&self) -> RetryPhase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sum of all delays scheduled so far.
    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn last_error(&self) -> Option<&LlmError> {
        self.last_error.as_ref()
    }

    /// Body bytes captured from a one-shot stream on the first attempt.
    pub fn buffered_body(&self) -> Option<&Bytes> {
        self.buffered_body.as_ref()
    }

    pub fn set_buffered_body(&mut self, body: Bytes) {
        self.buffered_body = Some(body);
    }

    /// Start the next attempt and return its zero-based index.
    ///
    /// Returns `None` once the state is final or the attempt budget is spent.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.phase.is_final() || self.attempts >= self.policy.max_attempts() {
            return None;
        }
        self.phase = RetryPhase::Attempting;
        let index = self.attempts;
        self.attempts += 1;
        Some(index)
    }

    pub fn succeed(&mut self) {
        self.phase = RetryPhase::Succeeded;
    }

    /// Record a failed attempt and decide whether to try again.
    ///
    /// `hint` is a server-suggested delay; it replaces the computed backoff
    /// and is capped at the policy ceiling.
    pub fn fail(&mut self, error: LlmError, hint: Option<Duration>) -> RetryDecision {
        if error.is_cancelled() {
            self.last_error = Some(error);
            self.phase = RetryPhase::Cancelled;
            return RetryDecision::GiveUp;
        }
        let retryable = self.policy.should_retry(&error);
        self.last_error = Some(error);
        if !retryable || self.attempts >= self.policy.max_attempts() {
            self.phase = RetryPhase::Exhausted;
            return RetryDecision::GiveUp;
        }
        let retry_index = self.attempts.saturating_sub(1);
        let delay = match hint {
            Some(hint) => self.policy.clamp_hint(hint),
            None => self.policy.delay_for(retry_index, self.jitter),
        };
        self.total_delay += delay;
        self.phase = RetryPhase::Waiting;
        RetryDecision::Retry(delay)
    }

    /// The caller cancelled while the request was in flight or waiting.
    pub fn cancel(&mut self, error: LlmError) {
        self.phase = RetryPhase::Cancelled;
        self.last_error = Some(error);
    }

    /// The error to surface: the last real failure, or the cancellation.
    pub fn into_error(self) -> LlmError {
        self.last_error.unwrap_or_else(|| {
            LlmError::InternalError("retry loop ended without an attempt".to_string())
        })
    }
}
