//! Error classification and retry with exponential backoff for remote
//! generation calls.
//!
//! Every failure from a remote function is turned into an
//! [`EdgeFunctionError`] by [`classify`], which decides the [`ErrorKind`]
//! from the HTTP status and the error text. Kinds are checked in precedence
//! order:
//!
//! | Kind | Matches | Retried |
//! |---|---|---|
//! | `quota` | 402, "quota", "insufficient_quota", "billing" | no |
//! | `content_policy` | "content policy", "safety system", "moderation", "flagged" | no |
//! | `rate_limit` | 429, "rate limit", "too many requests" | yes |
//! | `timeout` | 408, 504, "timeout", "timed out" | yes |
//! | `server_error` | other 5xx | yes |
//! | `network` | "network", "connection", "dns", "failed to fetch" | yes |
//! | `unknown` | anything else | yes |
//!
//! [`with_retry`] runs an operation up to `max_retries + 1` times, sleeping
//! `min(base * multiplier^attempt, max_delay)` between attempts. It never
//! sleeps after the last attempt and gives up at once on a terminal kind.

use crate::config::RetryConfig;
use crate::generation::GenerationError;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Quota,
    ContentPolicy,
    RateLimit,
    Timeout,
    ServerError,
    Network,
    Unknown,
}

impl ErrorKind {
    /// Quota and content-policy failures will not change on retry.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Quota | ErrorKind::ContentPolicy)
    }

    /// Message suitable for showing to the person running the tool.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::Quota => {
                "The generation service has run out of credits. Check the account's billing and try again later."
            }
            ErrorKind::ContentPolicy => {
                "The request was rejected by the content policy. Rephrase the topic and try again."
            }
            ErrorKind::RateLimit => "Too many requests. Wait a moment and try again.",
            ErrorKind::Timeout => "The generation service took too long to respond. Try again.",
            ErrorKind::ServerError => {
                "The generation service is having problems. Try again in a few minutes."
            }
            ErrorKind::Network => "Could not reach the generation service. Check the connection.",
            ErrorKind::Unknown => "Something went wrong while generating content. Try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Quota => "quota",
            ErrorKind::ContentPolicy => "content_policy",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Network => "network",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A classified failure of one remote function call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{function_name} failed ({kind}): {message}")]
pub struct EdgeFunctionError {
    pub function_name: String,
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retryable: bool,
    pub timestamp: SystemTime,
}

impl EdgeFunctionError {
    pub fn new(
        function_name: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            kind,
            message: message.into(),
            status,
            retryable: kind.is_retryable(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Pure mapping from a status code and error text to an [`ErrorKind`].
pub fn classify_kind(message: &str, status: Option<u16>) -> ErrorKind {
    let text = message.to_lowercase();
    let status_is = |codes: &[u16]| status.is_some_and(|s| codes.contains(&s));

    if status_is(&[402]) || contains_any(&text, &["quota", "insufficient_quota", "billing"]) {
        ErrorKind::Quota
    } else if contains_any(
        &text,
        &["content policy", "content_policy", "safety system", "moderation", "flagged"],
    ) {
        ErrorKind::ContentPolicy
    } else if status_is(&[429])
        || contains_any(&text, &["rate limit", "rate_limit", "too many requests"])
    {
        ErrorKind::RateLimit
    } else if status_is(&[408, 504]) || contains_any(&text, &["timeout", "timed out"]) {
        ErrorKind::Timeout
    } else if status.is_some_and(|s| (500..600).contains(&s)) {
        ErrorKind::ServerError
    } else if contains_any(
        &text,
        &["network", "connection", "dns", "failed to fetch", "fetch failed"],
    ) {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    }
}

/// Classify a failure of `function_name`.
pub fn classify(function_name: &str, message: &str, status: Option<u16>) -> EdgeFunctionError {
    EdgeFunctionError::new(function_name, classify_kind(message, status), message, status)
}

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Same schedule with a different retry cap.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sleep before the attempt that follows attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `op(attempt)` until it succeeds, fails terminally, or the attempts
/// run out.
///
/// Terminal errors come back as [`GenerationError::Upstream`] without any
/// sleep; exhaustion as [`GenerationError::RetriesExhausted`] carrying the
/// number of attempts made and the last error's user message.
pub async fn with_retry<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, EdgeFunctionError>>,
{
    let attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        let error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !error.retryable {
            warn!(operation, kind = %error.kind, "terminal error, not retrying");
            return Err(GenerationError::Upstream(error));
        }
        if attempt + 1 >= attempts {
            warn!(operation, attempts, kind = %error.kind, "retries exhausted");
            return Err(GenerationError::RetriesExhausted {
                attempts,
                message: error.user_message().to_string(),
                last: error,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            operation,
            attempt = attempt + 1,
            of = attempts,
            kind = %error.kind,
            delay_ms = delay.as_millis() as u64,
            "retrying after error"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
