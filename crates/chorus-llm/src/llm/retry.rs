use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::CompletionError;
use super::types::{CompletionResult, FinishReason};

pub const MAX_RETRIES: usize = 2;
pub const DELAYS_MS: [u64; 2] = [1000, 2000];

/// How many times to re-issue an empty completion, and how long to wait first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Delay before retry n is `delays_ms[n - 1]` (the last entry repeats)
    #[serde(default = "default_delays")]
    pub delays_ms: Vec<u64>,
}

fn default_max_retries() -> usize {
    MAX_RETRIES
}

fn default_delays() -> Vec<u64> {
    DELAYS_MS.to_vec()
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delays_ms: default_delays(),
        }
    }
}

impl RetryPolicy {
    fn delay_before_retry(&self, retry: usize) -> u64 {
        self.delays_ms
            .get(retry.saturating_sub(1))
            .or_else(|| self.delays_ms.last())
            .copied()
            .unwrap_or(0)
    }
}

/// What the governor needs to know about one attempt's outcome
pub trait AttemptOutcome {
    fn text(&self) -> &str;
    fn output_tokens(&self) -> Option<u32>;
    fn finish_reason(&self) -> Option<&FinishReason>;
}

impl AttemptOutcome for CompletionResult {
    fn text(&self) -> &str {
        &self.content
    }

    fn output_tokens(&self) -> Option<u32> {
        self.usage.and_then(|u| u.output_tokens)
    }

    fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }
}

/// Observability record of an attempt sequence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRecord {
    pub attempts: usize,
    pub delays_ms: Vec<u64>,
    /// Set only when at least one retry actually happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_content_retries: Option<usize>,
}

/// A value together with how it was obtained
#[derive(Debug, Clone)]
pub struct Retried<T> {
    pub value: T,
    pub record: RetryRecord,
}

/// Verdict on one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept(AcceptReason),
    Retry { delay_ms: u64 },
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptReason {
    HasContent,
    /// A partially delivered stream cannot be replayed
    StreamingCallback,
    /// Tokens were spent (reasoning budget) yet no text came back
    TokensWithoutText,
    /// Truncated by the output token budget
    LengthLimit,
}

/// Retries completions that come back silently empty.
///
/// Attempts run strictly one after another; errors from an attempt are
/// returned as-is and never retried here.
#[derive(Debug, Clone, Default)]
pub struct RetryGovernor {
    policy: RetryPolicy,
    streaming_callback: bool,
}

impl RetryGovernor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            streaming_callback: false,
        }
    }

    /// Mark the wrapped call as feeding a per-token callback
    pub fn with_streaming_callback(mut self, enabled: bool) -> Self {
        self.streaming_callback = enabled;
        self
    }

    /// Judge an attempt; `attempts` counts the attempt being judged (1-based).
    pub fn decide<T: AttemptOutcome>(&self, attempts: usize, outcome: &T) -> Decision {
        if !outcome.text().is_empty() {
            return Decision::Accept(AcceptReason::HasContent);
        }
        if self.streaming_callback {
            return Decision::Accept(AcceptReason::StreamingCallback);
        }
        let output_tokens = outcome.output_tokens().unwrap_or(0);
        if output_tokens > 0 {
            return Decision::Accept(AcceptReason::TokensWithoutText);
        }
        if outcome.finish_reason() == Some(&FinishReason::Length) {
            return Decision::Accept(AcceptReason::LengthLimit);
        }
        if attempts < self.policy.max_retries + 1 {
            return Decision::Retry {
                delay_ms: self.policy.delay_before_retry(attempts),
            };
        }
        Decision::Exhausted
    }

    /// Run `attempt` until it yields content or the policy says stop.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<Retried<T>, CompletionError>
    where
        T: AttemptOutcome,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CompletionError>>,
    {
        let mut record = RetryRecord::default();

        loop {
            record.attempts += 1;
            let outcome = attempt().await?;

            match self.decide(record.attempts, &outcome) {
                Decision::Accept(reason) => {
                    if reason != AcceptReason::HasContent {
                        tracing::debug!(
                            attempt = record.attempts,
                            ?reason,
                            "Empty completion accepted without retry"
                        );
                    }
                    if record.attempts > 1 {
                        record.empty_content_retries = Some(record.attempts - 1);
                    }
                    return Ok(Retried {
                        value: outcome,
                        record,
                    });
                }
                Decision::Retry { delay_ms } => {
                    tracing::warn!(
                        attempt = record.attempts,
                        max_attempts = self.policy.max_retries + 1,
                        delay_ms,
                        "Empty completion, retrying"
                    );
                    record.delays_ms.push(delay_ms);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Decision::Exhausted => {
                    tracing::warn!(
                        attempts = record.attempts,
                        "Completion still empty after retries"
                    );
                    record.empty_content_retries = Some(self.policy.max_retries);
                    return Ok(Retried {
                        value: outcome,
                        record,
                    });
                }
            }
        }
    }
}
