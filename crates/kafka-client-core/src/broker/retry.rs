//! Retry of metadata requests.
//!
//! A [`MetadataRetryTask`] carries everything needed to reissue a metadata
//! request. [`plan_batch`] decides, for one decoded response, which topics
//! are published and whether the request is issued again.

use std::time::Duration;

use tracing::debug;

use crate::config::MetadataRetryConfig;
use crate::protocol::{is_retryable, MetadataRequest, TopicInformation};

/// Bounded linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Whether a request already retried `attempt` times may be retried again.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before retry number `attempt + 1`: `(attempt + 1) * backoff`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt.saturating_add(1))
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        MetadataRetryConfig::default().into()
    }
}

impl From<MetadataRetryConfig> for RetryPolicy {
    fn from(config: MetadataRetryConfig) -> Self {
        Self::new(config.max_attempts, config.backoff())
    }
}

/// A metadata request and how many times it has been retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRetryTask {
    topics: Vec<String>,
    attempt: u32,
    auto_create: bool,
}

impl MetadataRetryTask {
    /// The first request for `topics`.
    #[must_use]
    pub fn new(topics: Vec<String>, auto_create: bool) -> Self {
        Self {
            topics,
            attempt: 0,
            auto_create,
        }
    }

    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Retries issued so far.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn auto_create(&self) -> bool {
        self.auto_create
    }

    /// Build the request this task sends.
    #[must_use]
    pub fn request(&self) -> MetadataRequest {
        MetadataRequest::new(self.topics.clone(), self.auto_create)
    }

    /// The same request, one retry further along.
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            topics: self.topics.clone(),
            attempt: self.attempt + 1,
            auto_create: self.auto_create,
        }
    }
}

/// What to do with one metadata response.
#[derive(Debug, Default)]
pub struct BatchPlan {
    /// Topics to publish as updates, in response order.
    pub publish: Vec<TopicInformation>,
    /// Reissue the request after the delay.
    pub retry: Option<(MetadataRetryTask, Duration)>,
}

/// Split a response's topics into updates and at most one retry.
///
/// Topics without an error are published. A retryable error schedules a
/// retry when the budget allows and none is scheduled yet for this batch;
/// such topics are held back. Every other error is published as-is.
#[must_use]
pub fn plan_batch(
    policy: &RetryPolicy,
    task: &MetadataRetryTask,
    topics: Vec<TopicInformation>,
) -> BatchPlan {
    let mut plan = BatchPlan::default();

    for topic in topics {
        if topic.error_code == 0 || !is_retryable(topic.error_code) {
            plan.publish.push(topic);
            continue;
        }

        if !policy.allows(task.attempt()) {
            debug!(
                topic = %topic.name,
                error_code = topic.error_code,
                attempt = task.attempt(),
                "retry budget exhausted"
            );
            plan.publish.push(topic);
            continue;
        }

        if plan.retry.is_none() {
            let delay = policy.delay(task.attempt());
            debug!(
                topic = %topic.name,
                error_code = topic.error_code,
                attempt = task.attempt() + 1,
                delay_ms = delay.as_millis() as u64,
                "scheduling metadata retry"
            );
            plan.retry = Some((task.next(), delay));
        }
    }

    plan
}
