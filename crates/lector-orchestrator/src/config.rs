//! Retry/backoff policy and host configuration.

use std::time::Duration;

use async_trait::async_trait;

use lector_core::ConfigStore;

/// Every retry count, backoff unit, and deadline the pipeline uses.
///
/// Defaults reproduce the production behavior; tests tighten them where a
/// scenario would otherwise spend minutes of (virtual) clock.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Deadline for an ordinary request to a peer context.
    pub request_timeout: Duration,

    /// Deadline for an agent liveness ping (shorter than a full request).
    pub agent_probe_timeout: Duration,

    /// Probe-inject-reprobe rounds before giving up on the page agent.
    pub agent_attempts: u32,

    /// Post-injection wait, multiplied by the attempt number.
    pub agent_retry_unit: Duration,

    /// Extra grace wait before the final re-probe of a round.
    pub agent_grace: Duration,

    /// Renderer setup attempts.
    pub renderer_attempts: u32,

    /// Renderer setup backoff base, doubled each attempt.
    pub renderer_backoff_base: Duration,

    /// How long a setup attempt waits for the renderer's ready signal.
    pub renderer_ready_timeout: Duration,

    /// Playback dispatch attempts.
    pub dispatch_attempts: u32,

    /// Dispatch backoff, multiplied by the attempt number.
    pub dispatch_retry_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(4),
            agent_probe_timeout: Duration::from_secs(2),
            agent_attempts: 3,
            agent_retry_unit: Duration::from_millis(1500),
            agent_grace: Duration::from_secs(1),
            renderer_attempts: 3,
            renderer_backoff_base: Duration::from_secs(1),
            renderer_ready_timeout: Duration::from_secs(5),
            dispatch_attempts: 3,
            dispatch_retry_unit: Duration::from_millis(500),
        }
    }
}

/// Fixed host configuration, set once at startup.
pub struct StaticConfig {
    api_key: Option<String>,
}

impl StaticConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    /// Configuration with no API key; synthesis requests will be rejected.
    pub fn unconfigured() -> Self {
        Self { api_key: None }
    }
}

#[async_trait]
impl ConfigStore for StaticConfig {
    async fn api_key(&self) -> Option<String> {
        self.api_key.clone()
    }
}
