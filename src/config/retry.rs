use serde::Deserialize;

/// Basic retry policy template
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum number of retries (0 means unlimited retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single connect attempt timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Divide strategies by business domain
#[derive(Debug, Deserialize, Clone)]
pub struct RetryPolicies {
    // Feed channel (re)connect strategy; a change feed outage should be
    // survived, not reported, so retries default to unlimited
    #[serde(default)]
    pub feed_connect: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            feed_connect: BackoffPolicy::default(),
        }
    }
}

fn default_max_retries() -> usize {
    0
}
fn default_op_timeout_ms() -> u64 {
    5000
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    30000
}
