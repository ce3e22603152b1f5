//! Per-run execution options.

use neonhub_core::ids::CampaignId;
use serde::{Deserialize, Serialize};

/// Options for one `execute` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Campaign to link the session to, if any.
    #[serde(default)]
    pub campaign_id: Option<CampaignId>,
    /// Emit aggregate metrics to the sink at completion.
    #[serde(default = "default_track_metrics")]
    pub track_metrics: bool,
    /// Inner retries for transient implementation failures. Attempts are
    /// `0..=max_retries`, so the default of 3 allows 4 attempts total.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff in milliseconds; retry *n* waits `base * 2^(n-1)`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Pre-supplied token usage, for callers that already metered the
    /// provider themselves. Overrides the `tokens_used` field of the
    /// executor output.
    #[serde(default)]
    pub tokens_used: Option<u64>,
}

fn default_track_metrics() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            campaign_id: None,
            track_metrics: default_track_metrics(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            tokens_used: None,
        }
    }
}
