//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-agent scans.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Global ceiling on concurrently running agents.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_agents: usize,
    /// Outer retries for a dispatched run that fails terminally.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base outer-backoff delay in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Cap on the outer-backoff delay in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Perform one scan immediately on start, so a restart catches up on
    /// anything that became due while the process was down.
    #[serde(default)]
    pub run_missed_on_startup: bool,
}

fn default_check_interval() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    300_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            max_concurrent_agents: default_max_concurrent(),
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            run_missed_on_startup: false,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.check_interval_secs, 30);
        assert_eq!(config.max_concurrent_agents, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_backoff_ms, 1000);
        assert_eq!(config.max_backoff_ms, 300_000);
        assert!(!config.run_missed_on_startup);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig =
            serde_yaml::from_str("max_concurrent_agents: 2\nrun_missed_on_startup: true").unwrap();
        assert_eq!(config.max_concurrent_agents, 2);
        assert!(config.run_missed_on_startup);
        assert_eq!(config.check_interval_secs, 30);
    }
}
