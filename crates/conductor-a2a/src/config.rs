use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for a specialist's [`TaskRegistry`](crate::TaskRegistry).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Interval between samples while a reader waits for a terminal status.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Server-side window for `GET /tasks/{id}?wait=true`.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
    /// Terminal records older than this are evicted.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Expiry handed to the write-through store.
    #[serde(default = "default_store_ttl_secs")]
    pub store_ttl_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_wait_timeout_secs() -> u64 {
    30
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_store_ttl_secs() -> u64 {
    86_400
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            wait_timeout_secs: default_wait_timeout_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            store_ttl_secs: default_store_ttl_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }
}

/// Settings for the [`DelegationClient`](crate::DelegationClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Applies to submit and cancel calls. Waiting reads are bounded by
    /// the remote's own wait window instead.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_max_idle_per_host() -> usize {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            max_idle_per_host: default_max_idle_per_host(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.retention(), Duration::from_secs(3600));
        assert_eq!(config.wait_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_registry_partial_toml() {
        let config: RegistryConfig = toml::from_str("wait_timeout_secs = 5").unwrap();
        assert_eq!(config.wait_timeout_secs, 5);
        assert_eq!(config.poll_interval_ms, 100);
        assert_eq!(config.store_ttl_secs, 86_400);
    }

    #[test]
    fn test_client_defaults() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_idle_per_host, 5);
    }
}
