use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Router configuration as read from disk.
///
/// The advertisement policy is stored as two flags to keep the file format
/// close to what operators expect; `validate` folds them into a single
/// [`AdvertisementPolicy`] so a running router only ever sees one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub route_ttl_secs: u64,
    pub timer_interval_secs: u64,
    pub split_horizon: bool,
    pub poison_reverse: bool,
    pub poison_expired: bool,
    pub send_on_link_up: bool,
    pub poison_on_link_down: bool,
    pub advertisement_history: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            route_ttl_secs: 15,     // 15 seconds
            timer_interval_secs: 5, // 5 seconds
            split_horizon: false,
            poison_reverse: false,
            poison_expired: false,
            send_on_link_up: false,
            poison_on_link_down: false,
            advertisement_history: true,
        }
    }
}

/// Which latency a route is advertised with on the port it was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertisementPolicy {
    /// Real latency on every port, including the route's own.
    #[default]
    Plain,
    /// Nothing on the route's own port.
    SplitHorizon,
    /// INFINITY on the route's own port.
    PoisonReverse,
}

/// Validated, immutable settings a `DvRouter` is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolSettings {
    pub route_ttl: Duration,
    pub timer_interval: Duration,
    pub policy: AdvertisementPolicy,
    pub poison_expired: bool,
    pub send_on_link_up: bool,
    pub poison_on_link_down: bool,
    pub advertisement_history: bool,
}

impl RouterConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: RouterConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn policy(&self) -> Result<AdvertisementPolicy, ConfigError> {
        match (self.split_horizon, self.poison_reverse) {
            (true, true) => Err(ConfigError::ConflictingPolicies),
            (true, false) => Ok(AdvertisementPolicy::SplitHorizon),
            (false, true) => Ok(AdvertisementPolicy::PoisonReverse),
            (false, false) => Ok(AdvertisementPolicy::Plain),
        }
    }

    pub fn validate(&self) -> Result<ProtocolSettings, ConfigError> {
        let policy = self.policy()?;
        if self.route_ttl_secs == 0 {
            return Err(ConfigError::ZeroInterval("route_ttl_secs"));
        }
        if self.timer_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("timer_interval_secs"));
        }

        Ok(ProtocolSettings {
            route_ttl: Duration::from_secs(self.route_ttl_secs),
            timer_interval: Duration::from_secs(self.timer_interval_secs),
            policy,
            poison_expired: self.poison_expired,
            send_on_link_up: self.send_on_link_up,
            poison_on_link_down: self.poison_on_link_down,
            advertisement_history: self.advertisement_history,
        })
    }
}
