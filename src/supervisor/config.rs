//! Hub configuration

use std::str::FromStr;
use std::time::Duration;

use crate::hub::DEFAULT_QUEUE_CAPACITY;

/// Environment variable for [`HubConfig::code_wait`] (seconds)
pub const ENV_CODE_WAIT: &str = "HUB_CODE_WAIT_SECS";
/// Environment variable for [`HubConfig::pairing_expiry`] (seconds)
pub const ENV_PAIRING_EXPIRY: &str = "HUB_PAIRING_EXPIRY_SECS";
/// Environment variable for [`HubConfig::settle_delay`] (milliseconds)
pub const ENV_SETTLE_DELAY: &str = "HUB_SETTLE_DELAY_MS";
/// Environment variable for [`HubConfig::subscriber_queue`]
pub const ENV_SUBSCRIBER_QUEUE: &str = "HUB_SUBSCRIBER_QUEUE";

/// Hub configuration options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// How long `start_login` waits for the first pairing code
    pub code_wait: Duration,

    /// How long a pairing attempt may wait for completion after the first code
    pub pairing_expiry: Duration,

    /// Pause between pairing success and reading the new identity
    pub settle_delay: Duration,

    /// Per-subscriber event queue capacity
    pub subscriber_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            code_wait: Duration::from_secs(15),
            pairing_expiry: Duration::from_secs(15 * 60),
            settle_delay: Duration::from_secs(2),
            subscriber_queue: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl HubConfig {
    /// Defaults overridden by `HUB_*` environment variables
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_CODE_WAIT) {
            config = config.code_wait(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_PAIRING_EXPIRY) {
            config = config.pairing_expiry(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, ENV_SETTLE_DELAY) {
            config = config.settle_delay(Duration::from_millis(ms));
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, ENV_SUBSCRIBER_QUEUE) {
            config = config.subscriber_queue(capacity);
        }

        config
    }

    /// Set the first-code wait
    pub fn code_wait(mut self, wait: Duration) -> Self {
        self.code_wait = wait;
        self
    }

    /// Set the pairing expiry
    pub fn pairing_expiry(mut self, expiry: Duration) -> Self {
        self.pairing_expiry = expiry;
        self
    }

    /// Set the post-success settle delay
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the subscriber queue capacity (at least 1)
    pub fn subscriber_queue(mut self, capacity: usize) -> Self {
        self.subscriber_queue = capacity.max(1);
        self
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Invalid configuration value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.code_wait, Duration::from_secs(15));
        assert_eq!(config.pairing_expiry, Duration::from_secs(900));
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert_eq!(config.subscriber_queue, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_builder_timeouts() {
        let config = HubConfig::default()
            .code_wait(Duration::from_secs(5))
            .pairing_expiry(Duration::from_secs(60))
            .settle_delay(Duration::ZERO);

        assert_eq!(config.code_wait, Duration::from_secs(5));
        assert_eq!(config.pairing_expiry, Duration::from_secs(60));
        assert_eq!(config.settle_delay, Duration::ZERO);
    }

    #[test]
    fn test_builder_subscriber_queue_minimum() {
        let config = HubConfig::default().subscriber_queue(0);

        assert_eq!(config.subscriber_queue, 1);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = HubConfig::from_lookup(lookup(&[
            (ENV_CODE_WAIT, "30"),
            (ENV_SETTLE_DELAY, "500"),
            (ENV_SUBSCRIBER_QUEUE, " 64 "),
        ]));

        assert_eq!(config.code_wait, Duration::from_secs(30));
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert_eq!(config.subscriber_queue, 64);
        assert_eq!(config.pairing_expiry, Duration::from_secs(900));
    }

    #[test]
    fn test_from_lookup_invalid_ignored() {
        let config = HubConfig::from_lookup(lookup(&[
            (ENV_CODE_WAIT, "soon"),
            (ENV_PAIRING_EXPIRY, "-1"),
        ]));

        assert_eq!(config, HubConfig::default());
    }
}
