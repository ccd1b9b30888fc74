//! # Engine Configuration
//!
//! Tunables the flows read instead of hard-coding (spec §4.2, §4.4): retry
//! counts and backoff sleeps for the revocation-registry race, and the dedup
//! cache TTL. A `Default` tuned to the values spec.md states explicitly.

use std::time::Duration;

/// Tunable engine parameters.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Number of times `issue_credential` retries after
    /// `RevocationRegistryFull` before giving up (spec §4.2).
    pub max_registry_retries: u32,
    /// Sleep between retries while waiting for a `POSTED` registry to
    /// become `ACTIVE` (spec §4.2).
    pub posted_registry_poll: Duration,
    /// Sleep between retries after a registry-full race, before re-reading
    /// the active registry (spec §4.2).
    pub registry_full_backoff: Duration,
    /// Time-to-live for entries written through the dedup cache (spec
    /// §4.4).
    pub cache_ttl: Duration,
    /// Registry size requested when no prior registry exists to copy the
    /// size from.
    pub default_registry_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_registry_retries: 5,
            posted_registry_poll: Duration::from_secs(2),
            registry_full_backoff: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(3600),
            default_registry_size: crate::revocation::DEFAULT_REGISTRY_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_registry_retries, 5);
        assert_eq!(config.posted_registry_poll, Duration::from_secs(2));
        assert_eq!(config.registry_full_backoff, Duration::from_secs(1));
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
    }
}
