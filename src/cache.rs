//! # Dedup Cache Adapter
//!
//! A pluggable key/value cache offering single-flight semantics: the first
//! caller to `acquire` a key computes and stores the result, peers racing on
//! the same key wait for the lease to release and then read the cached
//! result (spec §4.4). The adapter is safe to be absent — `Provider::cache`
//! returns `None` and callers bypass deduplication entirely (spec §4.4,
//! "MUST be safe to be `null`").

use std::future::Future;

/// A keyed, single-flight cache.
pub trait Cache: Send + Sync {
    /// Scoped exclusive hold on a key, returned by [`Cache::acquire`].
    type Lease<'a>: CacheLease
    where
        Self: 'a;

    /// Acquire the lease for `key`. While one caller holds the lease, other
    /// callers acquiring the same key wait; on release they re-acquire in
    /// turn and see whatever result the previous holder stored.
    fn acquire<'a>(&'a self, key: &'a str) -> impl Future<Output = Self::Lease<'a>> + Send + 'a;
}

/// Scoped exclusive hold on a cache key.
pub trait CacheLease: Send {
    /// The cached result, if a previous holder stored one and its TTL has
    /// not elapsed.
    fn result(&self) -> Option<serde_json::Value>;

    /// Store `value` for `ttl_seconds`, visible to the next lease holder
    /// once this lease releases.
    fn set_result(
        &mut self, value: serde_json::Value, ttl_seconds: u64,
    ) -> impl Future<Output = ()> + Send;
}
