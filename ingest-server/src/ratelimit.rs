//! Token-bucket admission control.
//!
//! Three independent scopes gate every submission: global, per-address,
//! and per-device. Per-key state lives in a `DashMap` so contention across
//! unrelated keys is sharded rather than serialized through one lock,
//! with a continuously-refilling bucket per key rather than a fixed
//! window counter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DenialReason {
    #[error("global rate limit exceeded")]
    Global,
    #[error("per-address rate limit exceeded")]
    Address,
    #[error("per-device rate limit exceeded")]
    Device,
}

#[derive(Debug, Clone, Copy)]
pub struct Denial {
    pub reason: DenialReason,
    pub retry_after: Duration,
}

struct BucketState {
    available: f64,
    last_refill: Instant,
    last_touched: Instant,
}

/// A single token bucket with continuous refill. `parking_lot::Mutex`
/// never poisons, so a bucket's internal state is always readable; the
/// only "state doesn't exist yet" case is a fresh key, handled by the
/// caller via `get_or_create`.
struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        let now = Instant::now();
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                available: capacity,
                last_refill: now,
                last_touched: now,
            }),
        }
    }

    fn refill_locked(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let added = elapsed * self.refill_per_sec;
            state.available = (state.available + added).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Try to consume `tokens`. Returns remaining tokens on success, or the
    /// suggested retry-after on denial. Never leaves the bucket partially
    /// debited.
    fn try_consume(&self, tokens: f64, now: Instant) -> Result<f64, Duration> {
        let mut state = self.state.lock();
        self.refill_locked(&mut state, now);
        state.last_touched = now;
        if state.available >= tokens {
            state.available -= tokens;
            Ok(state.available)
        } else {
            let deficit = tokens - state.available;
            let retry_secs = deficit / self.refill_per_sec.max(f64::MIN_POSITIVE);
            Err(Duration::from_secs_f64(retry_secs.max(0.0)))
        }
    }

    fn return_tokens(&self, tokens: f64) {
        let mut state = self.state.lock();
        state.available = (state.available + tokens).min(self.capacity);
    }

    fn idle_since(&self, now: Instant, idle_timeout: Duration) -> bool {
        let state = self.state.lock();
        now.saturating_duration_since(state.last_touched) > idle_timeout
    }
}

/// A bounded cache of per-key buckets with idle eviction. Evicting an
/// idle bucket is semantically equivalent to a fresh bucket on next use.
struct BucketCache {
    buckets: DashMap<String, Arc<TokenBucket>>,
    max_size: usize,
    len_hint: AtomicUsize,
}

impl BucketCache {
    fn new(max_size: usize) -> Self {
        Self {
            buckets: DashMap::new(),
            max_size,
            len_hint: AtomicUsize::new(0),
        }
    }

    fn get_or_create(&self, key: &str, capacity: f64, refill_per_sec: f64) -> Arc<TokenBucket> {
        let bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(capacity, refill_per_sec)))
            .clone();
        self.len_hint.store(self.buckets.len(), Ordering::Relaxed);
        bucket
    }

    fn evict_idle(&self, idle_timeout: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, b| !b.idle_since(now, idle_timeout));
        // A size cap beyond idle eviction is best-effort: if the cache is
        // still oversized after sweeping idle entries, drop the rest of
        // the overflow so the bound holds even under a pathological burst
        // of unique keys between sweeps.
        if self.buckets.len() > self.max_size {
            let overflow = self.buckets.len() - self.max_size;
            let victims: Vec<String> = self
                .buckets
                .iter()
                .take(overflow)
                .map(|e| e.key().clone())
                .collect();
            for k in victims {
                self.buckets.remove(&k);
            }
        }
        self.len_hint.store(self.buckets.len(), Ordering::Relaxed);
        before.saturating_sub(self.buckets.len())
    }

    fn len(&self) -> usize {
        self.len_hint.load(Ordering::Relaxed)
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    global: TokenBucket,
    address_main: BucketCache,
    address_burst: BucketCache,
    device: BucketCache,
    idle_timeout: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let global = TokenBucket::new(
            config.global_per_second as f64,
            config.global_per_second as f64,
        );
        Self {
            address_main: BucketCache::new(config.cache_max_size),
            address_burst: BucketCache::new(config.cache_max_size),
            device: BucketCache::new(config.cache_max_size),
            idle_timeout: Duration::from_secs(600),
            global,
            config,
        }
    }

    pub fn try_consume_global(&self) -> Result<f64, Denial> {
        if !self.config.enabled {
            return Ok(f64::INFINITY);
        }
        self.global.try_consume(1.0, Instant::now()).map_err(|retry_after| Denial {
            reason: DenialReason::Global,
            retry_after,
        })
    }

    pub fn return_global(&self, tokens: f64) {
        if self.config.enabled {
            self.global.return_tokens(tokens);
        }
    }

    /// Requires tokens in both the main and burst address buckets
    /// atomically: either both are debited or neither is.
    pub fn try_consume_address(&self, address: &str) -> Result<f64, Denial> {
        if !self.config.enabled {
            return Ok(f64::INFINITY);
        }
        let now = Instant::now();
        let main = self.address_main.get_or_create(
            address,
            self.config.address_per_minute as f64,
            self.config.address_per_minute as f64 / 60.0,
        );
        let burst = self.address_burst.get_or_create(
            address,
            self.config.address_burst_per_minute as f64,
            self.config.address_burst_per_minute as f64 / 60.0,
        );

        match main.try_consume(1.0, now) {
            Ok(main_remaining) => match burst.try_consume(1.0, now) {
                Ok(_) => Ok(main_remaining),
                Err(retry_after) => {
                    main.return_tokens(1.0);
                    Err(Denial {
                        reason: DenialReason::Address,
                        retry_after,
                    })
                }
            },
            Err(retry_after) => Err(Denial {
                reason: DenialReason::Address,
                retry_after,
            }),
        }
    }

    pub fn return_address(&self, address: &str, tokens: f64) {
        if !self.config.enabled {
            return;
        }
        if let Some(b) = self.address_main.buckets.get(address) {
            b.return_tokens(tokens);
        }
        if let Some(b) = self.address_burst.buckets.get(address) {
            b.return_tokens(tokens);
        }
    }

    pub fn try_consume_device(&self, device_id: &str) -> Result<f64, Denial> {
        if !self.config.enabled {
            return Ok(f64::INFINITY);
        }
        let bucket = self.device.get_or_create(
            device_id,
            self.config.device_per_minute as f64,
            self.config.device_per_minute as f64 / 60.0,
        );
        bucket.try_consume(1.0, Instant::now()).map_err(|retry_after| Denial {
            reason: DenialReason::Device,
            retry_after,
        })
    }

    pub fn return_device(&self, device_id: &str, tokens: f64) {
        if !self.config.enabled {
            return;
        }
        if let Some(b) = self.device.buckets.get(device_id) {
            b.return_tokens(tokens);
        }
    }

    /// Sweep all bucket caches for idle entries. Intended to be driven by
    /// a periodic background task run roughly every minute.
    pub fn evict_idle(&self) {
        self.address_main.evict_idle(self.idle_timeout);
        self.address_burst.evict_idle(self.idle_timeout);
        self.device.evict_idle(self.idle_timeout);
    }

    pub fn cache_sizes(&self) -> (usize, usize, usize) {
        (
            self.address_main.len(),
            self.address_burst.len(),
            self.device.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            global_per_second: 5,
            address_per_minute: 3,
            address_burst_per_minute: 2,
            device_per_minute: 2,
            cache_max_size: 1000,
        }
    }

    #[test]
    fn global_bucket_admits_up_to_capacity_then_denies() {
        let rl = RateLimiter::new(cfg());
        for _ in 0..5 {
            assert!(rl.try_consume_global().is_ok());
        }
        let denial = rl.try_consume_global().unwrap_err();
        assert_eq!(denial.reason, DenialReason::Global);
    }

    #[test]
    fn returned_global_token_is_reusable() {
        let rl = RateLimiter::new(cfg());
        for _ in 0..5 {
            assert!(rl.try_consume_global().is_ok());
        }
        assert!(rl.try_consume_global().is_err());
        rl.return_global(1.0);
        assert!(rl.try_consume_global().is_ok());
    }

    #[test]
    fn address_scope_requires_both_buckets() {
        let rl = RateLimiter::new(cfg());
        // burst capacity is 2, smaller than main capacity 3 -> burst exhausts first
        assert!(rl.try_consume_address("1.2.3.4").is_ok());
        assert!(rl.try_consume_address("1.2.3.4").is_ok());
        let denial = rl.try_consume_address("1.2.3.4").unwrap_err();
        assert_eq!(denial.reason, DenialReason::Address);
    }

    #[test]
    fn address_denial_does_not_partially_debit_main_bucket() {
        let rl = RateLimiter::new(cfg());
        assert!(rl.try_consume_address("addr").is_ok());
        assert!(rl.try_consume_address("addr").is_ok());
        // burst (cap 2) is now empty; main (cap 3) still has 1 left.
        assert!(rl.try_consume_address("addr").is_err());
        assert!(rl.try_consume_address("addr").is_err());
        // main bucket should still have exactly 1 available, not drained by
        // the two failed attempts above.
        let main = rl
            .address_main
            .get_or_create("addr", 3.0, 3.0 / 60.0);
        assert!(main.try_consume(1.0, Instant::now()).is_ok());
    }

    #[test]
    fn device_scope_denies_past_capacity() {
        let rl = RateLimiter::new(cfg());
        assert!(rl.try_consume_device("d1").is_ok());
        assert!(rl.try_consume_device("d1").is_ok());
        assert_eq!(
            rl.try_consume_device("d1").unwrap_err().reason,
            DenialReason::Device
        );
    }

    #[test]
    fn disabled_mode_always_admits() {
        let mut c = cfg();
        c.enabled = false;
        let rl = RateLimiter::new(c);
        for _ in 0..1000 {
            assert!(rl.try_consume_global().is_ok());
            assert!(rl.try_consume_device("d1").is_ok());
            assert!(rl.try_consume_address("a1").is_ok());
        }
    }

    #[test]
    fn idle_bucket_eviction_resets_state() {
        let rl = RateLimiter::new(cfg());
        assert!(rl.try_consume_device("d1").is_ok());
        assert!(rl.try_consume_device("d1").is_ok());
        assert!(rl.try_consume_device("d1").is_err());
        // Force eviction regardless of real elapsed time by using a
        // zero idle timeout directly against the cache.
        rl.device.evict_idle(Duration::from_secs(0));
        // Fresh bucket after eviction.
        assert!(rl.try_consume_device("d1").is_ok());
    }
}
