use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Per-sender token bucket, keyed by display name. Applied to text
/// messages only; presence and opaque media relays are never throttled.
pub struct Throttle {
    buckets: DashMap<String, Bucket>,
    burst: u32,
    /// Tokens regained per second.
    refill_rate: f64,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Throttle {
    /// `burst` tokens available at once, one token back every `per_seconds`.
    pub fn new(burst: u32, per_seconds: f64) -> Self {
        Self {
            buckets: DashMap::new(),
            burst,
            refill_rate: 1.0 / per_seconds,
        }
    }

    /// Take one token for `key`. Returns false when the bucket is empty.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst as f64,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_rate).min(self.burst as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets idle for longer than `older_than`.
    pub fn sweep(&self, older_than: Duration) {
        let cutoff = Instant::now() - older_than;
        self.buckets.retain(|_, b| b.last_refill > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_exactly_the_burst() {
        let throttle = Throttle::new(5, 1.0);
        let mut allowed = 0;
        for _ in 0..10 {
            if throttle.allow("alice") {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_keys_are_independent() {
        let throttle = Throttle::new(1, 1.0);
        assert!(throttle.allow("alice"));
        assert!(!throttle.allow("alice"));
        assert!(throttle.allow("bob"));
    }

    #[test]
    fn test_refill_restores_tokens() {
        let throttle = Throttle::new(2, 1.0);
        assert!(throttle.allow("alice"));
        assert!(throttle.allow("alice"));
        assert!(!throttle.allow("alice"));

        // Backdate the bucket instead of sleeping.
        throttle.buckets.get_mut("alice").unwrap().last_refill =
            Instant::now() - Duration::from_secs(2);

        assert!(throttle.allow("alice"));
    }

    #[test]
    fn test_refill_is_capped_at_burst() {
        let throttle = Throttle::new(3, 1.0);
        assert!(throttle.allow("alice"));

        throttle.buckets.get_mut("alice").unwrap().last_refill =
            Instant::now() - Duration::from_secs(100);

        assert!(throttle.allow("alice"));
        assert!(throttle.allow("alice"));
        assert!(throttle.allow("alice"));
        assert!(!throttle.allow("alice"));
    }

    #[test]
    fn test_sweep_drops_idle_buckets() {
        let throttle = Throttle::new(5, 1.0);
        throttle.allow("stale");
        throttle.sweep(Duration::from_secs(0));
        assert!(throttle.buckets.is_empty());

        throttle.allow("fresh");
        throttle.sweep(Duration::from_secs(60));
        assert!(throttle.buckets.contains_key("fresh"));
    }
}
