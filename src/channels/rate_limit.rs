//! Per-sender cooldown applied at the transport boundary.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries older than this many cooldowns are dropped when the map grows.
const PRUNE_THRESHOLD: usize = 4096;

pub struct RateLimiter {
    cooldown: Duration,
    last_accepted: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_accepted: Mutex::new(HashMap::new()),
        }
    }

    /// `true` when the sender may proceed. Rejected messages do not extend
    /// the cooldown.
    pub fn check(&self, sender: &str) -> bool {
        self.check_at(sender, Instant::now())
    }

    pub fn check_at(&self, sender: &str, now: Instant) -> bool {
        let mut map = self
            .last_accepted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(last) = map.get(sender) {
            if now.saturating_duration_since(*last) < self.cooldown {
                return false;
            }
        }

        if map.len() >= PRUNE_THRESHOLD {
            let cooldown = self.cooldown;
            map.retain(|_, last| now.saturating_duration_since(*last) < cooldown);
        }
        map.insert(sender.to_string(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_message_inside_cooldown_is_rejected() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(limiter.check_at("telegram:1", t0));
        assert!(!limiter.check_at("telegram:1", t0 + Duration::from_millis(1500)));
        assert!(limiter.check_at("telegram:1", t0 + Duration::from_secs(2)));
    }

    #[test]
    fn rejected_messages_do_not_extend_cooldown() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0));
        assert!(!limiter.check_at("a", t0 + Duration::from_millis(1900)));
        assert!(limiter.check_at("a", t0 + Duration::from_millis(2100)));
    }

    #[test]
    fn senders_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(limiter.check_at("a", t0));
        assert!(limiter.check_at("b", t0));
    }
}
