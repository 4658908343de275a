use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Failures allowed inside `window` before the username is locked for
/// `lockout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_failures: u32,
    pub window: Duration,
    pub lockout: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: 5,
            window: Duration::from_secs(60),
            lockout: Duration::from_secs(300),
        }
    }
}

struct UserRecord {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

impl UserRecord {
    fn fresh(now: Instant) -> Self {
        Self {
            failures: 0,
            window_start: now,
            locked_until: None,
        }
    }
}

/// Per-username limiter for face logins.
///
/// Only a descriptor mismatch counts as a failure. Lookup errors (unknown
/// user, wrong role, nothing enrolled) never touch the counter.
pub struct RateLimiter {
    policy: LockoutPolicy,
    records: HashMap<String, UserRecord>,
}

impl RateLimiter {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    /// `Err(remaining)` while the username is locked out.
    pub fn check(&mut self, user: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let Some(record) = self.records.get_mut(user) else {
            return Ok(());
        };

        if let Some(locked_until) = record.locked_until {
            if now < locked_until {
                return Err(locked_until.duration_since(now));
            }
            // Lockout expired
            *record = UserRecord::fresh(now);
        } else if now.duration_since(record.window_start) >= self.policy.window {
            record.failures = 0;
            record.window_start = now;
        }

        Ok(())
    }

    /// Record a mismatch. May trigger a lockout.
    pub fn record_failure(&mut self, user: &str) {
        let now = Instant::now();
        let record = self
            .records
            .entry(user.to_string())
            .or_insert_with(|| UserRecord::fresh(now));

        if now.duration_since(record.window_start) >= self.policy.window {
            record.failures = 0;
            record.window_start = now;
        }

        record.failures += 1;
        if record.failures >= self.policy.max_failures {
            record.locked_until = Some(now + self.policy.lockout);
            tracing::warn!(
                user,
                failures = record.failures,
                lockout_secs = self.policy.lockout.as_secs(),
                "login rate limit triggered, locking user"
            );
        } else {
            tracing::debug!(
                user,
                failures = record.failures,
                max = self.policy.max_failures,
                "face mismatch, incrementing failure counter"
            );
        }
    }

    pub fn record_success(&mut self, user: &str) {
        self.records.remove(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_under_limit() {
        let mut rl = RateLimiter::new(LockoutPolicy::default());
        for _ in 0..4 {
            assert!(rl.check("alice").is_ok());
            rl.record_failure("alice");
        }
        assert!(rl.check("alice").is_ok());
    }

    #[test]
    fn test_locks_after_max_failures() {
        let policy = LockoutPolicy::default();
        let mut rl = RateLimiter::new(policy);
        for _ in 0..policy.max_failures {
            rl.record_failure("alice");
        }
        let remaining = rl.check("alice").unwrap_err();
        assert!(remaining <= policy.lockout);
        assert!(remaining > policy.lockout - Duration::from_secs(5));
    }

    #[test]
    fn test_success_clears_counter() {
        let mut rl = RateLimiter::new(LockoutPolicy::default());
        for _ in 0..4 {
            rl.record_failure("alice");
        }
        rl.record_success("alice");
        rl.record_failure("alice");
        assert!(rl.check("alice").is_ok());
    }

    #[test]
    fn test_independent_per_user() {
        let mut rl = RateLimiter::new(LockoutPolicy::default());
        for _ in 0..5 {
            rl.record_failure("alice");
        }
        assert!(rl.check("bob").is_ok());
        assert!(rl.check("alice").is_err());
    }

    #[test]
    fn test_lockout_expires() {
        let mut rl = RateLimiter::new(LockoutPolicy {
            max_failures: 2,
            window: Duration::from_secs(60),
            lockout: Duration::from_millis(20),
        });
        rl.record_failure("alice");
        rl.record_failure("alice");
        assert!(rl.check("alice").is_err());

        std::thread::sleep(Duration::from_millis(40));
        assert!(rl.check("alice").is_ok());
        // Counter starts over after the lockout.
        rl.record_failure("alice");
        assert!(rl.check("alice").is_ok());
    }

    #[test]
    fn test_window_expiry_resets_failures() {
        let mut rl = RateLimiter::new(LockoutPolicy {
            max_failures: 2,
            window: Duration::from_millis(20),
            lockout: Duration::from_secs(300),
        });
        rl.record_failure("alice");
        std::thread::sleep(Duration::from_millis(40));
        rl.record_failure("alice");
        assert!(rl.check("alice").is_ok());
    }
}
