use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Attempts {
    failures: u32,
    window_start: Instant,
    locked_until: Option<Instant>,
}

impl Attempts {
    fn fresh(now: Instant) -> Self {
        Self {
            failures: 0,
            window_start: now,
            locked_until: None,
        }
    }
}

/// Throttles `/auth/token` per client address.
///
/// `max_failures` bad logins inside `window` lock the address out for
/// `lockout`. A successful login forgets the address.
pub struct BruteForceGuard {
    attempts: DashMap<String, Attempts>,
    max_failures: u32,
    window: Duration,
    lockout: Duration,
}

impl BruteForceGuard {
    pub fn new(max_failures: u32, window: Duration, lockout: Duration) -> Self {
        tracing::info!(
            "Login throttle: {} failures per {}s locks an address for {}s",
            max_failures,
            window.as_secs(),
            lockout.as_secs()
        );

        Self {
            attempts: DashMap::new(),
            max_failures: max_failures.max(1),
            window,
            lockout,
        }
    }

    /// Count a failed login. Returns true when this failure triggered a lockout.
    pub fn record_failure(&self, addr: &str) -> bool {
        let now = Instant::now();
        let mut entry = self
            .attempts
            .entry(addr.to_string())
            .or_insert_with(|| Attempts::fresh(now));

        if now.duration_since(entry.window_start) > self.window {
            *entry = Attempts::fresh(now);
        }

        entry.failures += 1;
        if entry.failures < self.max_failures {
            return false;
        }

        entry.locked_until = Some(now + self.lockout);
        tracing::warn!("Locking out {} after {} failed logins", addr, entry.failures);
        true
    }

    /// Time left on the address's lockout, if it is locked.
    pub fn lockout_remaining(&self, addr: &str) -> Option<Duration> {
        let until = self.attempts.get(addr)?.locked_until?;
        until
            .checked_duration_since(Instant::now())
            .filter(|left| !left.is_zero())
    }

    pub fn record_success(&self, addr: &str) {
        self.attempts.remove(addr);
    }

    /// Forget addresses whose window and lockout have both run out.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let before = self.attempts.len();
        self.attempts.retain(|_, a| {
            let window_open = now.duration_since(a.window_start) <= self.window;
            let locked = a.locked_until.is_some_and(|until| until > now);
            window_open || locked
        });

        let dropped = before.saturating_sub(self.attempts.len());
        if dropped > 0 {
            tracing::debug!("Dropped {} expired login throttle entries", dropped);
        }
    }
}
