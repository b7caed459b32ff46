//! Time sources for retry backoff.
//!
//! The pipeline never calls `tokio::time` directly; it goes through a
//! [`Clock`] so tests can drive backoff delays by hand with [`FakeClock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{Notify, oneshot};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct Sleeper {
    deadline: DateTime<Utc>,
    wake: oneshot::Sender<()>,
}

struct FakeState {
    now: DateTime<Utc>,
    sleepers: Vec<Sleeper>,
}

/// A clock that only moves when told to.
///
/// `sleep` parks the caller until [`FakeClock::advance`] moves time past its
/// deadline. [`FakeClock::block_until`] lets a test wait for a known number
/// of parked sleepers before advancing.
pub struct FakeClock {
    state: Mutex<FakeState>,
    sleep_registered: Notify,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                now: start,
                sleepers: Vec::new(),
            }),
            sleep_registered: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        // A panic while holding the lock cannot leave the state half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Moves time forward and wakes every sleeper whose deadline has passed.
    pub fn advance(&self, by: Duration) {
        let due = {
            let mut state = self.lock();
            state.now = add(state.now, by);
            let now = state.now;
            let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.sleepers)
                .into_iter()
                .partition(|s| s.deadline <= now);
            state.sleepers = pending;
            due
        };
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Number of sleeps currently parked on this clock.
    pub fn pending(&self) -> usize {
        self.lock()
            .sleepers
            .iter()
            .filter(|s| !s.wake.is_closed())
            .count()
    }

    /// Waits until at least `n` sleeps are parked.
    pub async fn block_until(&self, n: usize) {
        loop {
            let notified = self.sleep_registered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let rx = {
            let mut state = self.lock();
            let (tx, rx) = oneshot::channel();
            let deadline = add(state.now, duration);
            state.sleepers.push(Sleeper { deadline, wake: tx });
            rx
        };
        self.sleep_registered.notify_waiters();
        let _ = rx.await;
    }
}

fn add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
