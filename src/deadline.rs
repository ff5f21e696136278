//! Deadline supervisor. Owns the one absolute expiry per request and the
//! irreversible `Running → Expiring → Done` state machine. Everything else
//! polls `remaining()` between steps or races the watch channel inside one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Expiring,
    Done,
}

#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    started: Instant,
    expires: Instant,
    grace: Duration,
    tx: watch::Sender<Phase>,
}

impl Supervisor {
    /// Start supervising a budget. Spawns the timer task that flips the phase
    /// to `Expiring` exactly once when the budget runs out.
    pub fn start(budget: Duration, grace: Duration) -> Self {
        let started = Instant::now();
        let expires = started + budget;
        let (tx, _) = watch::channel(Phase::Running);

        let supervisor = Self {
            inner: Arc::new(Inner {
                started,
                expires,
                grace,
                tx,
            }),
        };

        let timer = supervisor.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(timer.inner.expires).await;
            timer.expire();
        });

        supervisor
    }

    /// Budget left. Monotonically non-increasing, saturating at zero. A
    /// supervisor that has left `Running` has no budget by definition.
    pub fn remaining(&self) -> Duration {
        if self.expired() {
            return Duration::ZERO;
        }
        self.inner.expires.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// The bounded window in-flight work gets after expiry.
    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    pub fn phase(&self) -> Phase {
        *self.inner.tx.borrow()
    }

    /// True once the supervisor has left `Running`.
    pub fn expired(&self) -> bool {
        self.phase() != Phase::Running
    }

    /// Watch phase transitions. Used by the executor to cancel in-flight
    /// steps cooperatively.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.inner.tx.subscribe()
    }

    /// Force the `Running → Expiring` transition. Idempotent; a supervisor
    /// that is already `Expiring` or `Done` is left alone.
    pub fn expire(&self) {
        self.inner.tx.send_if_modified(|phase| {
            if *phase == Phase::Running {
                *phase = Phase::Expiring;
                true
            } else {
                false
            }
        });
    }

    /// The response went out; the run is over. Irreversible.
    pub fn finish(&self) {
        self.inner.tx.send_if_modified(|phase| {
            if *phase != Phase::Done {
                *phase = Phase::Done;
                true
            } else {
                false
            }
        });
    }
}
