// src/health/watchdog.rs: software stand-in for the hardware watchdog
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::{self, Duration, Instant};
use tracing::{error, warn};

use crate::drivers::Watchdog;

const SUSPENDED: u64 = u64::MAX;

/// Cheap to clone; every clone feeds the same timer.
#[derive(Clone)]
pub struct SoftWatchdog {
    started: Instant,
    last_feed_ms: Arc<AtomicU64>,
}

impl SoftWatchdog {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_feed_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn since_feed(&self) -> Duration {
        match self.last_feed_ms.load(Ordering::Acquire) {
            SUSPENDED => Duration::ZERO,
            fed => self.started.elapsed().saturating_sub(Duration::from_millis(fed)),
        }
    }
}

impl Default for SoftWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog for SoftWatchdog {
    fn feed(&mut self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_feed_ms.store(now, Ordering::Release);
    }

    fn suspend(&mut self) {
        self.last_feed_ms.store(SUSPENDED, Ordering::Release);
    }
}

/// Checks the feed age every quarter timeout. A starved dog is reported; with
/// `enforce` the process exits so a supervisor restarts it.
pub fn spawn(timeout: Duration, enforce: bool) -> SoftWatchdog {
    let dog = SoftWatchdog::new();
    let watched = dog.clone();
    tokio::spawn(async move {
        let mut tick = time::interval((timeout / 4).max(Duration::from_millis(10)));
        let mut starved = false;
        loop {
            tick.tick().await;
            let age = watched.since_feed();
            if age < timeout {
                starved = false;
                continue;
            }
            if enforce {
                error!(age_ms = age.as_millis() as u64, "watchdog expired; restarting");
                std::process::exit(1);
            }
            if !starved {
                warn!(age_ms = age.as_millis() as u64, "watchdog starved");
                starved = true;
            }
        }
    });
    dog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn feeding_resets_the_age() {
        let mut dog = SoftWatchdog::new();
        time::advance(Duration::from_secs(5)).await;
        assert!(dog.since_feed() >= Duration::from_secs(5));

        let mut clone = dog.clone();
        clone.feed();
        assert!(dog.since_feed() < Duration::from_millis(1));

        time::advance(Duration::from_secs(2)).await;
        dog.feed();
        assert_eq!(clone.since_feed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn suspended_dog_does_not_age() {
        let mut dog = SoftWatchdog::new();
        dog.suspend();
        time::advance(Duration::from_secs(3600)).await;
        assert_eq!(dog.since_feed(), Duration::ZERO);

        dog.feed();
        time::advance(Duration::from_secs(3)).await;
        assert_eq!(dog.since_feed(), Duration::from_secs(3));
    }
}
