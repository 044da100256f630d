// src/limiter/bucket.rs
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window token bucket.
///
/// A granted token comes back exactly one window after it was taken, so no
/// window of that length ever sees more than `capacity` grants. The queue of
/// return times lives behind a fair mutex: the holder sleeps with the lock
/// held, the rest wait their turn in arrival order.
pub(crate) struct TokenBucket {
    capacity: usize,
    returns: Mutex<VecDeque<Instant>>,
    granted: AtomicUsize,
}

impl TokenBucket {
    pub(crate) fn per_minute(rate: u32) -> Self {
        let capacity = usize::try_from(rate.max(1)).unwrap_or(usize::MAX);
        Self {
            capacity,
            returns: Mutex::new(VecDeque::with_capacity(capacity)),
            granted: AtomicUsize::new(0),
        }
    }

    pub(crate) async fn take(&self) {
        let mut returns = self.returns.lock().await;
        loop {
            let now = Instant::now();
            while returns.front().is_some_and(|at| *at <= now) {
                returns.pop_front();
            }

            if returns.len() < self.capacity {
                returns.push_back(now + WINDOW);
                self.granted.fetch_add(1, Ordering::Relaxed);
                return;
            }

            if let Some(next) = returns.front().copied() {
                tokio::time::sleep_until(next).await;
            }
        }
    }

    pub(crate) fn granted(&self) -> usize {
        self.granted.load(Ordering::Relaxed)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}
