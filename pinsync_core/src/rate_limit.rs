//! Client-side rate limiting for calls to third-party backends.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter.
///
/// At most `capacity` calls are released within any `window`. Callers
/// beyond that wait in FIFO order until the window has moved past the
/// oldest release; no caller is ever rejected.
///
/// Cloning is cheap and clones share the same budget, so one handle can be
/// passed to every caller that talks to the same backend.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    window: Duration,
    /// Release times inside the current window, oldest first.
    /// The tokio mutex is fair, which gives waiters their FIFO order.
    released: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                capacity,
                window,
                released: Mutex::new(VecDeque::with_capacity(capacity)),
            }),
        }
    }

    /// `calls` per second.
    pub fn per_second(calls: usize) -> Self {
        Self::new(calls, Duration::from_secs(1))
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Waits until a call may be made.
    pub async fn acquire(&self) {
        let mut released = self.inner.released.lock().await;
        loop {
            let now = Instant::now();
            while let Some(&oldest) = released.front() {
                if now.duration_since(oldest) >= self.inner.window {
                    released.pop_front();
                } else {
                    break;
                }
            }

            if released.len() < self.inner.capacity {
                released.push_back(now);
                return;
            }

            if let Some(&oldest) = released.front() {
                tokio::time::sleep_until(oldest + self.inner.window).await;
            }
        }
    }
}
