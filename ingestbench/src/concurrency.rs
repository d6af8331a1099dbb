//! Concurrency limiter for in-flight requests.
//!
//! [`ConcurrencyLimiter`] caps the number of in-flight requests of a scenario using a tokio
//! semaphore. Each acquired [`ConcurrencyPermit`] notifies waiters on drop, allowing
//! [`ConcurrencyLimiter::wait_all`] to act as the completion barrier once all permits have been
//! returned.

use std::sync::Arc;

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::pacing::HIGH_RATE_THRESHOLD;

/// Concurrency ceiling for target rates up to [`HIGH_RATE_THRESHOLD`].
pub const DEFAULT_CONCURRENCY: usize = 50;

/// Concurrency ceiling for target rates above [`HIGH_RATE_THRESHOLD`].
pub const HIGH_RATE_CONCURRENCY: usize = 100;

/// Returns the concurrency ceiling for a target rate.
pub fn ceiling_for_rate(rate: u32) -> usize {
    if rate > HIGH_RATE_THRESHOLD {
        HIGH_RATE_CONCURRENCY
    } else {
        DEFAULT_CONCURRENCY
    }
}

/// Limits concurrent requests and tracks the in-flight count.
///
/// Permits are acquired with [`acquire`](Self::acquire) and automatically returned when the
/// [`ConcurrencyPermit`] is dropped.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max: usize,
    released: Arc<Notify>,
}

impl ConcurrencyLimiter {
    /// Creates a new limiter with the given maximum number of permits.
    pub fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
            released: Arc::new(Notify::new()),
        }
    }

    /// Returns the maximum number of concurrent permits.
    pub fn capacity(&self) -> usize {
        self.max
    }

    /// Waits for a free slot and acquires a concurrency permit.
    pub async fn acquire(&self) -> ConcurrencyPermit {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            unreachable!("the limiter never closes its semaphore");
        };

        ConcurrencyPermit {
            permit: Some(permit),
            released: Arc::clone(&self.released),
        }
    }

    /// Returns the number of permits currently held.
    pub fn used_permits(&self) -> usize {
        self.max - self.semaphore.available_permits()
    }

    /// Waits until all permits have been returned.
    pub async fn wait_all(&self) {
        loop {
            let notified = self.released.notified();
            if self.used_permits() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// RAII guard for a concurrency permit.
///
/// Dropping this permit releases it back to the [`ConcurrencyLimiter`] and notifies any task
/// waiting in [`ConcurrencyLimiter::wait_all`].
#[derive(Debug)]
pub struct ConcurrencyPermit {
    permit: Option<OwnedSemaphorePermit>,
    released: Arc<Notify>,
}

impl Drop for ConcurrencyPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.released.notify_waiters();
    }
}
