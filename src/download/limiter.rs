//! Resizable admission gate for concurrent transfers.
//!
//! A plain [`Semaphore`] can only grow. Shrinking is done by retiring
//! permits: idle permits are forgotten immediately, and for each permit still
//! held the limiter records a debt that is paid when a holder releases.
//! Waiters stay queued on the same semaphore across resizes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Admission limiter whose capacity can change while permits are held.
#[derive(Debug, Clone)]
pub struct AdmissionLimiter {
    state: Arc<LimiterState>,
}

#[derive(Debug)]
struct LimiterState {
    semaphore: Arc<Semaphore>,
    capacity: Mutex<usize>,
    debt: AtomicUsize,
}

/// RAII guard for one admission slot.
///
/// Dropping it releases the slot, or retires it if the limiter shrank.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
    state: Arc<LimiterState>,
}

impl AdmissionLimiter {
    /// Creates a limiter admitting `capacity` holders (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Arc::new(LimiterState {
                semaphore: Arc::new(Semaphore::new(capacity)),
                capacity: Mutex::new(capacity),
                debt: AtomicUsize::new(0),
            }),
        }
    }

    /// Current configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        *self
            .state
            .capacity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Permits currently free for immediate admission.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.semaphore.available_permits()
    }

    /// Changes the capacity in place. Only future admissions are affected.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut current = self
            .state
            .capacity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if capacity == *current {
            return;
        }

        if capacity > *current {
            let mut grow = capacity - *current;
            // Cancel outstanding retirements before minting new permits.
            while grow > 0 && self.state.try_pay_debt() {
                grow -= 1;
            }
            self.state.semaphore.add_permits(grow);
        } else {
            for _ in 0..(*current - capacity) {
                match self.state.semaphore.try_acquire() {
                    Ok(idle) => idle.forget(),
                    Err(_) => {
                        self.state.debt.fetch_add(1, Ordering::AcqRel);
                    }
                }
            }
        }

        debug!(from = *current, to = capacity, "concurrency budget changed");
        *current = capacity;
    }

    /// Waits for a slot.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError`] only if the semaphore was closed.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AcquireError> {
        let permit = Arc::clone(&self.state.semaphore).acquire_owned().await?;
        Ok(AdmissionPermit {
            permit: Some(permit),
            state: Arc::clone(&self.state),
        })
    }
}

impl LimiterState {
    fn try_pay_debt(&self) -> bool {
        self.debt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |debt| debt.checked_sub(1))
            .is_ok()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take()
            && self.state.try_pay_debt()
        {
            permit.forget();
        }
    }
}
