//! Single-flight coordination for variant builds.
//!
//! Concurrent requests for the same variant key join one computation instead
//! of each decoding, resizing and writing the same bytes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;

type InFlight<T> = HashMap<String, Entry<T>>;

/// A key's shared cell and the number of callers currently holding it.
struct Entry<T> {
    cell: Arc<OnceCell<T>>,
    waiters: usize,
}

/// Per-key join of in-flight computations.
///
/// A caller that drops out before the computation finishes (for example on
/// cancellation) hands the work over to the next waiting caller. Results are
/// only shared while the computation is in flight; a finished or abandoned
/// key is removed so later callers start fresh.
pub struct SingleFlight<T> {
    in_flight: Mutex<InFlight<T>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key`, or wait for the run already in progress.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut in_flight = self.lock();
            let entry = in_flight.entry(key.to_string()).or_insert_with(|| Entry {
                cell: Arc::new(OnceCell::new()),
                waiters: 0,
            });
            entry.waiters += 1;
            entry.cell.clone()
        };

        let waiter = Waiter {
            flight: self,
            key,
            cell,
        };

        waiter.cell.get_or_init(work).await.clone()
    }

    /// Number of keys with a computation in progress.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, InFlight<T>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One caller's hold on a key.
///
/// Released on every exit path, including when the caller's future is
/// dropped mid-computation.
struct Waiter<'a, T> {
    flight: &'a SingleFlight<T>,
    key: &'a str,
    cell: Arc<OnceCell<T>>,
}

impl<T> Drop for Waiter<'_, T> {
    fn drop(&mut self) {
        let mut in_flight = self
            .flight
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(entry) = in_flight.get_mut(self.key) else {
            return;
        };
        if !Arc::ptr_eq(&entry.cell, &self.cell) {
            return;
        }

        entry.waiters -= 1;
        if entry.waiters == 0 || self.cell.initialized() {
            in_flight.remove(self.key);
        }
    }
}
