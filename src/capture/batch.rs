//! Batch coordinator - at most one batch capture in flight
//!
//! Callers that arrive while a batch runs wait for it and then read the cache
//! instead of starting their own.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Result of [`BatchCoordinator::run_batch`]
#[derive(Debug)]
pub enum BatchOutcome<T> {
    /// This caller ran the batch
    Ran(T),
    /// Another caller's batch completed while this one waited
    Joined,
}

impl<T> BatchOutcome<T> {
    pub fn ran_here(&self) -> bool {
        matches!(self, BatchOutcome::Ran(_))
    }

    pub fn into_result(self) -> Option<T> {
        match self {
            BatchOutcome::Ran(value) => Some(value),
            BatchOutcome::Joined => None,
        }
    }
}

enum Role {
    Lead(watch::Sender<bool>),
    Join(watch::Receiver<bool>),
}

#[derive(Default)]
pub struct BatchCoordinator {
    in_flight: Mutex<Option<watch::Receiver<bool>>>,
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<watch::Receiver<bool>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `batch` unless one is already in flight, in which case wait for it
    pub async fn run_batch<F, Fut, T>(&self, batch: F) -> BatchOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let role = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(rx) => Role::Join(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(false);
                    *slot = Some(rx);
                    Role::Lead(tx)
                }
            }
        };

        match role {
            Role::Lead(tx) => {
                // Released on drop, so a cancelled leader still wakes its waiters
                let _release = Release {
                    coordinator: self,
                    tx,
                };
                BatchOutcome::Ran(batch().await)
            }
            Role::Join(mut rx) => {
                // Err means the sender is gone, which also ends the batch
                let _ = rx.wait_for(|done| *done).await;
                BatchOutcome::Joined
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.slot().is_some()
    }
}

struct Release<'a> {
    coordinator: &'a BatchCoordinator,
    tx: watch::Sender<bool>,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.coordinator.slot().take();
        let _ = self.tx.send(true);
    }
}
