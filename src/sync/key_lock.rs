// SPDX-License-Identifier: GPL-3.0-only
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Result of a single-flight run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flight<T> {
    /// This caller executed the body
    Ran(T),
    /// Another execution for the same key was in flight; the body was not invoked
    AlreadyRunning,
}

impl<T> Flight<T> {
    pub fn is_already_running(&self) -> bool {
        matches!(self, Flight::AlreadyRunning)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Flight::Ran(value) => Some(value),
            Flight::AlreadyRunning => None,
        }
    }
}

/// Per-key mutual exclusion
///
/// The registry mutex only guards lookup/insert/removal of per-key slots; the
/// body of a run never executes under it. Acquiring a slot is a single atomic
/// `try_lock`, so two callers can never both observe "not running". A slot is
/// removed when its last guard is released with nobody else holding it.
#[derive(Default)]
pub struct SingleFlightKeyLock {
    slots: Arc<Mutex<SlotMap>>,
}

type SlotMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Proof that the holder is the only in-flight execution for `key`
///
/// Dropping the guard releases the key, including when the holding task
/// panics or is aborted.
pub struct KeyGuard {
    key: String,
    permit: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<SlotMap>>,
}

impl KeyGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        // Unlock first so the count below only sees the registry and waiters
        drop(self.permit.take());

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.get(&self.key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(&self.key);
        }
        debug!(key = %self.key, "Released single-flight key");
    }
}

impl SingleFlightKeyLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    fn guard(&self, key: &str, permit: OwnedMutexGuard<()>) -> KeyGuard {
        KeyGuard {
            key: key.to_string(),
            permit: Some(permit),
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Claim `key` without waiting; `None` when an execution is in flight
    pub fn try_acquire(&self, key: &str) -> Option<KeyGuard> {
        let permit = self.slot(key).try_lock_owned().ok()?;
        debug!(key = %key, "Acquired single-flight key");
        Some(self.guard(key, permit))
    }

    /// Claim `key`, waiting for any in-flight execution to release it first
    pub async fn acquire(&self, key: &str) -> KeyGuard {
        let permit = self.slot(key).lock_owned().await;
        debug!(key = %key, "Acquired single-flight key after waiting");
        self.guard(key, permit)
    }

    /// Run `f` unless another execution for `key` is in flight
    ///
    /// Followers are not given the leader's result: they get
    /// `Flight::AlreadyRunning` immediately and `f` is never invoked.
    pub async fn run<F, Fut, T>(&self, key: &str, f: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(_guard) = self.try_acquire(key) else {
            return Flight::AlreadyRunning;
        };
        Flight::Ran(f().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_runs_execute_once() {
        let lock = Arc::new(SingleFlightKeyLock::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let callers = 16;

        let mut handles = Vec::new();
        for _ in 0..callers {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                lock.run("blog", || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    counter.fetch_add(1, Ordering::SeqCst)
                })
                .await
            }));
        }

        let mut already_running = 0;
        let mut ran = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Flight::Ran(_) => ran += 1,
                Flight::AlreadyRunning => already_running += 1,
            }
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(ran, 1);
        assert_eq!(already_running, callers - 1);
    }

    #[tokio::test]
    async fn test_key_released_after_completion() {
        let lock = SingleFlightKeyLock::new();
        assert_eq!(lock.run("blog", || async { 1 }).await, Flight::Ran(1));
        assert_eq!(lock.run("blog", || async { 2 }).await, Flight::Ran(2));
        assert!(lock.try_acquire("blog").is_some());
    }

    #[tokio::test]
    async fn test_key_released_after_error() {
        let lock = SingleFlightKeyLock::new();
        let first: Flight<Result<(), &str>> = lock.run("blog", || async { Err("boom") }).await;
        assert_eq!(first, Flight::Ran(Err("boom")));
        assert!(lock.try_acquire("blog").is_some());
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block_each_other() {
        let lock = SingleFlightKeyLock::new();
        let _held = lock.try_acquire("a").unwrap();
        assert!(lock.try_acquire("a").is_none());
        assert_eq!(lock.run("b", || async { "ok" }).await, Flight::Ran("ok"));
    }

    #[tokio::test]
    async fn test_follower_does_not_invoke_body() {
        let lock = SingleFlightKeyLock::new();
        let _held = lock.try_acquire("blog").unwrap();
        let invoked = AtomicUsize::new(0);

        let flight = lock
            .run("blog", || async {
                invoked.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(flight.is_already_running());
        assert_eq!(flight.into_option(), None);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let lock = Arc::new(SingleFlightKeyLock::new());
        let held = lock.try_acquire("blog").unwrap();
        assert_eq!(held.key(), "blog");

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let guard = lock.acquire("blog").await;
                guard.key().to_string()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), "blog");
    }

    #[tokio::test]
    async fn test_guard_released_when_task_aborted() {
        let lock = Arc::new(SingleFlightKeyLock::new());
        let task = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.try_acquire("blog").unwrap();
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(lock.try_acquire("blog").is_none());

        task.abort();
        let _ = task.await;
        assert!(lock.try_acquire("blog").is_some());
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let lock = SingleFlightKeyLock::new();
        for i in 0..1000 {
            let key = format!("blog-{}", i);
            assert_eq!(lock.run(&key, || async { i }).await, Flight::Ran(i));
        }
        assert_eq!(lock.tracked_keys(), 0);

        let held = lock.try_acquire("blog").unwrap();
        assert!(lock.try_acquire("blog").is_none());
        assert_eq!(lock.tracked_keys(), 1);
        drop(held);
        assert_eq!(lock.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_slot_kept_while_waiter_queued() {
        let lock = Arc::new(SingleFlightKeyLock::new());
        let held = lock.try_acquire("blog").unwrap();

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.acquire("blog").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The queued waiter still references the slot, so it stays registered
        drop(held);
        assert_eq!(lock.tracked_keys(), 1);

        waiter.await.unwrap();
        assert_eq!(lock.tracked_keys(), 0);
        assert!(lock.try_acquire("blog").is_some());
    }
}
