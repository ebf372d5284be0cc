//! Single-writer arbitration of swipes on the same pair within one process.

use pawmatch_model::UserId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type PairKey = (UserId, UserId);

/// Hands out one async lock per unordered `(a, b)` pair, so a swipe and its
/// reciprocal never interleave their check-then-write steps.
#[derive(Clone, Default)]
pub struct PairArbiter {
    locks: Arc<Mutex<HashMap<PairKey, Arc<AsyncMutex<()>>>>>,
}

impl PairArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &UserId, b: &UserId) -> PairKey {
        if a <= b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        }
    }

    pub async fn acquire(&self, a: &UserId, b: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            // Locks nobody holds or waits on can go.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(Self::key(a, b)).or_default())
        };
        lock.lock_owned().await
    }

    /// Pairs currently tracked (held or awaited).
    pub fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pair_lock_is_direction_agnostic() {
        let arbiter = PairArbiter::new();
        let u1 = UserId::from("u1");
        let p1 = UserId::from("p1");

        let guard = arbiter.acquire(&u1, &p1).await;
        let contender = arbiter.clone();
        let (a, b) = (p1.clone(), u1.clone());
        let waiter = tokio::spawn(async move {
            let _guard = contender.acquire(&a, &b).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let arbiter = PairArbiter::new();
        drop(arbiter.acquire(&UserId::from("a"), &UserId::from("b")).await);
        drop(arbiter.acquire(&UserId::from("c"), &UserId::from("d")).await);
        assert_eq!(arbiter.tracked(), 1);
    }
}
