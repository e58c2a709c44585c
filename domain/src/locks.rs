use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per identity, so read-modify-write cycles on the same
/// account never interleave while different accounts proceed in parallel.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task holds the lock for `identity`
    pub async fn acquire(&self, identity: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= PRUNE_THRESHOLD {
                // Entries only referenced by the map are idle
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(identity.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_identity_is_serialised() {
        let locks = Arc::new(IdentityLocks::new());
        let guard = locks.acquire("alice").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("alice").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_identities_do_not_wait() {
        let locks = IdentityLocks::new();
        let _alice = locks.acquire("alice").await;

        let bob = tokio::time::timeout(Duration::from_millis(100), locks.acquire("bob")).await;
        assert!(bob.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = IdentityLocks::new();
        for i in 0..PRUNE_THRESHOLD {
            drop(locks.acquire(&format!("user-{i}")).await);
        }
        let _held = locks.acquire("fresh").await;
        assert_eq!(locks.len(), 1);
    }
}
