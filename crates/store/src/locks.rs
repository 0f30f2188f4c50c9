//! Per-user mutual exclusion for store read-modify-write sequences.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async mutex per user id, so an evaluator sweep and a
/// command handler mutating the same user's record serialize against each
/// other while different users stay independent.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one user. The guard is held through the user's
    /// whole load-modify-save pass.
    pub async fn lock(&self, user: &str) -> OwnedMutexGuard<()> {
        let user_lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(user.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        user_lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_user_serializes() {
        let locks = Arc::new(UserLocks::new());
        let guard = locks.lock("1").await;

        let locks2 = locks.clone();
        let pending = tokio::spawn(async move {
            let _guard = locks2.lock("1").await;
        });

        // The second acquire cannot complete while the first guard is held.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        drop(guard);
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_users_are_independent() {
        let locks = UserLocks::new();
        let _one = locks.lock("1").await;
        // Must not deadlock.
        let _two = locks.lock("2").await;
    }
}
