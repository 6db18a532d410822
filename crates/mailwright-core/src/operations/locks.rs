use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// One async mutex per message id, so read-then-modify sequences on the same
/// message never interleave inside this process.
#[derive(Debug, Default)]
pub struct MessageLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl MessageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and holds the lock for `message_id` until the guard drops.
    pub async fn lock(&self, message_id: &str) -> OwnedMutexGuard<()> {
        self.entry(message_id).await.lock_owned().await
    }

    async fn entry(&self, message_id: &str) -> Arc<Mutex<()>> {
        {
            let locks = self.locks.read().await;
            if let Some(lock) = locks.get(message_id) {
                return lock.clone();
            }
        }

        let mut locks = self.locks.write().await;
        // Entries nobody holds or waits on are dropped.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(message_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn tracked(&self) -> usize {
        self.locks.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_message_is_serialized() {
        let locks = Arc::new(MessageLocks::new());
        let guard = locks.lock("m1").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("m1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "second lock must wait for the first");

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finishes")
            .expect("task ok");
    }

    #[tokio::test]
    async fn different_messages_do_not_block() {
        let locks = MessageLocks::new();
        let _a = locks.lock("a").await;
        tokio::time::timeout(Duration::from_millis(200), locks.lock("b"))
            .await
            .expect("independent message locks");
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = MessageLocks::new();
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        let _c = locks.lock("c").await;
        assert_eq!(locks.tracked().await, 1);
    }
}
