//! Per-series serialization.
//!
//! The writer and the trimmer take the same key's lock around every store call
//! that touches that key, so a trim's read-then-replace never interleaves with
//! a write to the same series. Different keys never contend.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    async fn key_count(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_waits_for_release() {
        let locks = Arc::new(KeyLocks::new());
        let guard = locks.lock("A/1D/OHLCV").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.lock("A/1D/OHLCV").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyLocks::new();
        let _a = locks.lock("A/1D/OHLCV").await;
        let _b = locks.lock("B/1D/OHLCV").await;
        assert_eq!(locks.key_count().await, 2);
    }
}
