//! Checkout pool for resources that allow one open transaction each
//!
//! A Kafka producer can hold one transaction at a time, so the broker keeps
//! several producers (each with its own `transactional.id`) and lends one per
//! saga. Waiting for a free one is the caller's to bound.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::PublishError;

pub struct Pool<T> {
    idle: Arc<Mutex<Vec<T>>>,
    permits: Arc<Semaphore>,
}

impl<T> Pool<T> {
    pub fn new(items: Vec<T>) -> Self {
        let permits = Arc::new(Semaphore::new(items.len()));
        Self {
            idle: Arc::new(Mutex::new(items)),
            permits,
        }
    }

    /// Wait for a free item. It returns to the pool when the lease drops.
    pub async fn checkout(&self) -> Result<Lease<T>, PublishError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| PublishError::Begin(e.to_string()))?;
        let item = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .ok_or_else(|| PublishError::Begin("pool permit without idle item".to_string()))?;
        Ok(Lease {
            item: Some(item),
            idle: self.idle.clone(),
            _permit: permit,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Exclusive use of one pooled item
pub struct Lease<T> {
    item: Option<T>,
    idle: Arc<Mutex<Vec<T>>>,
    // Released after `drop` has put the item back
    _permit: OwnedSemaphorePermit,
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `drop` takes the item
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.idle
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_distinct_items_lent_concurrently() {
        let pool = Pool::new(vec!["p-0", "p-1"]);
        let a = pool.checkout().await.unwrap();
        let b = pool.checkout().await.unwrap();
        assert_ne!(*a, *b);
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_waits_until_lease_dropped() {
        let pool = Arc::new(Pool::new(vec![7u32]));
        let held = pool.checkout().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { *pool.checkout().await.unwrap() })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), 7);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_can_be_abandoned_by_timeout() {
        let pool = Pool::new(vec![()]);
        let _held = pool.checkout().await.unwrap();

        let waited = tokio::time::timeout(Duration::from_secs(1), pool.checkout()).await;
        assert!(waited.is_err());
        assert_eq!(pool.available(), 0);
    }
}
