//! Request de-duplication
//!
//! Concurrent lookups for the same key share one fetch: the first caller claims a
//! one-shot slot and runs the fetch, later callers attach to the slot and await
//! the same result. The slot is released once the fetch completes, so the next
//! miss for that key starts a fresh fetch.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub struct InFlight<K, V> {
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Run `fetch` for `key` unless a fetch for it is already in progress, in which
    /// case wait for that one instead.
    pub async fn run<F, Fut>(&self, key: K, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = slot.get_or_init(fetch).await.clone();

        let mut slots = self.slots.lock().await;
        if slots
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &slot))
        {
            slots.remove(&key);
        }
        value
    }

    /// Number of keys with a fetch in progress
    pub async fn pending(&self) -> usize {
        self.slots.lock().await.len()
    }
}

impl<K, V> Default for InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
