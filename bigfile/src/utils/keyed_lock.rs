use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// A set of async mutexes addressed by key. Entries exist only while some
/// task holds or waits for the key, so the map does not grow with the
/// number of keys ever seen.
pub struct KeyedMutex<K> {
    slots: Arc<Mutex<HashMap<K, Slot>>>,
}

impl<K> Default for KeyedMutex<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedMutex<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other task holds `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let slot = {
            let mut slots = lock_map(&self.slots);
            slots.entry(key.clone()).or_default().clone()
        };
        // Built before waiting so a waiter cancelled mid-await still runs the
        // map cleanup in `Drop`.
        let mut keyed = KeyedGuard {
            key,
            slot,
            guard: None,
            slots: self.slots.clone(),
        };
        keyed.guard = Some(keyed.slot.clone().lock_owned().await);
        keyed
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        lock_map(&self.slots).len()
    }
}

fn lock_map<K>(slots: &Mutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    // The map is only ever mutated in short, non-panicking sections.
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<K, Slot>>>,
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = lock_map(&self.slots);
        // One reference in the map, one in this guard: nobody else is waiting.
        if Arc::strong_count(&self.slot) == 2 {
            slots.remove(&self.key);
        }
    }
}
