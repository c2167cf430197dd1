//! Per-client state storage shared by all limiter algorithms.

use std::hash::Hash;

use dashmap::DashMap;
use tracing::debug;

/// Marker for types usable as client identifiers.
pub trait ClientKey: Hash + Eq + Clone + Send + Sync + 'static {}

impl<T: Hash + Eq + Clone + Send + Sync + 'static> ClientKey for T {}

/// A client's algorithm state plus the time it was last touched.
#[derive(Debug)]
struct Slot<S> {
    state: S,
    last_seen: f64,
}

/// Mapping from client identifier to one algorithm's state record.
///
/// Each update runs with the entry's shard write-locked, so the
/// read-decide-write sequence for a single client is atomic. Calls for
/// clients on other shards proceed in parallel.
#[derive(Debug)]
pub struct ClientStateStore<K: ClientKey, S> {
    slots: DashMap<K, Slot<S>>,
}

impl<K: ClientKey, S> ClientStateStore<K, S> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Run `apply` against the client's state, creating it with `init` on
    /// first sight.
    ///
    /// `now` is sampled after the entry lock is taken, so same-client calls
    /// observe non-decreasing timestamps in lock order.
    pub fn update<R>(
        &self,
        client: &K,
        now: impl Fn() -> f64,
        init: impl FnOnce(f64) -> S,
        apply: impl FnOnce(&mut S, f64) -> R,
    ) -> R {
        let mut slot = match self.slots.get_mut(client) {
            Some(slot) => slot,
            None => self.slots.entry(client.clone()).or_insert_with(|| {
                let created = now();
                debug!(created_at = created, "Creating new client state");
                Slot {
                    state: init(created),
                    last_seen: created,
                }
            }),
        };

        let at = now();
        slot.last_seen = at;
        apply(&mut slot.state, at)
    }

    /// Remove every client not seen within `idle` seconds of `now`.
    ///
    /// Returns the number of clients removed.
    pub fn evict_idle(&self, now: f64, idle: f64) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| now - slot.last_seen < idle);
        let evicted = before.saturating_sub(self.slots.len());
        if evicted > 0 {
            debug!(evicted, idle_secs = idle, "Evicted idle clients");
        }
        evicted
    }

    /// Get the number of tracked clients.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no client has been seen yet (or all were evicted).
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<K: ClientKey, S: Clone> ClientStateStore<K, S> {
    /// Copy of a client's current state, without touching it.
    pub fn snapshot(&self, client: &K) -> Option<S> {
        self.slots.get(client).map(|slot| slot.state.clone())
    }
}

impl<K: ClientKey, S> Default for ClientStateStore<K, S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_creates_lazily() {
        let store: ClientStateStore<String, u32> = ClientStateStore::new();
        assert!(store.is_empty());

        let value = store.update(&"a".to_string(), || 0.0, |_| 10, |s, _| {
            *s += 1;
            *s
        });

        assert_eq!(value, 11);
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot(&"a".to_string()), Some(11));
        assert_eq!(store.snapshot(&"b".to_string()), None);
    }

    #[test]
    fn test_init_runs_once_per_client() {
        let store: ClientStateStore<u64, u32> = ClientStateStore::new();

        for _ in 0..3 {
            store.update(&7, || 0.0, |_| 0, |s, _| *s += 1);
        }

        assert_eq!(store.snapshot(&7), Some(3));
    }

    #[test]
    fn test_evict_idle_keeps_recent_clients() {
        let store: ClientStateStore<&'static str, ()> = ClientStateStore::new();
        store.update(&"stale", || 1.0, |_| (), |_, _| ());
        store.update(&"fresh", || 9.0, |_| (), |_, _| ());

        let evicted = store.evict_idle(10.0, 5.0);

        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);
        assert!(store.snapshot(&"fresh").is_some());
        assert!(store.snapshot(&"stale").is_none());
    }
}
