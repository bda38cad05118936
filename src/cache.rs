use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::resolver::Resolution;

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Run-scoped map from natural key to resolved handle.
///
/// Each key has its own slot lock, so the check-then-create sequence for one
/// key is serialised while other keys resolve in parallel. The outer map
/// lock is only held long enough to find or add a slot.
pub struct KeyedCache<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for KeyedCache<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> KeyedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, or runs `resolve` while holding
    /// the key's lock and stores what it found.
    ///
    /// `NotFound` and errors leave the key unresolved so a later call tries
    /// again.
    pub fn get_or_try_insert_with<F, E>(&self, key: K, resolve: F) -> Result<Resolution<V>, E>
    where
        F: FnOnce() -> Result<Resolution<V>, E>,
    {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key).or_default())
        };

        let mut value = lock(&slot);
        if let Some(existing) = value.as_ref() {
            return Ok(Resolution::Cached(existing.clone()));
        }

        let resolution = resolve()?;
        if let Some(resolved) = resolution.value() {
            *value = Some(resolved.clone());
        }
        Ok(resolution)
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let value = lock(&slot);
        value.clone()
    }

    /// Number of keys holding a resolved value.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot<V>> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|slot| lock(slot).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn second_lookup_hits_cache() {
        let cache = KeyedCache::<String, u32>::new();
        let first: Result<_, ()> =
            cache.get_or_try_insert_with("a".to_string(), || Ok(Resolution::Created(1)));
        assert_matches!(first, Ok(Resolution::Created(1)));

        let second: Result<_, ()> =
            cache.get_or_try_insert_with("a".to_string(), || Ok(Resolution::Created(2)));
        assert_matches!(second, Ok(Resolution::Cached(1)));
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn not_found_and_errors_are_not_cached() {
        let cache = KeyedCache::<&str, u32>::new();
        let missing: Result<_, ()> = cache.get_or_try_insert_with("x", || Ok(Resolution::NotFound));
        assert_matches!(missing, Ok(Resolution::NotFound));

        let failed: Result<Resolution<u32>, &str> =
            cache.get_or_try_insert_with("x", || Err("boom"));
        assert_matches!(failed, Err("boom"));

        let found: Result<_, ()> = cache.get_or_try_insert_with("x", || Ok(Resolution::Found(7)));
        assert_matches!(found, Ok(Resolution::Found(7)));
        assert!(!cache.is_empty());
    }

    #[test]
    fn concurrent_callers_resolve_once_per_key() {
        let cache = KeyedCache::<&str, usize>::new();
        let calls = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let result: Result<_, ()> = cache.get_or_try_insert_with("shared", || {
                        thread::sleep(Duration::from_millis(20));
                        Ok(Resolution::Created(calls.fetch_add(1, Ordering::SeqCst)))
                    });
                    assert_eq!(result.unwrap().into_value(), Some(0));
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
