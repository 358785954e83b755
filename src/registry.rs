//! Per-device bookkeeping of lazily created shared resources.
//!
//! Each rendering device (an X display and screen, a Windows adapter) owns
//! at most one set of shared native resources: the probe context, its
//! hidden drawable, and the capability tables read through them. The
//! [`SharedRegistry`] keys those sets by device and guarantees the factory
//! for a key runs exactly once, no matter how many threads race on it.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;

use crate::caps::Capabilities;
use crate::error::Result;

type Slot<T> = Arc<OnceCell<Arc<T>>>;

/// A keyed registry of shared resources with exactly-once construction.
#[derive(Debug)]
pub(crate) struct SharedRegistry<K, T> {
    slots: Mutex<HashMap<K, Slot<T>>>,
}

impl<K: Eq + Hash + Clone, T> SharedRegistry<K, T> {
    pub(crate) fn new() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }

    /// Get the resource for `key`, running `factory` to create it when this
    /// is the first request.
    ///
    /// Concurrent callers for the same key block until the one running the
    /// factory finished and then all observe the same resource. The map
    /// lock is not held while the factory runs, so resources for other
    /// keys stay available.
    ///
    /// A factory failure is returned to every caller waiting on it and
    /// leaves the key vacant, so a later request retries.
    pub(crate) fn get_or_create<F>(&self, key: &K, factory: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap();
            slots.entry(key.clone()).or_insert_with(|| Arc::new(OnceCell::new())).clone()
        };

        let result = slot.get_or_try_init(|| factory().map(Arc::new)).cloned();

        if result.is_err() {
            let mut slots = self.slots.lock().unwrap();
            // Only clear the slot we failed to fill; a concurrent retry may
            // have replaced it already.
            if let Some(current) = slots.get(key) {
                if Arc::ptr_eq(current, &slot) {
                    slots.remove(key);
                }
            }
        }

        result
    }

    /// The resource for `key` when it was already created, without
    /// triggering creation.
    pub(crate) fn peek(&self, key: &K) -> Option<Arc<T>> {
        let slots = self.slots.lock().unwrap();
        slots.get(key).and_then(|slot| slot.get().cloned())
    }

    /// Drop the registry's reference for `key`, returning the resource if
    /// one was registered. Calling this again for the same key is a no-op.
    ///
    /// Outstanding [`Arc`] handles keep the resource alive; the native
    /// teardown happens in the resource's `Drop` once the last one goes.
    pub(crate) fn remove(&self, key: &K) -> Option<Arc<T>> {
        let mut slots = self.slots.lock().unwrap();
        slots.remove(key).and_then(|slot| slot.get().cloned())
    }

    /// Drain every registered resource. Draining an already drained
    /// registry is a no-op yielding nothing.
    pub(crate) fn teardown(&self) -> Vec<Arc<T>> {
        let mut slots = self.slots.lock().unwrap();
        slots.drain().filter_map(|(_, slot)| slot.get().cloned()).collect()
    }
}

/// Decoded capabilities of native formats already seen, keyed by screen
/// and native format id.
///
/// Filled by early resolution and by probe discovery; read wherever a
/// native id has to be turned back into [`Capabilities`] without another
/// platform round trip. Lives inside the per-device shared resource, so
/// its lifetime is the device's.
#[derive(Debug, Default)]
pub(crate) struct FormatCache {
    map: Mutex<HashMap<(i32, i64), Capabilities>>,
}

impl FormatCache {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn insert(&self, screen: i32, native_id: i64, caps: Capabilities) {
        self.map.lock().unwrap().insert((screen, native_id), caps);
    }

    pub(crate) fn get(&self, screen: i32, native_id: i64) -> Option<Capabilities> {
        self.map.lock().unwrap().get(&(screen, native_id)).cloned()
    }

    /// Drop every cached entry. Part of device teardown.
    pub(crate) fn clear(&self) {
        self.map.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn factory_runs_exactly_once_under_contention() {
        let registry = Arc::new(SharedRegistry::<u32, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .get_or_create(&7, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(42)
                        })
                        .unwrap()
                })
            })
            .collect();

        let resources: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resources.iter().all(|r| **r == 42));
        assert!(resources.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn distinct_keys_get_distinct_resources() {
        let registry = SharedRegistry::<u32, u32>::new();
        let first = registry.get_or_create(&1, || Ok(10)).unwrap();
        let second = registry.get_or_create(&2, || Ok(20)).unwrap();
        assert_eq!(*first, 10);
        assert_eq!(*second, 20);
    }

    #[test]
    fn failed_factory_leaves_the_key_vacant() {
        let registry = SharedRegistry::<u32, u32>::new();

        let err = registry
            .get_or_create(&3, || Err(ErrorKind::SelectionExhausted.into()))
            .unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::SelectionExhausted);
        assert!(registry.peek(&3).is_none());

        // The next request retries the factory.
        let resource = registry.get_or_create(&3, || Ok(30)).unwrap();
        assert_eq!(*resource, 30);
    }

    #[test]
    fn peek_does_not_create() {
        let registry = SharedRegistry::<u32, u32>::new();
        assert!(registry.peek(&4).is_none());

        registry.get_or_create(&4, || Ok(40)).unwrap();
        assert_eq!(registry.peek(&4).as_deref(), Some(&40));
    }

    #[test]
    fn teardown_drains_exactly_once() {
        let registry = SharedRegistry::<u32, u32>::new();
        registry.get_or_create(&1, || Ok(10)).unwrap();
        registry.get_or_create(&2, || Ok(20)).unwrap();

        let mut drained: Vec<_> = registry.teardown().iter().map(|r| **r).collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![10, 20]);

        assert!(registry.teardown().is_empty());
        assert!(registry.peek(&1).is_none());
    }

    #[test]
    fn format_cache_is_keyed_by_screen_and_id() {
        use crate::caps::CapabilitiesBuilder;

        let cache = FormatCache::new();
        let caps = CapabilitiesBuilder::new().with_color_sizes(5, 6, 5).build();
        cache.insert(0, 33, caps.clone());

        assert_eq!(cache.get(0, 33), Some(caps));
        assert_eq!(cache.get(1, 33), None);
        assert_eq!(cache.get(0, 34), None);

        cache.clear();
        assert_eq!(cache.get(0, 33), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SharedRegistry::<u32, u32>::new();
        registry.get_or_create(&5, || Ok(50)).unwrap();

        assert_eq!(registry.remove(&5).as_deref(), Some(&50));
        assert!(registry.remove(&5).is_none());
        assert!(registry.peek(&5).is_none());
    }
}
