use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use meshnet_util::Digest;

/// A local consumer waiting on a specific block digest (spec.md §4.8,
/// supplemented by the original's multi-caller table — SPEC_FULL §4). The
/// resource [`crate`] reader registers one of these before sending a `Call`
/// and is released the instant a matching `Data` is absorbed into the
/// store.
pub trait Caller: Send + Sync {
    fn on_arrived(&self, digest: Digest);
}

/// `target digest -> set<Caller>`, so more than one local reader can await
/// the same digest and all be released together once it lands.
#[derive(Default)]
pub struct CallerRegistry {
    callers: Mutex<HashMap<Digest, Vec<Arc<dyn Caller>>>>,
}

impl CallerRegistry {
    pub fn new() -> CallerRegistry {
        CallerRegistry::default()
    }

    /// Returns `true` if this is the first caller registered for `digest`
    /// — the handler uses that to decide whether it actually needs to send
    /// a `Call` out, or whether one is already in flight.
    pub fn register_caller(&self, digest: Digest, caller: Arc<dyn Caller>) -> bool {
        let mut callers = self.lock();
        let entry = callers.entry(digest).or_default();
        let is_first = entry.is_empty();
        entry.push(caller);
        is_first
    }

    pub fn unregister_caller(&self, digest: Digest, caller: &Arc<dyn Caller>) {
        let mut callers = self.lock();
        if let Some(entry) = callers.get_mut(&digest) {
            entry.retain(|c| !Arc::ptr_eq(c, caller));
            if entry.is_empty() {
                callers.remove(&digest);
            }
        }
    }

    /// `Data(target, bytes)` landed and was absorbed into the store:
    /// release every local caller waiting on `target` (spec §4.5's `Data`
    /// dispatch arm, `tpn/core.cpp`'s `unregisterAllCallers`).
    pub fn unregister_all_callers(&self, digest: Digest) {
        let waiting = self.lock().remove(&digest).unwrap_or_default();
        for caller in waiting {
            caller.on_arrived(digest);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Digest, Vec<Arc<dyn Caller>>>> {
        self.callers.lock().expect("meshnet-peer: caller registry mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingCaller(Arc<AtomicUsize>);
    impl Caller for CountingCaller {
        fn on_arrived(&self, _digest: Digest) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn positive_first_registration_reports_true() {
        let registry = CallerRegistry::new();
        let digest = Digest::from_bytes(b"a");
        let count = Arc::new(AtomicUsize::new(0));

        assert!(registry.register_caller(digest, Arc::new(CountingCaller(count.clone()))));
        assert!(!registry.register_caller(digest, Arc::new(CountingCaller(count.clone()))));
    }

    #[test]
    fn positive_unregister_all_releases_every_waiter() {
        let registry = CallerRegistry::new();
        let digest = Digest::from_bytes(b"a");
        let count = Arc::new(AtomicUsize::new(0));

        registry.register_caller(digest, Arc::new(CountingCaller(count.clone())));
        registry.register_caller(digest, Arc::new(CountingCaller(count.clone())));
        registry.unregister_all_callers(digest);

        assert_eq!(count.load(Ordering::SeqCst), 2);
        // A second release is a no-op: nothing left registered.
        registry.unregister_all_callers(digest);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn negative_unregister_one_caller_leaves_others() {
        let registry = CallerRegistry::new();
        let digest = Digest::from_bytes(b"a");
        let count = Arc::new(AtomicUsize::new(0));
        let first: Arc<dyn Caller> = Arc::new(CountingCaller(count.clone()));
        let second: Arc<dyn Caller> = Arc::new(CountingCaller(count.clone()));

        registry.register_caller(digest, first.clone());
        registry.register_caller(digest, second);
        registry.unregister_caller(digest, &first);
        registry.unregister_all_callers(digest);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
