//! Serialization of native toolkit calls.
//!
//! X11 and the GDI pixel format routines are not reentrant across threads,
//! so every stretch of backend code that talks to them runs under the
//! process wide [`ToolkitLock`]. The lock is recursive: a thread already
//! holding it may re-enter freely, which lets callbacks issued from inside
//! a locked region take the lock again without deadlocking.

use std::marker::PhantomData;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;

static GLOBAL: Lazy<ToolkitLock> = Lazy::new(ToolkitLock::new);

/// A process wide recursive lock around native toolkit calls.
#[derive(Debug)]
pub struct ToolkitLock {
    state: Mutex<LockState>,
    cvar: Condvar,
}

#[derive(Debug)]
struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl ToolkitLock {
    fn new() -> Self {
        Self { state: Mutex::new(LockState { owner: None, depth: 0 }), cvar: Condvar::new() }
    }

    /// The process wide lock instance.
    #[inline]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Acquire the lock, blocking until it's free or already held by the
    /// calling thread.
    pub fn lock(&self) -> ToolkitGuard<'_> {
        self.acquire();
        ToolkitGuard { lock: self, _nosend: PhantomData }
    }

    /// Whether the calling thread currently holds the lock.
    pub fn is_owned(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.owner == Some(thread::current().id())
    }

    fn acquire(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        if state.owner == Some(me) {
            state.depth += 1;
            return;
        }
        while state.owner.is_some() {
            state = self.cvar.wait(state).unwrap();
        }
        state.owner = Some(me);
        state.depth = 1;
    }

    /// Release one level of the lock.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread that doesn't hold the lock. That is
    /// always a bug in the caller, not a runtime condition to recover from.
    fn release(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        if state.owner != Some(me) {
            // Release the inner mutex first so the panic only faults the
            // misusing thread instead of poisoning the lock for everyone.
            drop(state);
            panic!("toolkit lock released by a thread that doesn't own it");
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.cvar.notify_one();
        }
    }
}

/// RAII guard for the [`ToolkitLock`].
///
/// Not `Send`: the lock must be released on the thread that took it.
#[derive(Debug)]
pub struct ToolkitGuard<'a> {
    lock: &'a ToolkitLock,
    _nosend: PhantomData<*mut ()>,
}

impl Drop for ToolkitGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn reentrant_on_the_same_thread() {
        let lock = ToolkitLock::new();
        let outer = lock.lock();
        assert!(lock.is_owned());
        {
            let _inner = lock.lock();
            assert!(lock.is_owned());
        }
        // Dropping the inner guard must not release the outer hold.
        assert!(lock.is_owned());
        drop(outer);
        assert!(!lock.is_owned());
    }

    #[test]
    fn excludes_other_threads() {
        let lock = Arc::new(ToolkitLock::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let _guard = lock.lock();
                        // Non-atomic read/modify/write under the lock.
                        let seen = counter.load(Ordering::Relaxed);
                        thread::yield_now();
                        counter.store(seen + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::Relaxed), 800);
        assert!(!lock.is_owned());
    }

    #[test]
    fn release_from_foreign_thread_panics() {
        let lock: &'static ToolkitLock = Box::leak(Box::new(ToolkitLock::new()));
        let _guard = lock.lock();

        let result = thread::spawn(move || lock.release()).join();
        assert!(result.is_err());
    }

    #[test]
    fn usable_after_foreign_release_panic() {
        let lock: &'static ToolkitLock = Box::leak(Box::new(ToolkitLock::new()));
        let guard = lock.lock();

        let result = thread::spawn(move || lock.release()).join();
        assert!(result.is_err());

        // The misuse faults only the misusing thread; the owner still
        // releases cleanly and other threads can take the lock after.
        drop(guard);
        let reacquired = thread::spawn(move || {
            let _guard = lock.lock();
            lock.is_owned()
        })
        .join()
        .unwrap();
        assert!(reacquired);
        assert!(!lock.is_owned());
    }
}
