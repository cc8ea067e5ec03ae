//! A mutex that knows which thread holds it.
//!
//! [`OwnedMutex`] behaves like an ordinary exclusive mutex, but additionally
//! records the holder so code can check [`OwnedMutex::owns_lock`] before
//! locking. This catches the classic bug of a callback, invoked while a lock
//! is held, trying to take the same lock again. It is not a recursive mutex:
//! locking twice from the same thread still deadlocks.

use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, MutexGuard};

/// Exclusive mutex with holder tracking.
#[derive(Debug, Default)]
pub struct OwnedMutex<T> {
    inner: Mutex<T>,
    owner: Mutex<Option<ThreadId>>,
}

impl<T> OwnedMutex<T> {
    /// Create a new unlocked mutex.
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            owner: Mutex::new(None),
        }
    }

    /// Block until the lock is acquired.
    pub fn lock(&self) -> OwnedMutexGuard<'_, T> {
        let guard = self.inner.lock();
        *self.owner.lock() = Some(thread::current().id());
        OwnedMutexGuard {
            guard,
            owner: &self.owner,
        }
    }

    /// Acquire the lock if it is free.
    pub fn try_lock(&self) -> Option<OwnedMutexGuard<'_, T>> {
        let guard = self.inner.try_lock()?;
        *self.owner.lock() = Some(thread::current().id());
        Some(OwnedMutexGuard {
            guard,
            owner: &self.owner,
        })
    }

    /// True iff the calling thread currently holds the lock.
    pub fn owns_lock(&self) -> bool {
        *self.owner.lock() == Some(thread::current().id())
    }

    /// Consume the mutex and return the protected value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

/// Guard returned by [`OwnedMutex::lock`]. Dropping it unlocks.
pub struct OwnedMutexGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    owner: &'a Mutex<Option<ThreadId>>,
}

impl<T> Deref for OwnedMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OwnedMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OwnedMutexGuard<'_, T> {
    fn drop(&mut self) {
        // Cleared before `guard` is dropped, i.e. while still holding the lock.
        *self.owner.lock() = None;
    }
}
