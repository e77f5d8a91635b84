//! Scoped exclusive access to values shared between the UI actor and the
//! event-dispatch actor.
//!
//! A [`Lock`] never hands out a plain reference: every access goes through a
//! [`Ref`] guard (or a closure) and the lock is released when the guard goes
//! out of scope, including on early return or unwinding. Acquiring the same
//! `Lock` twice on one thread deadlocks; callers must not nest.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct Lock<T> {
    inner: Mutex<T>,
}

/// Guard returned by [`Lock::lock`].
pub struct Ref<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    pub fn lock(&self) -> Ref<'_, T> {
        let guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("shared state lock was poisoned; recovering");
                poisoned.into_inner()
            }
        };
        Ref { guard }
    }

    /// Run `f` with exclusive access and return its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn set(&self, value: T) {
        *self.lock() = value;
    }

    pub fn into_inner(self) -> T {
        match self.inner.into_inner() {
            Ok(value) => value,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T: Clone> Lock<T> {
    pub fn get(&self) -> T {
        self.lock().clone()
    }
}

impl<T> Deref for Ref<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Ref<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::Lock;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn guard_releases_on_scope_exit() {
        let lock = Lock::new(1);
        {
            let mut value = lock.lock();
            *value += 1;
        }
        assert_eq!(lock.get(), 2);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let lock = Arc::new(Lock::new(0usize));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        lock.with(|v| *v += 1);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(lock.get(), 4000);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let lock = Arc::new(Lock::new(String::from("kept")));
        let clone = Arc::clone(&lock);
        let _ = thread::spawn(move || {
            let _guard = clone.lock();
            panic!("poison");
        })
        .join();
        assert_eq!(lock.get(), "kept");
    }
}
