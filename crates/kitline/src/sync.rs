//! Shutdown signalling and the counting semaphore used for withdraw and
//! placer permits.

use crate::invariants::debug_assert_permits_bounded;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cloneable handle for requesting termination.
///
/// Every worker polls this at each loop iteration and inside every sleep, so
/// a trigger is observed within one polling interval. Triggering is
/// idempotent — only the first call has effect.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag {
    triggered: Arc<AtomicBool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests termination.
    #[inline]
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::Release);
    }

    /// Returns `true` once termination has been requested.
    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Sleeps for `duration`, waking early if termination is requested.
    ///
    /// Returns `false` if the sleep was cut short.
    pub fn sleep(&self, duration: Duration) -> bool {
        const CHUNK: Duration = Duration::from_millis(50);

        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(CHUNK));
        }
    }
}

/// A counting semaphore over [`parking_lot`] primitives.
///
/// The cells use two of these: the withdraw permit (bounding how many arms
/// of one cell pick from the belt at once, acquired with a non-blocking try)
/// and the kit placer permit (capacity 1, acquired blocking, so "exactly one
/// placer at a time" is an explicit resource rather than a property of
/// caller discipline).
#[derive(Debug)]
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
    max: usize,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
            max: permits,
        }
    }

    /// Acquires a permit without blocking.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return None;
        }
        *permits -= 1;
        Some(Permit { semaphore: self })
    }

    /// Acquires a permit, blocking until one is available.
    pub fn acquire(&self) -> Permit<'_> {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
        Permit { semaphore: self }
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }

    fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        debug_assert_permits_bounded!(*permits, self.max);
        drop(permits);
        self.available.notify_one();
    }
}

/// RAII permit returned by [`Semaphore::acquire`] and
/// [`Semaphore::try_acquire`]; released on drop.
#[derive(Debug)]
pub struct Permit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn try_acquire_respects_capacity() {
        let sem = Semaphore::new(2);
        let a = sem.try_acquire();
        let b = sem.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(sem.try_acquire().is_none());
        drop(a);
        assert!(sem.try_acquire().is_some());
    }

    #[test]
    fn acquire_blocks_until_release() {
        let sem = Arc::new(Semaphore::new(1));
        let held = sem.acquire();

        let sem2 = Arc::clone(&sem);
        let waiter = thread::spawn(move || {
            let _permit = sem2.acquire();
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(held);
        waiter.join().unwrap();
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn shutdown_sleep_is_interruptible() {
        let flag = ShutdownFlag::new();
        let flag2 = flag.clone();
        let t = thread::spawn(move || flag2.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        flag.trigger();
        assert!(!t.join().unwrap());
        assert!(flag.is_triggered());
    }
}
