//! Kernel state locking mechanism.
//!
//! Every piece of scheduler state that both thread context and ISR
//! context may mutate lives in a [`CpuLockCell`], whose contents are
//! only reachable through a [`CpuLockToken`]. The token can only be
//! materialized while the port's critical section is held, so lockless
//! access is a compile-time error rather than a race waiting to happen.
use core::ops;
use tokenlock::UnsyncTokenLock;

use crate::port;

pub(crate) enum CpuLockTag {}

/// The key that "unlocks" [`CpuLockCell`].
pub(crate) type CpuLockToken = tokenlock::UnsyncSingletonToken<CpuLockTag>;

/// The keyhole type for [`UnsyncTokenLock`] that can be "unlocked" by
/// [`CpuLockToken`].
pub(crate) type CpuLockKeyhole = tokenlock::SingletonTokenId<CpuLockTag>;

/// Borrowed version of [`CpuLockGuard`]. This is equivalent to
/// `&'a mut CpuLockGuard` but does not consume memory.
///
/// When you pass a `&'a mut _` to a function, the compiler automatically
/// reborrows it so that the original remains accessible after the call.
/// This does not happen with `CpuLockTokenRefMut`; call
/// [`borrow_mut`](tokenlock::UnsyncSingletonTokenRefMut::borrow_mut)
/// manually instead.
pub(crate) type CpuLockTokenRefMut<'a> = tokenlock::UnsyncSingletonTokenRefMut<'a, CpuLockTag>;

/// Cell type whose contents can be accessed by [`CpuLockToken`] (which
/// can be obtained by [`lock_cpu`] or [`lock_cpu_isr`]).
pub(crate) struct CpuLockCell<T: ?Sized>(UnsyncTokenLock<T, CpuLockKeyhole>);

impl<T> CpuLockCell<T> {
    pub(crate) const fn new(x: T) -> Self {
        Self(UnsyncTokenLock::new(CpuLockKeyhole::new(), x))
    }
}

impl<T: ?Sized> ops::Deref for CpuLockCell<T> {
    type Target = UnsyncTokenLock<T, CpuLockKeyhole>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Safety: the contents are only reachable through a token, and tokens
// only exist while the port's critical section is held, which serializes
// all accesses on the single core.
unsafe impl<T: Send + ?Sized> Sync for CpuLockCell<T> {}
unsafe impl<T: Send + ?Sized> Send for CpuLockCell<T> {}

/// Enter the critical section from thread context and get an RAII guard.
///
/// The guard must not be held across a call that re-enters the kernel's
/// public API; nesting the critical section from kernel code would mint
/// a second token.
pub(crate) fn lock_cpu() -> CpuLockGuard {
    port::lock();
    // Safety: the critical section was just entered, so no other token
    // exists at this point.
    unsafe { assume_cpu_lock() }
}

/// Enter the critical section from ISR context.
pub(crate) fn lock_cpu_isr() -> CpuLockIsrGuard {
    port::lock_isr();
    // Safety: as in `lock_cpu`.
    CpuLockIsrGuard {
        token: unsafe { CpuLockToken::new_unchecked() },
    }
}

/// Assume the critical section is held and get a [`CpuLockGuard`].
///
/// # Safety
///
/// The critical section must really be held, and no other token (or
/// guard) may exist at the point of the call.
pub(crate) unsafe fn assume_cpu_lock() -> CpuLockGuard {
    CpuLockGuard {
        // Safety: upheld by the caller.
        token: unsafe { CpuLockToken::new_unchecked() },
    }
}

/// RAII guard for the critical section entered from thread context.
///
/// [`CpuLockToken`] can be borrowed from this type.
pub(crate) struct CpuLockGuard {
    token: CpuLockToken,
}

impl CpuLockGuard {
    /// Construct a [`CpuLockTokenRefMut`] by borrowing `self`.
    pub(crate) fn borrow_mut(&mut self) -> CpuLockTokenRefMut<'_> {
        self.token.borrow_mut()
    }
}

impl Drop for CpuLockGuard {
    fn drop(&mut self) {
        port::unlock();
    }
}

impl ops::Deref for CpuLockGuard {
    type Target = CpuLockToken;
    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl ops::DerefMut for CpuLockGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.token
    }
}

/// RAII guard for the critical section entered from ISR context.
pub(crate) struct CpuLockIsrGuard {
    token: CpuLockToken,
}

impl CpuLockIsrGuard {
    pub(crate) fn borrow_mut(&mut self) -> CpuLockTokenRefMut<'_> {
        self.token.borrow_mut()
    }
}

impl Drop for CpuLockIsrGuard {
    fn drop(&mut self) {
        port::unlock_isr();
    }
}

impl ops::Deref for CpuLockIsrGuard {
    type Target = CpuLockToken;
    fn deref(&self) -> &Self::Target {
        &self.token
    }
}

impl ops::DerefMut for CpuLockIsrGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.token
    }
}
