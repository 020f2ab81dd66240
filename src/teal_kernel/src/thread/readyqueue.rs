//! Thread ready queue (internal use only).
//!
//! A priority-ordered intrusive doubly-linked list: the head is the
//! highest-priority eligible thread (lowest priority value), and threads
//! sharing a priority keep their insertion order, which is what makes
//! equal-priority scheduling round-robin across successive reschedules.
//! The links live inside the TCB, so no operation allocates.
use crate::klock::{CpuLockCell, CpuLockTokenRefMut};

use super::Thread;

/// A thread's membership in the ready queue.
pub(crate) struct Link {
    prev: CpuLockCell<Option<&'static Thread>>,
    next: CpuLockCell<Option<&'static Thread>>,
}

impl Link {
    pub(crate) const fn new() -> Self {
        Self {
            prev: CpuLockCell::new(None),
            next: CpuLockCell::new(None),
        }
    }
}

pub(crate) struct ReadyQueue {
    head: CpuLockCell<Option<&'static Thread>>,
}

impl ReadyQueue {
    pub(crate) const fn new() -> Self {
        Self {
            head: CpuLockCell::new(None),
        }
    }

    /// Insert `thread` after every queued thread whose priority value is
    /// less than or equal to `thread`'s, and before the first one whose
    /// value is greater. O(n) in the queue length.
    ///
    /// The thread must not already be queued.
    pub(crate) fn push(&self, mut lock: CpuLockTokenRefMut<'_>, thread: &'static Thread) {
        let prio = thread.prio.get(&*lock);
        let mut cursor = self.head.get(&*lock);

        while let Some(ready) = cursor {
            if prio < ready.prio.get(&*lock) {
                // Insert before `ready`.
                let prev = ready.link.prev.get(&*lock);
                match prev {
                    Some(prev) => {
                        prev.link.next.replace(&mut *lock, Some(thread));
                    }
                    None => {
                        self.head.replace(&mut *lock, Some(thread));
                    }
                }
                thread.link.prev.replace(&mut *lock, prev);
                thread.link.next.replace(&mut *lock, Some(ready));
                ready.link.prev.replace(&mut *lock, Some(thread));
                return;
            }

            match ready.link.next.get(&*lock) {
                Some(next) => cursor = Some(next),
                None => {
                    // End of the queue.
                    ready.link.next.replace(&mut *lock, Some(thread));
                    thread.link.prev.replace(&mut *lock, Some(ready));
                    thread.link.next.replace(&mut *lock, None);
                    return;
                }
            }
        }

        // Empty queue.
        self.head.replace(&mut *lock, Some(thread));
        thread.link.prev.replace(&mut *lock, None);
        thread.link.next.replace(&mut *lock, None);
    }

    /// Remove and return the highest-priority queued thread.
    pub(crate) fn pop(&self, mut lock: CpuLockTokenRefMut<'_>) -> Option<&'static Thread> {
        let thread = self.head.get(&*lock)?;
        let next = thread.link.next.get(&*lock);

        self.head.replace(&mut *lock, next);
        if let Some(next) = next {
            next.link.prev.replace(&mut *lock, None);
        }
        thread.link.prev.replace(&mut *lock, None);
        thread.link.next.replace(&mut *lock, None);

        Some(thread)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::{boxed::Box, sync::Mutex, sync::MutexGuard, vec::Vec};

    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::klock::CpuLockToken;
    use crate::thread::Priority;

    fn leak_thread(prio: Priority) -> &'static Thread {
        Box::leak(Box::new(super::super::new_for_test("", prio)))
    }

    // The token is a singleton; serialize the tests that mint one
    // outside the port lock.
    static SERIAL: Mutex<()> = Mutex::new(());

    fn token() -> (CpuLockToken, MutexGuard<'static, ()>) {
        let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
        (unsafe { CpuLockToken::new_unchecked() }, guard)
    }

    #[test]
    fn fifo_within_priority_class() {
        let (mut token, _serial) = token();
        let queue = ReadyQueue::new();

        let a = leak_thread(20);
        let b = leak_thread(20);
        let c = leak_thread(20);
        queue.push(token.borrow_mut(), a);
        queue.push(token.borrow_mut(), b);
        queue.push(token.borrow_mut(), c);

        assert!(core::ptr::eq(queue.pop(token.borrow_mut()).unwrap(), a));
        assert!(core::ptr::eq(queue.pop(token.borrow_mut()).unwrap(), b));
        assert!(core::ptr::eq(queue.pop(token.borrow_mut()).unwrap(), c));
        assert!(queue.pop(token.borrow_mut()).is_none());
    }

    #[test]
    fn lower_value_runs_first() {
        let (mut token, _serial) = token();
        let queue = ReadyQueue::new();

        let idle = leak_thread(127);
        let worker = leak_thread(10);
        let monitor = leak_thread(-80);
        queue.push(token.borrow_mut(), idle);
        queue.push(token.borrow_mut(), worker);
        queue.push(token.borrow_mut(), monitor);

        assert!(core::ptr::eq(queue.pop(token.borrow_mut()).unwrap(), monitor));
        assert!(core::ptr::eq(queue.pop(token.borrow_mut()).unwrap(), worker));
        assert!(core::ptr::eq(queue.pop(token.borrow_mut()).unwrap(), idle));
    }

    /// Popping everything yields a stable sort of the pushed threads by
    /// priority: non-decreasing values, insertion order within a class.
    #[quickcheck]
    fn pop_order_is_stable_priority_sort(prios: Vec<i8>) -> bool {
        let (mut token, _serial) = token();
        let queue = ReadyQueue::new();

        let threads: Vec<&'static Thread> = prios.iter().map(|&p| leak_thread(p)).collect();
        for &t in &threads {
            queue.push(token.borrow_mut(), t);
        }

        let mut expected: Vec<usize> = (0..threads.len()).collect();
        expected.sort_by_key(|&i| prios[i]);

        for &i in &expected {
            match queue.pop(token.borrow_mut()) {
                Some(t) if core::ptr::eq(t, threads[i]) => {}
                _ => return false,
            }
        }
        queue.pop(token.borrow_mut()).is_none()
    }
}
