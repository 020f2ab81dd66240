//! One-shot tick timers.
//!
//! The minimal timer service the suspension path needs: timers are kept
//! in a deadline-sorted intrusive singly-linked list and serviced by the
//! tick handler. Each TCB embeds one [`Timer`] for its timed
//! suspensions, so arming never allocates and a timer cannot outlive the
//! thread it wakes. Expiry callbacks run in ISR context with the
//! critical section held.
use crate::klock::{CpuLockCell, CpuLockTokenRefMut};
use crate::port;
use crate::sys::Ticks;
use crate::thread::Thread;

/// A one-shot timer firing at an absolute tick.
pub(crate) struct Timer {
    deadline: CpuLockCell<Ticks>,
    next: CpuLockCell<Option<&'static Timer>>,
    armed: CpuLockCell<bool>,
    /// The suspended thread to hand to the expiry callback.
    thread: CpuLockCell<Option<&'static Thread>>,
}

impl Timer {
    pub(crate) const fn new() -> Self {
        Self {
            deadline: CpuLockCell::new(0),
            next: CpuLockCell::new(None),
            armed: CpuLockCell::new(false),
            thread: CpuLockCell::new(None),
        }
    }
}

struct TimerList {
    head: CpuLockCell<Option<&'static Timer>>,
}

static TIMERS: TimerList = TimerList {
    head: CpuLockCell::new(None),
};

/// Arm `timer` to fire `delta` ticks from `now`, waking `thread`.
///
/// The timer must not already be armed.
pub(crate) fn arm(
    mut lock: CpuLockTokenRefMut<'_>,
    timer: &'static Timer,
    now: Ticks,
    delta: Ticks,
    thread: &'static Thread,
) {
    debug_assert!(!timer.armed.get(&*lock));

    let deadline = now.saturating_add(delta);
    timer.deadline.replace(&mut *lock, deadline);
    timer.thread.replace(&mut *lock, Some(thread));
    timer.armed.replace(&mut *lock, true);

    // Insert sorted by deadline, earliest first; ties keep arming order.
    let mut prev: Option<&'static Timer> = None;
    let mut cursor = TIMERS.head.get(&*lock);
    while let Some(t) = cursor {
        if deadline < t.deadline.get(&*lock) {
            break;
        }
        prev = Some(t);
        cursor = t.next.get(&*lock);
    }
    timer.next.replace(&mut *lock, cursor);
    match prev {
        Some(prev) => {
            prev.next.replace(&mut *lock, Some(timer));
        }
        None => {
            TIMERS.head.replace(&mut *lock, Some(timer));
        }
    }
}

/// Disarm `timer` if it is pending. No-op otherwise.
pub(crate) fn cancel(mut lock: CpuLockTokenRefMut<'_>, timer: &'static Timer) {
    if !timer.armed.get(&*lock) {
        return;
    }

    let mut prev: Option<&'static Timer> = None;
    let mut cursor = TIMERS.head.get(&*lock);
    while let Some(t) = cursor {
        if core::ptr::eq(t, timer) {
            let next = t.next.get(&*lock);
            match prev {
                Some(prev) => {
                    prev.next.replace(&mut *lock, next);
                }
                None => {
                    TIMERS.head.replace(&mut *lock, next);
                }
            }
            break;
        }
        prev = Some(t);
        cursor = t.next.get(&*lock);
    }

    timer.armed.replace(&mut *lock, false);
    timer.next.replace(&mut *lock, None);
    timer.thread.replace(&mut *lock, None);
}

/// Fire every timer whose deadline has been reached. Called by the tick
/// handler with the ISR critical section held.
pub(crate) fn tick(mut lock: CpuLockTokenRefMut<'_>, now: Ticks) {
    loop {
        match TIMERS.head.get(&*lock) {
            Some(timer) if timer.deadline.get(&*lock) <= now => {
                let next = timer.next.get(&*lock);
                TIMERS.head.replace(&mut *lock, next);
                timer.armed.replace(&mut *lock, false);
                timer.next.replace(&mut *lock, None);

                if let Some(thread) = timer.thread.replace(&mut *lock, None) {
                    port::suspend_timer_expired(lock.borrow_mut(), thread);
                }
            }
            _ => return,
        }
    }
}
