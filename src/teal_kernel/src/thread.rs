//! Threads.
//!
//! A thread's control block (TCB) lives at the base of its own stack
//! buffer, which the spawner supplies and which stays borrowed for the
//! rest of the program. The scheduler only ever holds non-owning
//! `&'static` references to it. All fields that both thread context and
//! ISR context may touch are [`CpuLockCell`]s, so they are unreachable
//! without the critical-section token.
//!
//! Priorities are signed, and a *lower* value means a *higher* priority:
//! negative priorities are reserved by convention for system-internal
//! threads (the monitor runs at −80), user threads sit at 0 and above,
//! and the idle thread at 127 ensures the ready queue is never empty.
use core::cell::UnsafeCell;
use core::mem;
use core::ptr;
#[cfg(feature = "stack-profile")]
use core::slice;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use arrayvec::ArrayVec;

use crate::error::Error;
use crate::klock::{self, CpuLockCell, CpuLockTokenRefMut};
use crate::port;
use crate::sys;
use crate::timeout;

pub(crate) mod readyqueue;

/// Thread priority; lower value = higher priority.
pub type Priority = i8;

/// Priority of the idle thread. Nothing should run below this.
pub const IDLE_PRIO: Priority = 127;

/// Priority of the monitor thread.
pub const MONITOR_PRIO: Priority = -80;

/// Stack buffer sizes for the built-in threads.
pub const IDLE_STACK_SIZE: usize = 1024;
pub const MONITOR_STACK_SIZE: usize = 2048;

/// Bound on the parent/child nesting depth handled by the introspection
/// walk; deeper subtrees are skipped with a warning.
pub const MAX_TREE_DEPTH: usize = 16;

/// Bound on the number of threads captured by one [`walk`] snapshot.
pub const MAX_SNAPSHOT_THREADS: usize = 32;

/// Byte used to paint fresh stacks for the watermark query.
const STACK_FILL_PATTERN: u8 = 0x19;

/// Canary checked before every context switch. A mismatch means the
/// stack grew down into the TCB.
const STACK_LOW_MAGIC: u32 = 0x1337;

bitflags::bitflags! {
    /// Per-thread log mask: one bit per severity level, most severe
    /// first.
    pub struct LogMask: u8 {
        const EMERG = 1 << 0;
        const ALERT = 1 << 1;
        const CRIT = 1 << 2;
        const ERR = 1 << 3;
        const WARNING = 1 << 4;
        const NOTICE = 1 << 5;
        const INFO = 1 << 6;
        const DEBUG = 1 << 7;
    }
}

impl LogMask {
    /// Mask enabling `level` and everything more severe.
    pub const fn up_to(level: LogMask) -> LogMask {
        LogMask::from_bits_truncate((level.bits() << 1).wrapping_sub(1))
    }
}

const DEFAULT_LOG_MASK: LogMask = LogMask::up_to(LogMask::NOTICE);

/// Thread state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The one thread owning the CPU.
    Current,
    /// Eligible; queued on the ready queue.
    Ready,
    /// Descheduled until a resume (or timeout) arrives.
    Suspended,
    /// A resume arrived before the matching suspend completed; the next
    /// suspend consumes this instead of blocking.
    Resumed,
    /// The entry function returned. Never reaped.
    Terminated,
}

impl State {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Ready => "ready",
            Self::Suspended => "suspended",
            Self::Resumed => "resumed",
            Self::Terminated => "terminated",
        }
    }
}

/// The stack region above the TCB. Null base = no profiled region (the
/// main thread, whose stack is the startup stack).
struct StackRegion {
    base: *mut u8,
    size: usize,
}

/// *Thread control block* - the state data of a thread.
pub struct Thread {
    /// The port's saved-context block. Kept first so machine ports can
    /// reach it without offset arithmetic.
    pub(crate) port: port::ThreadState,

    name: CpuLockCell<&'static str>,
    prio: CpuLockCell<Priority>,
    state: CpuLockCell<State>,
    /// The wake code latched by the most recent resume, yielded by the
    /// next suspend.
    err: CpuLockCell<i32>,
    log_mask: CpuLockCell<LogMask>,
    /// Usage sample taken by the monitor thread, in percent.
    cpu_usage: CpuLockCell<f32>,

    parent: Option<&'static Thread>,
    first_child: CpuLockCell<Option<&'static Thread>>,
    next_sibling: CpuLockCell<Option<&'static Thread>>,

    link: readyqueue::Link,
    suspend_timer: timeout::Timer,

    stack_low_magic: u32,
    stack: StackRegion,
}

// Safety: all mutable state is behind `CpuLockCell` or the port's own
// synchronization; the raw stack pointers are only used by the spawning
// path and the watermark scan.
unsafe impl Sync for Thread {}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("Thread").field(&(self as *const _)).finish()
    }
}

impl Thread {
    const fn main() -> Self {
        Self {
            port: port::ThreadState::new(),
            name: CpuLockCell::new("main"),
            prio: CpuLockCell::new(0),
            state: CpuLockCell::new(State::Current),
            err: CpuLockCell::new(0),
            log_mask: CpuLockCell::new(DEFAULT_LOG_MASK),
            cpu_usage: CpuLockCell::new(0.0),
            parent: None,
            first_child: CpuLockCell::new(None),
            next_sibling: CpuLockCell::new(None),
            link: readyqueue::Link::new(),
            suspend_timer: timeout::Timer::new(),
            stack_low_magic: STACK_LOW_MAGIC,
            stack: StackRegion {
                base: ptr::null_mut(),
                size: 0,
            },
        }
    }

    /// The thread's name. `""` until the thread names itself.
    pub fn name(&self) -> &'static str {
        let lock = klock::lock_cpu();
        self.name.get(&*lock)
    }

    pub fn state(&self) -> State {
        let lock = klock::lock_cpu();
        self.state.get(&*lock)
    }

    pub fn priority(&self) -> Priority {
        let lock = klock::lock_cpu();
        self.prio.get(&*lock)
    }

    /// Maximum observed stack usage and total stack size, in bytes.
    ///
    /// The usage is derived from the fill-pattern watermark and is zero
    /// when stack profiling is compiled out or the thread has no
    /// profiled region.
    pub fn stack_stats(&self) -> (usize, usize) {
        #[cfg(feature = "stack-profile")]
        {
            if self.stack.base.is_null() {
                return (0, 0);
            }
            // Safety: the region was carved out of the spawner's buffer
            // and is never resized.
            let region = unsafe { slice::from_raw_parts(self.stack.base, self.stack.size) };
            (stack_used(region), self.stack.size)
        }
        #[cfg(not(feature = "stack-profile"))]
        {
            (0, self.stack.size)
        }
    }
}

/// Everything the introspection walk reports about one thread.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub name: &'static str,
    /// `""` for the root thread.
    pub parent_name: &'static str,
    pub state: State,
    pub priority: Priority,
    /// Percent, as sampled by the monitor.
    pub cpu_usage: f32,
    pub stack_used: usize,
    pub stack_size: usize,
    pub log_mask: LogMask,
}

struct Scheduler {
    current: CpuLockCell<Option<&'static Thread>>,
    ready: readyqueue::ReadyQueue,
}

static SCHEDULER: Scheduler = Scheduler {
    current: CpuLockCell::new(None),
    ready: readyqueue::ReadyQueue::new(),
};

struct Monitor {
    /// Reporting period in microseconds.
    period_us: CpuLockCell<u64>,
    print: CpuLockCell<bool>,
}

static MONITOR: Monitor = Monitor {
    period_us: CpuLockCell::new(2_000_000),
    print: CpuLockCell::new(false),
};

/// The root of the parent/child tree, materialized from the startup
/// stack by [`module_init`].
static MAIN_THREAD: Thread = Thread::main();

/// A statically allocated stack buffer for the built-in threads.
struct StackCell<const N: usize> {
    buf: UnsafeCell<[u8; N]>,
    taken: AtomicBool,
}

// Safety: `take` hands out the buffer exactly once.
unsafe impl<const N: usize> Sync for StackCell<N> {}

impl<const N: usize> StackCell<N> {
    const fn new() -> Self {
        Self {
            buf: UnsafeCell::new([0; N]),
            taken: AtomicBool::new(false),
        }
    }

    fn take(&'static self) -> &'static mut [u8] {
        let taken = self.taken.swap(true, Ordering::Relaxed);
        assert!(!taken, "static stack buffer taken twice");
        // Safety: the flag above guarantees exclusivity.
        unsafe { &mut *self.buf.get() }
    }
}

static IDLE_STACK: StackCell<IDLE_STACK_SIZE> = StackCell::new();
static MONITOR_STACK: StackCell<MONITOR_STACK_SIZE> = StackCell::new();

/// Turn the caller into the kernel's main thread and bring up the
/// built-in threads. Called once by [`sys::start`].
pub(crate) fn module_init() -> Result<(), Error> {
    {
        let mut lock = klock::lock_cpu();
        SCHEDULER
            .current
            .replace(&mut *lock, Some(&MAIN_THREAD));
    }
    port::init_main(&MAIN_THREAD);

    spawn(idle_main, 0, IDLE_PRIO, IDLE_STACK.take())?;
    spawn(monitor_main, 0, MONITOR_PRIO, MONITOR_STACK.take())?;

    Ok(())
}

/// Spawn a thread.
///
/// The TCB is placed at the base of `stack`; the rest of the buffer is
/// the thread's stack proper, painted with the fill pattern unless
/// stack profiling is compiled out. The spawned thread becomes a child
/// of the calling thread and starts in the Ready state; the caller does
/// not yield, so even a higher-priority spawn first runs when the
/// scheduler next gets a pass.
///
/// Fails with [`Error::InvalidArgument`] if the buffer cannot hold the
/// TCB, and with [`Error::BadContext`] before [`sys::start`].
pub fn spawn(
    entry: fn(usize),
    arg: usize,
    prio: Priority,
    stack: &'static mut [u8],
) -> Result<&'static Thread, Error> {
    let parent = try_current().ok_or(Error::BadContext)?;

    let base = stack.as_mut_ptr();
    let len = stack.len();
    let offset = base.align_offset(mem::align_of::<Thread>());
    let tcb_size = mem::size_of::<Thread>();
    if offset.checked_add(tcb_size).map_or(true, |n| n > len) {
        return Err(Error::InvalidArgument);
    }

    let tcb_ptr = unsafe { base.add(offset) }.cast::<Thread>();
    let region_base = unsafe { base.add(offset + tcb_size) };
    let region_size = len - offset - tcb_size;

    let thread = Thread {
        port: port::ThreadState::new(),
        name: CpuLockCell::new(""),
        prio: CpuLockCell::new(prio),
        state: CpuLockCell::new(State::Ready),
        err: CpuLockCell::new(0),
        log_mask: CpuLockCell::new(DEFAULT_LOG_MASK),
        cpu_usage: CpuLockCell::new(0.0),
        parent: Some(parent),
        first_child: CpuLockCell::new(None),
        next_sibling: CpuLockCell::new(None),
        link: readyqueue::Link::new(),
        suspend_timer: timeout::Timer::new(),
        stack_low_magic: STACK_LOW_MAGIC,
        stack: StackRegion {
            base: region_base,
            size: region_size,
        },
    };
    // Safety: the buffer is exclusively borrowed for 'static and large
    // enough; the write target is suitably aligned.
    unsafe { ptr::write(tcb_ptr, thread) };
    let thread: &'static Thread = unsafe { &*tcb_ptr };

    #[cfg(feature = "stack-profile")]
    {
        // Safety: the region is the remainder of the same buffer.
        let region = unsafe { slice::from_raw_parts_mut(region_base, region_size) };
        region.fill(STACK_FILL_PATTERN);
    }

    port::spawn(thread, entry, arg)?;

    {
        let mut lock = klock::lock_cpu();
        let mut token = lock.borrow_mut();
        attach_child(token.borrow_mut(), parent, thread);
        SCHEDULER.ready.push(token.borrow_mut(), thread);
    }
    log::trace!("spawned {:p} at priority {}", thread, prio);

    Ok(thread)
}

/// Append `child` to `parent`'s children list, preserving spawn order.
fn attach_child(
    mut lock: CpuLockTokenRefMut<'_>,
    parent: &'static Thread,
    child: &'static Thread,
) {
    match parent.first_child.get(&*lock) {
        None => {
            parent.first_child.replace(&mut *lock, Some(child));
        }
        Some(mut last) => {
            while let Some(next) = last.next_sibling.get(&*lock) {
                last = next;
            }
            last.next_sibling.replace(&mut *lock, Some(child));
        }
    }
}

/// The calling thread.
///
/// # Panics
///
/// Panics if the kernel has not been started.
pub fn current() -> &'static Thread {
    try_current().expect("kernel not started")
}

pub(crate) fn try_current() -> Option<&'static Thread> {
    let lock = klock::lock_cpu();
    SCHEDULER.current.get(&*lock)
}

/// Name the calling thread. The name is expected to be unique; it is
/// the key used by the shell's thread lookup.
pub fn set_name(name: &'static str) {
    let mut lock = klock::lock_cpu();
    // Invariant: exactly one thread is Current once the kernel runs.
    let cur = SCHEDULER.current.get(&*lock).unwrap();
    cur.name.replace(&mut *lock, name);
}

/// Replace `thread`'s log mask, returning the previous one.
pub fn set_log_mask(thread: &'static Thread, mask: LogMask) -> LogMask {
    let mut lock = klock::lock_cpu();
    thread.log_mask.replace(&mut *lock, mask)
}

/// The calling thread's log mask.
pub fn get_log_mask() -> LogMask {
    let lock = klock::lock_cpu();
    let cur = SCHEDULER.current.get(&*lock).unwrap();
    cur.log_mask.get(&*lock)
}

/// Deschedule the calling thread until a resume arrives, yielding the
/// wake code the resume supplied.
///
/// With a timeout, a one-shot timer is armed and its expiry resumes the
/// thread with [`Error::TimedOut`]; a zero timeout is a non-blocking
/// poll that returns `TimedOut` immediately. If a resume raced ahead of
/// this call (the thread is in the Resumed state), the suspension is
/// cancelled and the latched wake code is returned at once, so a
/// wake-up is never lost. Only the most recent wake code is latched.
pub fn suspend(timeout: Option<Duration>) -> i32 {
    let mut lock = klock::lock_cpu();
    suspend_with(lock.borrow_mut(), timeout)
}

fn suspend_with(mut lock: CpuLockTokenRefMut<'_>, timeout: Option<Duration>) -> i32 {
    // Invariant: exactly one thread is Current once the kernel runs.
    let thread = SCHEDULER.current.get(&*lock).unwrap();

    if thread.state.get(&*lock) == State::Resumed {
        // The resume won the race; consume it instead of blocking.
        thread.state.replace(&mut *lock, State::Ready);
        SCHEDULER.ready.push(lock.borrow_mut(), thread);
    } else {
        if let Some(timeout) = timeout {
            if timeout.is_zero() {
                return Error::TimedOut.code();
            }
            thread.state.replace(&mut *lock, State::Suspended);
            let now = sys::tick_count_with(lock.borrow_mut());
            let delta = sys::duration_to_ticks(timeout);
            timeout::arm(
                lock.borrow_mut(),
                &thread.suspend_timer,
                now,
                delta,
                thread,
            );
        } else {
            thread.state.replace(&mut *lock, State::Suspended);
        }
    }

    reschedule(lock.borrow_mut());

    thread.err.get(&*lock)
}

/// Resume `thread` with the given wake code. Thread-context variant;
/// never blocks and never yields; the woken thread is dispatched at
/// the next reschedule point (an ISR return, or the caller's own next
/// suspension).
pub fn resume(thread: &'static Thread, code: i32) {
    let mut lock = klock::lock_cpu();
    resume_with(lock.borrow_mut(), thread, code);
}

/// Resume `thread` from ISR context (or any context outside the
/// kernel's threads). The wake is dispatched on the next pass through
/// the scheduler.
pub fn resume_isr(thread: &'static Thread, code: i32) {
    let mut lock = klock::lock_cpu_isr();
    resume_with(lock.borrow_mut(), thread, code);
}

fn resume_with(mut lock: CpuLockTokenRefMut<'_>, thread: &'static Thread, code: i32) {
    thread.err.replace(&mut *lock, code);

    match thread.state.get(&*lock) {
        State::Suspended => {
            timeout::cancel(lock.borrow_mut(), &thread.suspend_timer);
            thread.state.replace(&mut *lock, State::Ready);
            SCHEDULER.ready.push(lock.borrow_mut(), thread);
        }
        State::Current => {
            thread.state.replace(&mut *lock, State::Resumed);
        }
        // An already-eligible or already-resumed thread only has the
        // wake code latched; a terminated thread ignores the wake.
        State::Ready | State::Resumed | State::Terminated => {}
    }
}

/// Timer-expiry half of a timed suspension; runs in ISR context.
pub(crate) fn resume_from_timer(lock: CpuLockTokenRefMut<'_>, thread: &'static Thread) {
    resume_with(lock, thread, Error::TimedOut.code());
}

/// Sleep for the given number of microseconds (rounded up to whole
/// ticks). An early wake returns the wake code as the error.
pub fn usleep(microseconds: u64) -> Result<(), i32> {
    let code = suspend(Some(Duration::from_micros(microseconds)));
    if code == Error::TimedOut.code() {
        Ok(())
    } else {
        Err(code)
    }
}

/// Block until `thread` terminates.
///
/// Deliberately a 50 ms poll rather than an event-driven wake-up: the
/// parent stays off every wait queue and termination needs no extra
/// kernel state.
pub fn wait(thread: &'static Thread) {
    loop {
        {
            let lock = klock::lock_cpu();
            if thread.state.get(&*lock) == State::Terminated {
                return;
            }
        }
        let _ = usleep(50_000);
    }
}

/// Let the most important ready thread run.
///
/// The caller holds the critical section and, if it intends to yield,
/// has already moved itself out of the Current state (and onto the
/// ready queue if it stays eligible).
fn reschedule(mut lock: CpuLockTokenRefMut<'_>) {
    // Invariant: exactly one thread is Current between reschedules.
    let out = SCHEDULER.current.get(&*lock).unwrap();

    #[cfg(feature = "assert")]
    if out.stack_low_magic != STACK_LOW_MAGIC {
        sys::fatal(lock.borrow_mut(), Error::StackOverflow);
    }

    // The idle thread is always eligible, so the queue cannot be empty
    // here.
    let in_ = SCHEDULER.ready.pop(lock.borrow_mut()).unwrap();
    in_.state.replace(&mut *lock, State::Current);

    if !ptr::eq(in_, out) {
        log::trace!("dispatch {:p} -> {:p}", out, in_);
        SCHEDULER.current.replace(&mut *lock, Some(in_));
        port::cpu_usage_stop(out);
        // Safety: the critical section is held and `in_`'s context was
        // primed by the port. On resumption this call returns in
        // `out`'s context.
        unsafe { port::swap(in_, out) };
        port::cpu_usage_start(out);
    }
}

/// Termination path: the entry function returned (the port's thread
/// trampoline lands here). Never reaps the TCB: terminated threads
/// stay in their parent's children list.
pub(crate) fn exit_current() {
    let mut lock = klock::lock_cpu();
    let in_;
    {
        let mut token = lock.borrow_mut();
        // Invariant: the exiting thread is Current.
        let out = SCHEDULER.current.get(&*token).unwrap();
        log::trace!("thread {:p} terminated", out);

        #[cfg(feature = "assert")]
        if out.stack_low_magic != STACK_LOW_MAGIC {
            sys::fatal(token.borrow_mut(), Error::StackOverflow);
        }

        out.state.replace(&mut *token, State::Terminated);

        in_ = SCHEDULER.ready.pop(token.borrow_mut()).unwrap();
        in_.state.replace(&mut *token, State::Current);
        SCHEDULER.current.replace(&mut *token, Some(in_));
        port::cpu_usage_stop(out);
    }
    // The critical section is inherited by `in_`, which resumes inside
    // its own swap still holding it.
    mem::forget(lock);
    port::exit_dispatch(in_);
}

/// Re-enter the scheduler from the idle thread after an interrupt-wait.
pub(crate) fn idle_yield(thread: &'static Thread) {
    let mut lock = klock::lock_cpu();
    let mut token = lock.borrow_mut();
    thread.state.replace(&mut *token, State::Ready);
    SCHEDULER.ready.push(token.borrow_mut(), thread);
    reschedule(token.borrow_mut());
}

fn idle_main(_arg: usize) {
    set_name("idle");
    let thread = current();
    loop {
        port::idle_wait(thread);
    }
}

fn monitor_main(_arg: usize) {
    set_name("monitor");
    loop {
        let period_us = {
            let lock = klock::lock_cpu();
            MONITOR.period_us.get(&*lock)
        };
        let _ = usleep(period_us);

        let print = {
            let lock = klock::lock_cpu();
            MONITOR.print.get(&*lock)
        };

        if print {
            let irq_usage = sys::interrupt_cpu_usage_get();
            sys::interrupt_cpu_usage_reset();
            if let Some(out) = sys::get_stdout() {
                let mut line = arrayvec::ArrayString::<96>::new();
                let _ = core::fmt::Write::write_fmt(
                    &mut line,
                    format_args!(
                        "\r\n                NAME         CPU\r\n                 irq {:>10.1}%\r\n",
                        irq_usage
                    ),
                );
                out.write(&line);
            }
        }

        update_cpu_usage();

        if print {
            if let Some(out) = sys::get_stdout() {
                walk(|info| {
                    let mut line = arrayvec::ArrayString::<96>::new();
                    let _ = core::fmt::Write::write_fmt(
                        &mut line,
                        format_args!("{:>20} {:>10.1}%\r\n", info.name, info.cpu_usage),
                    );
                    out.write(&line);
                });
            }
        }
    }
}

/// Refresh every thread's CPU-usage sample from the port and reset the
/// port's accumulators for the next window.
fn update_cpu_usage() {
    let mut lock = klock::lock_cpu();
    for_each_thread(
        lock.borrow_mut(),
        |mut token: CpuLockTokenRefMut<'_>, thread: &'static Thread| {
            let usage = port::cpu_usage_get(thread);
            port::cpu_usage_reset(thread);
            thread.cpu_usage.replace(&mut *token, usage);
        },
    );
}

/// Pre-order walk over the thread tree, from the main thread.
///
/// The snapshot is taken under the critical section with a bounded,
/// pre-allocated work-list (no recursion); the callback then runs
/// outside it, so it may call back into the kernel.
pub fn walk(mut f: impl FnMut(&ThreadInfo)) {
    let mut snapshot = ArrayVec::<ThreadInfo, MAX_SNAPSHOT_THREADS>::new();
    {
        let mut lock = klock::lock_cpu();
        for_each_thread(
            lock.borrow_mut(),
            |token: CpuLockTokenRefMut<'_>, thread: &'static Thread| {
                if snapshot.try_push(info_of(token, thread)).is_err() {
                    log::warn!("more than {} threads; list truncated", MAX_SNAPSHOT_THREADS);
                }
            },
        );
    }
    for info in &snapshot {
        f(info);
    }
}

/// Look a thread up by its name, pre-order first match.
pub fn find_by_name(name: &str) -> Option<&'static Thread> {
    let mut lock = klock::lock_cpu();
    let mut found = None;
    for_each_thread(
        lock.borrow_mut(),
        |token: CpuLockTokenRefMut<'_>, thread: &'static Thread| {
            if found.is_none() && thread.name.get(&*token) == name {
                found = Some(thread);
            }
        },
    );
    found
}

fn info_of(lock: CpuLockTokenRefMut<'_>, thread: &'static Thread) -> ThreadInfo {
    let (stack_used, stack_size) = thread.stack_stats();
    ThreadInfo {
        name: thread.name.get(&*lock),
        parent_name: thread.parent.map_or("", |p| p.name.get(&*lock)),
        state: thread.state.get(&*lock),
        priority: thread.prio.get(&*lock),
        cpu_usage: thread.cpu_usage.get(&*lock),
        stack_used,
        stack_size,
        log_mask: thread.log_mask.get(&*lock),
    }
}

/// Iterative pre-order traversal using a bounded work-list; subtrees
/// nested deeper than [`MAX_TREE_DEPTH`] are skipped.
fn for_each_thread(
    mut lock: CpuLockTokenRefMut<'_>,
    mut f: impl FnMut(CpuLockTokenRefMut<'_>, &'static Thread),
) {
    let mut stack = ArrayVec::<&'static Thread, MAX_TREE_DEPTH>::new();

    f(lock.borrow_mut(), &MAIN_THREAD);
    let mut cursor = MAIN_THREAD.first_child.get(&*lock);

    loop {
        match cursor {
            Some(thread) => {
                f(lock.borrow_mut(), thread);
                if stack.try_push(thread).is_ok() {
                    cursor = thread.first_child.get(&*lock);
                } else {
                    log::warn!(
                        "thread tree deeper than {}; skipping a subtree",
                        MAX_TREE_DEPTH
                    );
                    cursor = thread.next_sibling.get(&*lock);
                }
            }
            None => match stack.pop() {
                Some(thread) => cursor = thread.next_sibling.get(&*lock),
                None => break,
            },
        }
    }
}

#[cfg(feature = "stack-profile")]
fn stack_used(region: &[u8]) -> usize {
    // The stack grows towards lower addresses; scan from the bottom for
    // the first byte the thread has touched.
    let untouched = region
        .iter()
        .take_while(|&&b| b == STACK_FILL_PATTERN)
        .count();
    region.len() - untouched
}

pub(crate) fn monitor_set_period_us(period_us: u64) {
    let mut lock = klock::lock_cpu();
    MONITOR.period_us.replace(&mut *lock, period_us);
}

pub(crate) fn monitor_set_print(print: bool) {
    let mut lock = klock::lock_cpu();
    MONITOR.print.replace(&mut *lock, print);
}

#[cfg(test)]
pub(crate) fn new_for_test(name: &'static str, prio: Priority) -> Thread {
    Thread {
        port: port::ThreadState::new(),
        name: CpuLockCell::new(name),
        prio: CpuLockCell::new(prio),
        state: CpuLockCell::new(State::Ready),
        err: CpuLockCell::new(0),
        log_mask: CpuLockCell::new(DEFAULT_LOG_MASK),
        cpu_usage: CpuLockCell::new(0.0),
        parent: None,
        first_child: CpuLockCell::new(None),
        next_sibling: CpuLockCell::new(None),
        link: readyqueue::Link::new(),
        suspend_timer: timeout::Timer::new(),
        stack_low_magic: STACK_LOW_MAGIC,
        stack: StackRegion {
            base: ptr::null_mut(),
            size: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_mask_up_to() {
        assert_eq!(LogMask::up_to(LogMask::EMERG), LogMask::EMERG);
        assert_eq!(LogMask::up_to(LogMask::NOTICE).bits(), 0x3f);
        assert_eq!(LogMask::up_to(LogMask::DEBUG).bits(), 0xff);
        assert!(DEFAULT_LOG_MASK.contains(LogMask::ERR));
        assert!(!DEFAULT_LOG_MASK.contains(LogMask::DEBUG));
    }

    #[cfg(feature = "stack-profile")]
    #[test]
    fn watermark_scan() {
        let mut region = [STACK_FILL_PATTERN; 512];
        assert_eq!(stack_used(&region), 0);

        // Dirty the top 300 bytes, the way a downward-growing stack
        // would.
        for b in &mut region[212..] {
            *b = 0xaa;
        }
        assert_eq!(stack_used(&region), 300);

        // A single touched byte at the very bottom counts as full use.
        region[0] = 0;
        assert_eq!(stack_used(&region), 512);
    }

    #[test]
    fn state_names() {
        assert_eq!(State::Current.as_str(), "current");
        assert_eq!(State::Terminated.as_str(), "terminated");
    }
}
