//! Hosted simulation port.
//!
//! Runs the kernel on a desktop OS for tests and demos. Every kernel
//! thread is backed by one OS thread, of which at most one is ever
//! runnable: the one whose *gate* is open. The interrupt-masked
//! critical section becomes a global scheduler-lock flag with ownership
//! that travels across context switches, and the tick interrupt is a
//! dedicated timer thread.
//!
//! Fidelity note: a wake performed in ISR context opens no gate by
//! itself; the woken thread is dispatched the next time any thread
//! passes through the scheduler, and the idle thread does so on every
//! tick. A compute-bound thread that never enters the kernel is
//! therefore not preempted mid-burst, which matches the kernel's
//! suspension-point scheduling model closely enough for simulation.
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use spin::Mutex as SpinMutex;

use crate::error::Error;
use crate::klock;
use crate::sys;
use crate::thread::Thread;

/// Per-thread port state, embedded at the head of the TCB.
pub(crate) struct ThreadState {
    /// True while this thread owns the CPU.
    gate: Mutex<bool>,
    gate_cond: Condvar,
    /// Identity of the backing OS thread.
    os_id: OnceCell<ThreadId>,
    /// CPU-time accounting. Only touched under the system lock, so a
    /// spin mutex is sufficient; performance is not a concern here.
    cpu: SpinMutex<CpuUsage>,
}

impl ThreadState {
    pub(crate) const fn new() -> Self {
        Self {
            gate: Mutex::new(false),
            gate_cond: Condvar::new(),
            os_id: OnceCell::new(),
            cpu: SpinMutex::new(CpuUsage::new()),
        }
    }
}

struct CpuUsage {
    running_since: Option<Instant>,
    busy: Duration,
    window_start: Option<Instant>,
}

impl CpuUsage {
    const fn new() -> Self {
        Self {
            running_since: None,
            busy: Duration::ZERO,
            window_start: None,
        }
    }

    fn sample(&self, now: Instant) -> f32 {
        let window_start = match self.window_start {
            Some(t) => t,
            None => return 0.0,
        };
        let window = now.saturating_duration_since(window_start);
        if window.is_zero() {
            return 0.0;
        }
        let busy = self.busy
            + self
                .running_since
                .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        (busy.as_secs_f64() / window.as_secs_f64() * 100.0) as f32
    }

    fn reset(&mut self, now: Instant) {
        self.busy = Duration::ZERO;
        self.window_start = Some(now);
        if self.running_since.is_some() {
            self.running_since = Some(now);
        }
    }
}

struct LockState {
    depth: u32,
    owner: Option<ThreadId>,
}

struct PortState {
    lock: Mutex<LockState>,
    lock_cond: Condvar,
    /// Pending-dispatch flag consumed by `idle_wait`.
    idle_wake: Mutex<bool>,
    idle_cond: Condvar,
    /// Interrupt-context CPU-time aggregate.
    irq: SpinMutex<CpuUsage>,
    /// Entry timestamp of the outermost ISR critical section.
    isr_enter: SpinMutex<Option<Instant>>,
    init: OnceCell<()>,
}

static PORT: PortState = PortState {
    lock: Mutex::new(LockState {
        depth: 0,
        owner: None,
    }),
    lock_cond: Condvar::new(),
    idle_wake: Mutex::new(false),
    idle_cond: Condvar::new(),
    irq: SpinMutex::new(CpuUsage::new()),
    isr_enter: SpinMutex::new(None),
    init: OnceCell::new(),
};

/// Enter the critical section from thread context. Nestable by the
/// owning OS thread.
pub(crate) fn lock() {
    let me = std::thread::current().id();
    let mut state = PORT.lock.lock().unwrap();
    loop {
        match state.owner {
            None => {
                state.owner = Some(me);
                state.depth = 1;
                return;
            }
            Some(owner) if owner == me => {
                state.depth += 1;
                return;
            }
            Some(_) => state = PORT.lock_cond.wait(state).unwrap(),
        }
    }
}

pub(crate) fn unlock() {
    let mut state = PORT.lock.lock().unwrap();
    debug_assert_eq!(state.owner, Some(std::thread::current().id()));
    state.depth -= 1;
    if state.depth == 0 {
        state.owner = None;
        drop(state);
        PORT.lock_cond.notify_all();
    }
}

/// Enter the critical section from ISR context. Starts the
/// interrupt-time measurement on the outermost entry.
pub(crate) fn lock_isr() {
    lock();
    let mut enter = PORT.isr_enter.lock();
    if enter.is_none() {
        *enter = Some(Instant::now());
    }
}

/// Leave the ISR critical section. This is the ISR-return edge: it
/// accounts the interrupt time and lets the scheduler run by waking the
/// idle thread's interrupt-wait.
pub(crate) fn unlock_isr() {
    {
        let mut enter = PORT.isr_enter.lock();
        if let Some(t0) = enter.take() {
            let mut irq = PORT.irq.lock();
            if irq.window_start.is_none() {
                irq.window_start = Some(t0);
            }
            irq.busy += t0.elapsed();
        }
    }
    unlock();
    request_dispatch();
}

fn request_dispatch() {
    let mut wake = PORT.idle_wake.lock().unwrap();
    *wake = true;
    drop(wake);
    PORT.idle_cond.notify_all();
}

fn open_gate(thread: &'static Thread) {
    let mut gate = thread.port.gate.lock().unwrap();
    *gate = true;
    drop(gate);
    thread.port.gate_cond.notify_all();
}

fn backing_id(thread: &'static Thread) -> ThreadId {
    // Set by `spawn`/`init_main` before the thread can be scheduled.
    *thread.port.os_id.get().unwrap()
}

/// Switch to `in_`. Must be called with the critical section held (not
/// nested); returns when `out` is scheduled again, still inside the
/// critical section.
pub(crate) unsafe fn swap(in_: &'static Thread, out: &'static Thread) {
    // Close our own gate first so a prompt wake-back is not lost.
    {
        let mut gate = out.port.gate.lock().unwrap();
        *gate = false;
    }

    // Hand the critical section over to `in_`.
    {
        let mut state = PORT.lock.lock().unwrap();
        debug_assert_eq!(state.depth, 1, "context switch under a nested lock");
        state.owner = Some(backing_id(in_));
    }
    open_gate(in_);

    // Park until scheduled again.
    let mut gate = out.port.gate.lock().unwrap();
    while !*gate {
        gate = out.port.gate_cond.wait(gate).unwrap();
    }
}

/// Prime a freshly written TCB: create the backing OS thread, parked
/// until its first swap-in, which enters `entry(arg)` and falls into
/// the kernel's termination routine on return.
pub(crate) fn spawn(thread: &'static Thread, entry: fn(usize), arg: usize) -> Result<(), Error> {
    let handle = std::thread::Builder::new()
        .spawn(move || {
            {
                let mut gate = thread.port.gate.lock().unwrap();
                while !*gate {
                    gate = thread.port.gate_cond.wait(gate).unwrap();
                }
            }
            // The first swap-in arrives with the critical section held;
            // release it before entering the thread body.
            unlock();
            cpu_usage_start(thread);
            entry(arg);
            crate::thread::exit_current();
        })
        .map_err(|_| Error::NoMemory)?;
    thread.port.os_id.set(handle.thread().id()).unwrap();
    Ok(())
}

/// Bind the calling OS thread as the backing thread of the kernel's
/// main thread.
pub(crate) fn init_main(thread: &'static Thread) {
    thread.port.os_id.set(std::thread::current().id()).unwrap();
    *thread.port.gate.lock().unwrap() = true;
    cpu_usage_start(thread);
}

/// Complete a terminating thread's final dispatch. The critical
/// section, held by the caller, is inherited by `in_`; the calling OS
/// thread must not touch kernel state afterwards.
pub(crate) fn exit_dispatch(in_: &'static Thread) {
    {
        let mut state = PORT.lock.lock().unwrap();
        debug_assert_eq!(state.depth, 1, "terminating under a nested lock");
        state.owner = Some(backing_id(in_));
    }
    open_gate(in_);
}

/// Block until the next interrupt, then give the scheduler a pass;
/// the idle thread's body calls this in a loop.
pub(crate) fn idle_wait(thread: &'static Thread) {
    {
        let mut wake = PORT.idle_wake.lock().unwrap();
        while !*wake {
            wake = PORT.idle_cond.wait(wake).unwrap();
        }
        *wake = false;
    }
    crate::thread::idle_yield(thread);
}

pub(crate) fn cpu_usage_start(thread: &'static Thread) {
    let now = Instant::now();
    let mut cpu = thread.port.cpu.lock();
    cpu.running_since = Some(now);
    if cpu.window_start.is_none() {
        cpu.window_start = Some(now);
    }
}

pub(crate) fn cpu_usage_stop(thread: &'static Thread) {
    let now = Instant::now();
    let mut cpu = thread.port.cpu.lock();
    if let Some(since) = cpu.running_since.take() {
        cpu.busy += now.saturating_duration_since(since);
    }
}

/// The thread's CPU usage since the last reset, in percent.
pub(crate) fn cpu_usage_get(thread: &'static Thread) -> f32 {
    thread.port.cpu.lock().sample(Instant::now())
}

pub(crate) fn cpu_usage_reset(thread: &'static Thread) {
    thread.port.cpu.lock().reset(Instant::now());
}

pub(crate) fn interrupt_cpu_usage_get() -> f32 {
    PORT.irq.lock().sample(Instant::now())
}

pub(crate) fn interrupt_cpu_usage_reset() {
    PORT.irq.lock().reset(Instant::now());
}

/// One-shot suspension timer expiry, invoked by the timer service in
/// ISR context with the critical section held.
pub(crate) fn suspend_timer_expired(
    lock: klock::CpuLockTokenRefMut<'_>,
    thread: &'static Thread,
) {
    crate::thread::resume_from_timer(lock, thread);
}

/// Start the tick source. Idempotent.
pub(crate) fn module_init() {
    PORT.init.get_or_init(|| {
        interrupt_cpu_usage_reset();

        let period = Duration::from_nanos(1_000_000_000 / sys::TICK_FREQUENCY_HZ as u64);
        std::thread::Builder::new()
            .name("teal-tick".into())
            .spawn(move || {
                let mut next = Instant::now() + period;
                loop {
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    }
                    next += period;

                    let mut guard = klock::lock_cpu_isr();
                    sys::tick_isr(guard.borrow_mut());
                    // Dropping the guard is the ISR return.
                }
            })
            .expect("failed to start the tick thread");
    });
}

/// Halt the system. This is the default fatal-error hook.
pub(crate) fn stop(error: i32) -> ! {
    log::error!("system stop ({error})");
    std::process::exit(error);
}
