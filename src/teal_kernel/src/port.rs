//! The machine-specific layer.
//!
//! The kernel consumes a fixed capability set from exactly one port,
//! selected at build time by cargo feature; there is no dynamic
//! dispatch and no port registry. A port provides:
//!
//!  - **Critical section**: `lock`/`unlock` (thread context) and
//!    `lock_isr`/`unlock_isr` (ISR context). Nestable. While held, no
//!    preemption and no ISR-initiated reschedule may occur; on
//!    single-core machines this is interrupt masking. `unlock_isr` is
//!    the ISR-return edge: it is where a reschedule happens if the ISR
//!    made a higher-priority thread eligible.
//!  - **Context switch**: `swap(in, out)` saves the callee-saved state
//!    of `out` and restores `in`. Must be called with the critical
//!    section held; returns when `out` is scheduled again, still inside
//!    the critical section. `exit_dispatch(in)` is the one-way variant
//!    used when `out` is terminating.
//!  - **Spawn priming**: `spawn` prepares a fresh TCB so that its
//!    first swap-in enters the entry function with its argument and, on
//!    return, falls into the kernel's termination routine.
//!  - **Idle wait**: `idle_wait` blocks the CPU until the next
//!    interrupt (a WFI-class instruction on real machines) and then
//!    re-enters the scheduler.
//!  - **Tick source**: a fixed-frequency interrupt invoking
//!    [`sys::tick_isr`](crate::sys) under the ISR critical section.
//!  - **CPU-time accounting**: per-thread start/stop/get/reset
//!    sampling plus the symmetric interrupt-context aggregate.
//!  - **Suspend-timer callback**: `suspend_timer_expired`, invoked by
//!    the timer service when a timed suspension expires.
//!  - **Halt**: `stop`, the default fatal-error hook.
//!
//! The kernel assumes stacks grow towards lower addresses; the TCB (and
//! its canary) sits at the lowest addresses of the stack buffer.

#[cfg(feature = "port-hosted")]
#[path = "port/hosted.rs"]
mod imp;

#[cfg(not(feature = "port-hosted"))]
compile_error!("no port selected for this target; enable the `port-hosted` feature");

pub(crate) use imp::{
    cpu_usage_get, cpu_usage_reset, cpu_usage_start, cpu_usage_stop, exit_dispatch, idle_wait,
    init_main, interrupt_cpu_usage_get, interrupt_cpu_usage_reset, lock, lock_isr, module_init,
    spawn, stop, suspend_timer_expired, swap, unlock, unlock_isr, ThreadState,
};
