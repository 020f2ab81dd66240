//! The `teal` kernel core: a preemptive, priority-scheduled RTOS kernel
//! for small micro-controllers: single-digit-MHz cores, kilobytes of
//! RAM, no MMU.
//!
//! # Architecture
//!
//! - [`thread`]: thread control blocks (each living at the base of its
//!   own stack buffer), the ready queue, the scheduler, the
//!   suspension/resume protocol with its lost-wake-up-free Resumed
//!   state, the built-in idle and monitor threads, and stack
//!   fill-pattern/canary bookkeeping.
//! - [`sys`]: the system facade: tick counter, bring-up order,
//!   standard-output channel, fatal-error hook.
//! - [`fs`]: the command handlers exposed to the debug file-system
//!   shell.
//! - [`port`]: the machine-specific capability layer: critical
//!   section, context switch, tick source, CPU-time accounting. One
//!   port is selected at build time; the `port-hosted` feature (on by
//!   default) provides a simulation port for desktop hosts.
//!
//! Scheduling is strictly priority-based with FIFO ordering inside a
//! priority class and no timeslice: a thread runs until it suspends, or
//! until an interrupt wakes a higher-priority thread and the port
//! reschedules on ISR return. Lower priority *values* mean higher
//! priority; the idle thread sits at 127 so the ready queue is never
//! empty.
//!
//! # Example
//!
//! ```rust,no_run
//! use teal_kernel::{sys, thread};
//!
//! fn worker(arg: usize) {
//!     thread::set_name("worker");
//!     loop {
//!         let _ = thread::usleep(100_000);
//!         println!("beat {arg}");
//!     }
//! }
//!
//! fn main() {
//!     sys::start().expect("kernel start");
//!     let stack = Box::leak(vec![0u8; 2048].into_boxed_slice());
//!     thread::spawn(worker, 0, 10, stack).expect("spawn");
//!     let _ = thread::usleep(1_000_000);
//! }
//! ```
#![cfg_attr(not(any(test, feature = "port-hosted")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod fs;
mod klock;
pub mod port;
pub mod sys;
pub mod thread;
mod timeout;

pub use self::error::Error;
pub use self::sys::{Channel, Ticks, TICK_FREQUENCY_HZ};
pub use self::thread::{LogMask, Priority, State, Thread, ThreadInfo};
