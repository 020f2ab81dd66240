//! Priority scheduling: a lower-priority spinner only runs in the gaps
//! a higher-priority thread leaves.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use teal_kernel::{sys, thread};

static WAKEUPS: AtomicU32 = AtomicU32::new(0);
static STOP: AtomicBool = AtomicBool::new(false);

fn spinner(_arg: usize) {
    thread::set_name("spinner");
    while !STOP.load(Ordering::SeqCst) {
        if thread::usleep(1_000).is_ok() {
            WAKEUPS.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[test]
fn priority_preemption() {
    let _ = env_logger::try_init();
    sys::start().unwrap();

    let stack = Box::leak(vec![0u8; 4096].into_boxed_slice());
    thread::spawn(spinner, 0, 10, stack).unwrap();

    // While this (priority 0) thread sleeps 50 ms, the spinner's 1 ms
    // sleeps round up to whole 10 ms ticks, so it wakes only a handful
    // of times before we come back and outrank it again.
    thread::usleep(50_000).unwrap();
    STOP.store(true, Ordering::SeqCst);

    let wakeups = WAKEUPS.load(Ordering::SeqCst);
    assert!(wakeups >= 1, "the spinner never ran while main slept");
    assert!(wakeups <= 50, "the spinner resumed {wakeups} times in 50 ms");
}
