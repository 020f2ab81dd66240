//! A resume that lands before the matching suspend is never lost.
use std::time::{Duration, Instant};

use teal_kernel::{sys, thread};

#[test]
fn resume_before_suspend_does_not_block() {
    let _ = env_logger::try_init();
    sys::start().unwrap();
    let main = thread::current();

    // Thread-context version of the race: the wake code is latched
    // while we are still Current, and the following suspend consumes it
    // instead of blocking.
    thread::resume(main, 7);
    assert_eq!(thread::suspend(None), 7);

    // ISR-context version: an interrupt fires the wake while this
    // thread is busy, before it reaches its reschedule point. The
    // external thread stands in for the ISR, as with a real interrupt
    // controller.
    let started = Instant::now();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        thread::resume_isr(main, 9);
    });
    // Keep "computing" until well after the wake has landed.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(thread::suspend(None), 9);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "suspend blocked despite the earlier resume"
    );

    // Only the most recent wake code is latched.
    thread::resume(main, 1);
    thread::resume(main, 2);
    assert_eq!(thread::suspend(None), 2);
}
