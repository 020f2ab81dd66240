//! A sleeping thread advances with the system tick.
use teal_kernel::{sys, thread};

#[test]
fn usleep_advances_the_tick() {
    let _ = env_logger::try_init();
    sys::start().unwrap();

    let before = sys::tick_count();
    thread::usleep(100_000).unwrap();
    let after = sys::tick_count();

    // 100 ms is 10 ticks at 100 Hz; the timer never fires early.
    assert!(
        after >= before + 10,
        "tick counter only advanced from {before} to {after}"
    );
    assert!(sys::uptime() >= sys::ticks_to_duration(after - before));
}
