//! Timed suspension: whichever of the resume and the timer arrives
//! first decides the wake code, and the loser is fully cancelled.
use std::time::{Duration, Instant};

use teal_kernel::{sys, thread, Error};

#[test]
fn resume_beats_timeout() {
    let _ = env_logger::try_init();
    sys::start().unwrap();
    let main = thread::current();

    // Resume at ~30 ms against a 200 ms timeout: the caller's code
    // wins.
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        thread::resume_isr(main, 3);
    });
    let started = Instant::now();
    assert_eq!(thread::suspend(Some(Duration::from_millis(200))), 3);
    assert!(started.elapsed() < Duration::from_millis(190));

    // The 200 ms timer was cancelled by the early resume: an untimed
    // suspend sleeps straight through the 200 ms mark and only wakes on
    // the next explicit resume.
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(400));
        thread::resume_isr(main, 5);
    });
    let started = Instant::now();
    assert_eq!(thread::suspend(None), 5);
    assert!(started.elapsed() >= Duration::from_millis(300));

    // The reverse arm: no resume, the timer fires.
    let started = Instant::now();
    assert_eq!(
        thread::suspend(Some(Duration::from_millis(50))),
        Error::TimedOut.code()
    );
    assert!(started.elapsed() >= Duration::from_millis(40));

    // A zero timeout is a non-blocking poll.
    let started = Instant::now();
    assert_eq!(
        thread::suspend(Some(Duration::ZERO)),
        Error::TimedOut.code()
    );
    assert!(started.elapsed() < Duration::from_millis(20));
}
