//! Stack bookkeeping: the TCB consumes the base of the buffer, and the
//! watermark stays within the region above it.
use teal_kernel::{sys, thread, Error};

fn sleeper(_arg: usize) {
    thread::set_name("sleeper");
    loop {
        let _ = thread::suspend(None);
    }
}

#[test]
fn watermark_is_bounded() {
    let _ = env_logger::try_init();
    sys::start().unwrap();

    let t = thread::spawn(sleeper, 0, 30, Box::leak(vec![0u8; 2048].into_boxed_slice())).unwrap();
    let (used, size) = t.stack_stats();

    // The region is the buffer minus the TCB (and alignment).
    assert!(size > 0 && size < 2048, "region size {size}");
    assert!(used <= size);
    // The simulation executes on a host stack, so the fill pattern in
    // the buffer stays intact.
    assert_eq!(used, 0);

    // A buffer too small for the TCB is rejected outright.
    let tiny = Box::leak(vec![0u8; 16].into_boxed_slice());
    assert!(matches!(
        thread::spawn(sleeper, 0, 30, tiny),
        Err(Error::InvalidArgument)
    ));
}
