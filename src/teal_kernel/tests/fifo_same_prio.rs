//! Threads sharing a priority run in spawn (FIFO) order.
use std::sync::Mutex;

use teal_kernel::{sys, thread};

static ORDER: Mutex<String> = Mutex::new(String::new());

fn append_x(_arg: usize) {
    ORDER.lock().unwrap().push('X');
}

fn append_y(_arg: usize) {
    ORDER.lock().unwrap().push('Y');
}

fn append_z(_arg: usize) {
    ORDER.lock().unwrap().push('Z');
}

#[test]
fn fifo_within_a_priority_class() {
    let _ = env_logger::try_init();
    sys::start().unwrap();

    let x = thread::spawn(append_x, 0, 20, Box::leak(vec![0u8; 4096].into_boxed_slice())).unwrap();
    let y = thread::spawn(append_y, 0, 20, Box::leak(vec![0u8; 4096].into_boxed_slice())).unwrap();
    let z = thread::spawn(append_z, 0, 20, Box::leak(vec![0u8; 4096].into_boxed_slice())).unwrap();

    thread::wait(x);
    thread::wait(y);
    thread::wait(z);

    assert_eq!(ORDER.lock().unwrap().as_str(), "XYZ");
    assert_eq!(x.state(), thread::State::Terminated);
    assert_eq!(y.state(), thread::State::Terminated);
    assert_eq!(z.state(), thread::State::Terminated);
}
