//! The debug-FS command surface: paths, argument shapes, error codes.
use std::sync::Mutex;

use teal_kernel::{fs, sys, thread, Channel, Error, LogMask};

struct Capture(Mutex<String>);

impl Channel for Capture {
    fn write(&self, data: &str) {
        self.0.lock().unwrap().push_str(data);
    }
}

impl Capture {
    fn take(&self) -> String {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

static OUT: Capture = Capture(Mutex::new(String::new()));

fn worker(_arg: usize) {
    thread::set_name("worker");
    loop {
        let _ = thread::suspend(None);
    }
}

#[test]
fn command_surface() {
    let _ = env_logger::try_init();
    sys::start().unwrap();
    sys::set_stdout(&OUT);

    thread::spawn(worker, 0, 10, Box::leak(vec![0u8; 4096].into_boxed_slice())).unwrap();
    // Let the worker (and the built-in threads) name themselves.
    thread::usleep(100_000).unwrap();

    fs::call("/kernel/thrd/list", &["/kernel/thrd/list"], &OUT).unwrap();
    let listing = OUT.take();
    assert!(listing.contains("NAME"), "missing header: {listing}");
    for name in ["main", "idle", "monitor", "worker"] {
        assert!(listing.contains(name), "missing {name}: {listing}");
    }

    // set_log_mask: happy path, unknown thread, malformed mask, arity.
    fs::call(
        "/kernel/thrd/set_log_mask",
        &["set_log_mask", "worker", "0x0f"],
        &OUT,
    )
    .unwrap();
    let worker = thread::find_by_name("worker").unwrap();
    let old = thread::set_log_mask(worker, LogMask::up_to(LogMask::NOTICE));
    assert_eq!(old.bits(), 0x0f);

    assert_eq!(
        fs::call(
            "/kernel/thrd/set_log_mask",
            &["set_log_mask", "nobody", "1"],
            &OUT
        ),
        Err(Error::NotFound)
    );
    assert_eq!(
        fs::call(
            "/kernel/thrd/set_log_mask",
            &["set_log_mask", "worker", "zz"],
            &OUT
        ),
        Err(Error::InvalidArgument)
    );
    let _ = OUT.take();
    assert_eq!(
        fs::call("/kernel/thrd/set_log_mask", &["set_log_mask"], &OUT),
        Err(Error::InvalidArgument)
    );
    assert!(OUT.take().contains("Usage:"));

    // Monitor knobs.
    fs::call(
        "/kernel/thrd/monitor/set_period_ms",
        &["set_period_ms", "100"],
        &OUT,
    )
    .unwrap();
    assert_eq!(
        fs::call(
            "/kernel/thrd/monitor/set_period_ms",
            &["set_period_ms", "-5"],
            &OUT
        ),
        Err(Error::InvalidArgument)
    );
    fs::call("/kernel/thrd/monitor/set_print", &["set_print", "1"], &OUT).unwrap();
    fs::call("/kernel/thrd/monitor/set_print", &["set_print", "0"], &OUT).unwrap();
    assert_eq!(
        fs::call("/kernel/thrd/monitor/set_print", &["set_print", "2"], &OUT),
        Err(Error::InvalidArgument)
    );

    let _ = OUT.take();
    fs::call("/kernel/sys/info", &["/kernel/sys/info"], &OUT).unwrap();
    assert!(OUT.take().contains("teal"));

    assert_eq!(
        fs::call("/kernel/nope", &["/kernel/nope"], &OUT),
        Err(Error::NotFound)
    );
}
