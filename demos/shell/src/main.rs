//! Hosted demo: boots the kernel, spawns a couple of workers, and lets
//! you poke the debug-FS command surface from stdin.
//!
//! Try:
//!
//! ```text
//! /kernel/thrd/list
//! /kernel/thrd/monitor/set_period_ms 1000
//! /kernel/thrd/monitor/set_print 1
//! /kernel/sys/info
//! ```
use teal_kernel::{fs, sys, thread, Channel};

struct Stdout;

impl Channel for Stdout {
    fn write(&self, data: &str) {
        print!("{data}");
    }
}

static STDOUT: Stdout = Stdout;

fn worker(arg: usize) {
    thread::set_name(if arg == 0 { "worker-0" } else { "worker-1" });
    let mut beats = 0u32;
    loop {
        let _ = thread::usleep(500_000 + arg as u64 * 250_000);
        beats += 1;
        log::info!("worker-{arg}: {beats} beats");
    }
}

fn main() {
    env_logger::init();

    sys::set_stdout(&STDOUT);
    sys::start().expect("kernel start");

    for i in 0..2 {
        let stack = Box::leak(vec![0u8; 4096].into_boxed_slice());
        thread::spawn(worker, i, 20, stack).expect("spawn worker");
    }

    // Stdin is serviced off-kernel, standing in for a UART interrupt
    // feeding the shell; command handlers never block, so driving them
    // from here is fine.
    std::thread::spawn(|| {
        use std::io::BufRead as _;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let args: Vec<&str> = line.split_whitespace().collect();
            let Some(&path) = args.first() else { continue };
            match fs::call(path, &args, &STDOUT) {
                Ok(()) => {}
                Err(e) => println!("{path}: {e}"),
            }
        }
        std::process::exit(0);
    });

    // The main thread keeps the kernel's tree rooted and otherwise
    // stays out of the way.
    loop {
        let _ = thread::usleep(1_000_000);
    }
}
