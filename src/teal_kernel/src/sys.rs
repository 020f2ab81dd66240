//! System facade.
//!
//! Process-wide singleton owning the tick counter, the wall-clock
//! accumulator, the standard-output channel and the fatal-error hook,
//! plus the module bring-up order. The tick handler here is the entry
//! point the port's tick source calls on every timer interrupt.
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use crate::error::Error;
use crate::klock::{self, CpuLockCell, CpuLockTokenRefMut};
use crate::port;
use crate::thread;
use crate::timeout;

/// Monotonic tick counter type.
pub type Ticks = u64;

/// System tick frequency.
pub const TICK_FREQUENCY_HZ: u32 = 100;

const TICK_PERIOD: Duration = Duration::from_nanos(1_000_000_000 / TICK_FREQUENCY_HZ as u64);

/// An output byte channel, the hook through which the kernel and the
/// debug shell print. Implementations decide where the bytes go (UART,
/// a capture buffer, a host console).
pub trait Channel: Sync {
    fn write(&self, data: &str);
}

struct Sys {
    tick: CpuLockCell<Ticks>,
    uptime: CpuLockCell<Duration>,
    on_fatal: CpuLockCell<fn(i32) -> !>,
    stdout: CpuLockCell<Option<&'static dyn Channel>>,
    started: AtomicBool,
}

static SYS: Sys = Sys {
    tick: CpuLockCell::new(0),
    uptime: CpuLockCell::new(Duration::ZERO),
    on_fatal: CpuLockCell::new(port::stop),
    stdout: CpuLockCell::new(None),
    started: AtomicBool::new(false),
};

const INFO: &str = concat!(
    "app:     teal\r\n",
    "version: ",
    env!("CARGO_PKG_VERSION"),
    "\r\n",
);

/// Initialize the system module. Only touches the port, whose init is
/// idempotent; [`start`] runs it again as the last bring-up step, and
/// both orders are valid.
pub fn module_init() {
    port::module_init();
}

/// Start the system: turn the caller into the main thread, bring up the
/// built-in threads, and start the port's tick source.
///
/// Module initialization follows the canonical bring-up order; of the
/// modules in that order (settings, std, log, sem, chan, thrd, port)
/// the first five are external collaborators, leaving the thread module
/// and the port to initialize here. Idempotent: a second call is a
/// no-op.
pub fn start() -> Result<(), Error> {
    if SYS.started.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    thread::module_init()?;
    port::module_init();

    log::debug!("kernel started at {} Hz", TICK_FREQUENCY_HZ);
    Ok(())
}

/// Take the system lock. Normally masks interrupts; nestable.
///
/// While held, no kernel operation that takes the lock itself (spawn,
/// suspend, resume, ...) may be called.
pub fn lock() {
    port::lock();
}

/// Release the system lock.
pub fn unlock() {
    port::unlock();
}

/// Take the system lock from ISR context.
pub fn lock_isr() {
    port::lock_isr();
}

/// Release the system lock from ISR context.
pub fn unlock_isr() {
    port::unlock_isr();
}

/// The current value of the system tick counter.
pub fn tick_count() -> Ticks {
    let lock = klock::lock_cpu();
    SYS.tick.get(&*lock)
}

pub(crate) fn tick_count_with(lock: CpuLockTokenRefMut<'_>) -> Ticks {
    SYS.tick.get(&*lock)
}

/// Time since [`start`], advanced tick-wise.
pub fn uptime() -> Duration {
    let lock = klock::lock_cpu();
    SYS.uptime.get(&*lock)
}

/// The tick interrupt handler. The port's tick source calls this at
/// [`TICK_FREQUENCY_HZ`] with the ISR critical section held; expired
/// suspension timers fire from here, and the port reschedules on ISR
/// return if that made a higher-priority thread eligible.
pub(crate) fn tick_isr(mut lock: CpuLockTokenRefMut<'_>) {
    let now = SYS.tick.get(&*lock) + 1;
    SYS.tick.replace(&mut *lock, now);

    let up = SYS.uptime.get(&*lock) + TICK_PERIOD;
    SYS.uptime.replace(&mut *lock, up);

    timeout::tick(lock.borrow_mut(), now);
}

/// Install the hook invoked on fatal errors. The default is the port's
/// halt routine.
pub fn set_on_fatal_callback(callback: fn(i32) -> !) {
    let mut lock = klock::lock_cpu();
    SYS.on_fatal.replace(&mut *lock, callback);
}

/// Route kernel and shell output to `channel`.
pub fn set_stdout(channel: &'static dyn Channel) {
    let mut lock = klock::lock_cpu();
    SYS.stdout.replace(&mut *lock, Some(channel));
}

/// The standard-output channel, if one was installed.
pub fn get_stdout() -> Option<&'static dyn Channel> {
    let lock = klock::lock_cpu();
    SYS.stdout.get(&*lock)
}

/// The build's information blob.
pub fn info() -> &'static str {
    INFO
}

/// Fraction of CPU time spent in interrupt context since the last
/// reset, in percent.
pub fn interrupt_cpu_usage_get() -> f32 {
    port::interrupt_cpu_usage_get()
}

pub fn interrupt_cpu_usage_reset() {
    port::interrupt_cpu_usage_reset();
}

/// Report a non-recoverable error and halt through the fatal hook.
pub(crate) fn fatal(lock: CpuLockTokenRefMut<'_>, error: Error) -> ! {
    log::error!("fatal: {}", error);
    let hook = SYS.on_fatal.get(&*lock);
    hook(error.code())
}

/// Convert a duration to a tick count, rounding up so a non-zero
/// duration never becomes a zero-tick timeout.
pub fn duration_to_ticks(d: Duration) -> Ticks {
    let hz = TICK_FREQUENCY_HZ as u64;
    let us = div_ceil(d.subsec_nanos() as u64, 1_000);
    d.as_secs() * hz + div_ceil(us * hz, 1_000_000)
}

/// Convert a tick count back to a duration.
pub fn ticks_to_duration(ticks: Ticks) -> Duration {
    let hz = TICK_FREQUENCY_HZ as u64;
    let us = (1_000_000 * (ticks % hz)) / hz;
    Duration::new(ticks / hz, (us * 1_000) as u32)
}

const fn div_ceil(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn duration_rounds_up_to_whole_ticks() {
        assert_eq!(duration_to_ticks(Duration::ZERO), 0);
        // Anything below one tick period still waits a full tick.
        assert_eq!(duration_to_ticks(Duration::from_micros(1)), 1);
        assert_eq!(duration_to_ticks(Duration::from_millis(1)), 1);
        assert_eq!(duration_to_ticks(Duration::from_millis(10)), 1);
        assert_eq!(duration_to_ticks(Duration::from_millis(11)), 2);
        assert_eq!(duration_to_ticks(Duration::from_millis(100)), 10);
        assert_eq!(duration_to_ticks(Duration::from_secs(2)), 200);
    }

    #[test]
    fn tick_duration_roundtrip() {
        for ticks in [0, 1, 7, 99, 100, 101, 100_000] {
            assert_eq!(duration_to_ticks(ticks_to_duration(ticks)), ticks);
        }
    }

    #[quickcheck]
    fn conversion_is_monotonic(a: u32, b: u32) -> bool {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        duration_to_ticks(Duration::from_micros(lo as u64))
            <= duration_to_ticks(Duration::from_micros(hi as u64))
    }

    #[quickcheck]
    fn never_undershoots(us: u32) -> bool {
        let tick_us = 1_000_000 / TICK_FREQUENCY_HZ as u64;
        let ticks = duration_to_ticks(Duration::from_micros(us as u64));
        ticks_to_duration(ticks) >= Duration::from_micros(us as u64 - us as u64 % tick_us)
    }
}
