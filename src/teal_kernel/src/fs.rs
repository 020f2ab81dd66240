//! Debug file-system command handlers.
//!
//! The debug file system and its shell are external collaborators; this
//! module supplies the kernel-side command handlers they dispatch to,
//! keyed by absolute path. Arguments follow the argv convention:
//! `args[0]` is the command path itself.
use arrayvec::ArrayString;
use core::fmt::Write as _;

use crate::error::Error;
use crate::sys::{self, Channel};
use crate::thread::{self, LogMask};

/// A command handler: argv-style arguments plus an output channel.
pub type CmdFn = fn(args: &[&str], out: &dyn Channel) -> Result<(), Error>;

/// The kernel's command table.
pub static COMMANDS: &[(&str, CmdFn)] = &[
    ("/kernel/thrd/list", cmd_thrd_list),
    ("/kernel/thrd/set_log_mask", cmd_thrd_set_log_mask),
    ("/kernel/thrd/monitor/set_period_ms", cmd_monitor_set_period_ms),
    ("/kernel/thrd/monitor/set_print", cmd_monitor_set_print),
    ("/kernel/sys/info", cmd_sys_info),
];

/// Dispatch on a command path. [`Error::NotFound`] for unknown paths.
pub fn call(path: &str, args: &[&str], out: &dyn Channel) -> Result<(), Error> {
    let (_, handler) = COMMANDS
        .iter()
        .find(|(p, _)| *p == path)
        .ok_or(Error::NotFound)?;
    handler(args, out)
}

fn cmd_thrd_list(_args: &[&str], out: &dyn Channel) -> Result<(), Error> {
    out.write(
        "            NAME           PARENT        STATE  PRIO   CPU  MAX-STACK-USAGE  LOGMASK\r\n",
    );
    thread::walk(|info| {
        let mut line = ArrayString::<128>::new();
        let _ = write!(
            line,
            "{:>16} {:>16} {:>12} {:>5} {:>4.0}%    {:>6}/{:<6}     0x{:02x}\r\n",
            info.name,
            info.parent_name,
            info.state.as_str(),
            info.priority,
            info.cpu_usage,
            info.stack_used,
            info.stack_size,
            info.log_mask.bits(),
        );
        out.write(&line);
    });
    Ok(())
}

fn cmd_thrd_set_log_mask(args: &[&str], out: &dyn Channel) -> Result<(), Error> {
    if args.len() != 3 {
        out.write("Usage: set_log_mask <thread name> <log mask>\r\n");
        return Err(Error::InvalidArgument);
    }

    let thread = thread::find_by_name(args[1]).ok_or(Error::NotFound)?;

    let mask = parse_long(args[2])
        .and_then(|v| u8::try_from(v).ok())
        .and_then(LogMask::from_bits)
        .ok_or(Error::InvalidArgument)?;

    thread::set_log_mask(thread, mask);
    Ok(())
}

fn cmd_monitor_set_period_ms(args: &[&str], out: &dyn Channel) -> Result<(), Error> {
    if args.len() != 2 {
        out.write("Usage: set_period_ms <milliseconds>\r\n");
        return Err(Error::InvalidArgument);
    }

    let ms = match parse_long(args[1]) {
        Some(ms) if ms > 0 => ms as u64,
        _ => return Err(Error::InvalidArgument),
    };

    thread::monitor_set_period_us(ms * 1_000);
    Ok(())
}

fn cmd_monitor_set_print(args: &[&str], out: &dyn Channel) -> Result<(), Error> {
    let print = match args {
        [_, value] => parse_long(value),
        _ => None,
    };
    match print {
        Some(0) => thread::monitor_set_print(false),
        Some(1) => thread::monitor_set_print(true),
        _ => {
            out.write("Usage: set_print <1/0>\r\n");
            return Err(Error::InvalidArgument);
        }
    }
    Ok(())
}

fn cmd_sys_info(_args: &[&str], out: &dyn Channel) -> Result<(), Error> {
    out.write(sys::info());
    Ok(())
}

/// Parse a decimal or `0x`-prefixed integer argument.
fn parse_long(s: &str) -> Option<i64> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_long_accepts_both_bases() {
        assert_eq!(parse_long("42"), Some(42));
        assert_eq!(parse_long("-7"), Some(-7));
        assert_eq!(parse_long("0x3f"), Some(0x3f));
        assert_eq!(parse_long("0XFF"), Some(0xff));
        assert_eq!(parse_long(""), None);
        assert_eq!(parse_long("0x"), None);
        assert_eq!(parse_long("12abc"), None);
    }

    #[test]
    fn command_paths_are_unique() {
        for (i, (path, _)) in COMMANDS.iter().enumerate() {
            assert!(COMMANDS.iter().skip(i + 1).all(|(p, _)| p != path));
        }
    }
}
