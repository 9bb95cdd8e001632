//! Leveled logging to stderr. Every line starts with the local time,
//! the level and the source location, tab separated.

use std::{
    io::{StderrLock, Write, stderr},
    sync::atomic::{AtomicU8, Ordering},
};

use anyhow::{Result, bail};
use chrono::{Local, SecondsFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Nothing at all, not even the notices about failed fetches
    Quiet = 0,
    /// The default, only `warn!` statements output anything
    Warn = 1,
    /// What is being loaded and how it was clustered
    Info = 2,
    /// Per-iteration and per-slot details
    Debug = 3,
}

impl LogLevel {
    fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(LogLevel::Quiet),
            1 => Some(LogLevel::Warn),
            2 => Some(LogLevel::Info),
            3 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Quiet => "",
            LogLevel::Warn => "W",
            LogLevel::Info => "I",
            LogLevel::Debug => "D",
        }
    }
}

static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);

pub fn set_log_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn log_level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed)).unwrap_or(LogLevel::Warn)
}

#[inline]
pub fn enabled(level: LogLevel) -> bool {
    log_level() >= level
}

/// Locks stderr and writes the line prefix; the caller finishes the
/// line.
pub fn start_line(level: LogLevel, file: &str, line: u32) -> StderrLock<'static> {
    let t = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
    let mut lock = stderr().lock();
    // Nothing sensible to do if stderr is gone
    let _ = write!(&mut lock, "{t}\t{}\t{file}:{line}\t", level.label());
    lock
}

#[doc(hidden)]
#[macro_export]
macro_rules! log_at {
    { $level:expr, $($arg:tt)* } => {
        if $crate::utillib::logging::enabled($level) {
            use std::io::Write;
            let mut lock = $crate::utillib::logging::start_line($level, file!(), line!());
            let _ = writeln!(&mut lock, $($arg)*);
        }
    }
}

#[macro_export]
macro_rules! warn {
    { $($arg:tt)* } => {
        $crate::log_at!($crate::utillib::logging::LogLevel::Warn, $($arg)*)
    }
}

#[macro_export]
macro_rules! info {
    { $($arg:tt)* } => {
        $crate::log_at!($crate::utillib::logging::LogLevel::Info, $($arg)*)
    }
}

#[macro_export]
macro_rules! debug {
    { $($arg:tt)* } => {
        $crate::log_at!($crate::utillib::logging::LogLevel::Debug, $($arg)*)
    }
}

/// The log level options of the command line. The fields stay private,
/// use `LogLevel::try_from`.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct LogLevelOpt {
    /// Show what is being loaded and how it was clustered
    #[clap(short, long)]
    verbose: bool,

    /// Show per-iteration details, e.g. why a bar is missing (implies
    /// `--verbose`)
    #[clap(long)]
    debug: bool,

    /// Disable warnings, including the notice about failed sample
    /// fetches. Conflicts with `--verbose` and `--debug`.
    #[clap(short, long)]
    quiet: bool,
}

impl TryFrom<LogLevelOpt> for LogLevel {
    type Error = anyhow::Error;

    fn try_from(opt: LogLevelOpt) -> Result<Self> {
        let LogLevelOpt {
            verbose,
            debug,
            quiet,
        } = opt;
        if quiet {
            if verbose || debug {
                bail!("option `--quiet` conflicts with the options `--verbose` and `--debug`")
            }
            return Ok(LogLevel::Quiet);
        }
        Ok(if debug {
            LogLevel::Debug
        } else if verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        })
    }
}
