//! Leveled logging for the arbiter and its collaborators.
//!
//! Two sinks are registered at runtime: a raw print sink behind [`kprint!`] /
//! [`kprintln!`] (the console the user sees) and a leveled sink behind
//! [`klog!`] and the `kfatal!` .. `ktrace!` shorthands (the log file). Both
//! are plain function pointers held in atomics so they can be called from
//! interrupt context without taking a lock. Until a sink is registered its
//! output is dropped.

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

// ---------------------------------------------------------------------------
// Levels
// ---------------------------------------------------------------------------

/// Severity of a log record. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// The process is about to terminate.
    Fatal = 0,
    /// Something failed; state was clamped and cleanup continues.
    Error = 1,
    /// Unexpected but harmless.
    Warn = 2,
    /// Lifecycle progress.
    Info = 3,
    /// Diagnostic dumps.
    Debug = 4,
    /// Per-edge register traffic.
    Trace = 5,
}

impl LogLevel {
    /// Fixed-width name for aligned output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN ",
            Self::Info => "INFO ",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Fatal,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            4 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Most verbose level forwarded to the leveled sink.
static MAX_LEVEL: AtomicU8 = AtomicU8::new(if cfg!(debug_assertions) {
    LogLevel::Debug as u8
} else {
    LogLevel::Info as u8
});

/// Sets the most verbose level that reaches the leveled sink.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Returns the current level filter.
pub fn max_level() -> LogLevel {
    LogLevel::from_u8(MAX_LEVEL.load(Ordering::Relaxed))
}

/// Whether a record at `level` would be forwarded.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

// ---------------------------------------------------------------------------
// Raw print sink
// ---------------------------------------------------------------------------

/// Signature of the raw print sink.
pub type PrintFn = fn(fmt::Arguments<'_>);

fn discard_print(_args: fmt::Arguments<'_>) {}

static PRINT_FN: AtomicPtr<()> = AtomicPtr::new(discard_print as *mut ());

/// Registers the raw print sink.
///
/// # Safety
///
/// `f` must be callable from any context, including interrupt handlers.
pub unsafe fn set_print_fn(f: PrintFn) {
    PRINT_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn print_fn() -> PrintFn {
    let ptr = PRINT_FN.load(Ordering::Acquire);
    // SAFETY: Only `PrintFn` pointers (or `discard_print`) are stored.
    unsafe { core::mem::transmute::<*mut (), PrintFn>(ptr) }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    print_fn()(args);
}

/// Writes to the print sink without level or newline.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => { $crate::log::_print(format_args!($($arg)*)) };
}

/// Writes a line to the print sink.
#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => { $crate::kprint!("{}\n", format_args!($($arg)*)) };
}

// ---------------------------------------------------------------------------
// Leveled sink
// ---------------------------------------------------------------------------

/// Signature of the leveled log sink.
pub type LogFn = fn(LogLevel, fmt::Arguments<'_>);

fn discard_log(_level: LogLevel, _args: fmt::Arguments<'_>) {}

static LOG_FN: AtomicPtr<()> = AtomicPtr::new(discard_log as *mut ());

/// Registers the leveled log sink.
///
/// # Safety
///
/// `f` must be callable from any context, including interrupt handlers.
pub unsafe fn set_log_fn(f: LogFn) {
    LOG_FN.store(f as *mut (), Ordering::Release);
}

#[inline]
fn log_fn() -> LogFn {
    let ptr = LOG_FN.load(Ordering::Acquire);
    // SAFETY: Only `LogFn` pointers (or `discard_log`) are stored.
    unsafe { core::mem::transmute::<*mut (), LogFn>(ptr) }
}

#[doc(hidden)]
pub fn _log(level: LogLevel, args: fmt::Arguments<'_>) {
    if enabled(level) {
        log_fn()(level, args);
    }
}

/// Logs at an explicit level.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        $crate::log::_log($level, format_args!($($arg)*))
    };
}

/// Logs at [`LogLevel::Fatal`](crate::log::LogLevel::Fatal).
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs at [`LogLevel::Error`](crate::log::LogLevel::Error).
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs at [`LogLevel::Warn`](crate::log::LogLevel::Warn).
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs at [`LogLevel::Info`](crate::log::LogLevel::Info).
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs at [`LogLevel::Debug`](crate::log::LogLevel::Debug).
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

/// Logs at [`LogLevel::Trace`](crate::log::LogLevel::Trace).
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Trace, $($arg)*) };
}
