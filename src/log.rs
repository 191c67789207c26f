//! File logging for build runs.
//!
//! Lines go to `~/.kiln/kiln.log`, truncated at startup. Worker slots log
//! concurrently, so the file handle sits behind one mutex and every line is
//! written whole.
//!
//! Levels, most to least severe:
//! - ERROR: configuration failures that abort a run
//! - WARN: skipped projects and failed tasks
//! - INFO: project transitions and run summaries
//! - DEBUG: graph construction and scheduling decisions
//! - TRACE: per-node readiness bookkeeping
//!
//! `--debug` or `KILN_DEBUG=1` raises the level to DEBUG; `KILN_LOG=<level>`
//! picks any level explicitly and wins over both.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock, PoisonError};

static SINK: OnceLock<Sink> = OnceLock::new();
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

struct Sink {
    file: Mutex<File>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        Self::ALL
            .get(v as usize)
            .copied()
            .unwrap_or(LogLevel::Trace)
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log level: {}", s))
    }
}

/// Level chosen by the environment and the `--debug` flag.
fn requested_level(debug: bool) -> LogLevel {
    if let Some(level) = std::env::var("KILN_LOG").ok().and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = std::env::var("KILN_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Log to `~/.kiln/kiln.log`, at DEBUG when `debug` is set.
///
/// Without a home directory logging stays disabled.
pub fn init_with_debug(debug: bool) {
    set_level(requested_level(debug));
    if let Some(dir) = dirs::home_dir().map(|h| h.join(".kiln")) {
        let _ = std::fs::create_dir_all(&dir);
        let _ = init_at(&dir.join("kiln.log"));
    }
}

/// Log to `path`, truncating it. Only the first successful call takes effect.
pub fn init_at(path: &Path) -> std::io::Result<()> {
    if SINK.get().is_some() {
        return Ok(());
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let _ = SINK.set(Sink {
        file: Mutex::new(file),
    });
    Ok(())
}

pub fn is_debug() -> bool {
    level() >= LogLevel::Debug
}

pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: LogLevel) -> bool {
    level <= self::level()
}

/// Write one line at `level`; dropped when the level is filtered out or
/// logging was never initialized.
pub fn log_at(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }
    let Some(sink) = SINK.get() else {
        return;
    };

    let line = format!(
        "[{}] [{:<5}] [{}] {}\n",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        level,
        std::thread::current().name().unwrap_or("worker"),
        msg
    );
    let mut file = sink.file.lock().unwrap_or_else(PoisonError::into_inner);
    let _ = file.write_all(line.as_bytes());
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog_at {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::log_at($level, &format!($($arg)*))
        }
    };
}

/// Log at INFO.
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => { $crate::__klog_at!($crate::log::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => { $crate::__klog_at!($crate::log::LogLevel::Error, $($arg)*) };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => { $crate::__klog_at!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Log at DEBUG; the message is not formatted unless DEBUG is enabled.
#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => { $crate::__klog_at!($crate::log::LogLevel::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => { $crate::__klog_at!($crate::log::LogLevel::Trace, $($arg)*) };
}
