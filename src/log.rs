//! File logging for pipeline runs.
//!
//! Lines go to `~/.scout/scout.log` as `[HH:MM:SS.mmm] [LEVEL] message`.
//! Research nodes log concurrently, so the file handle sits behind a mutex
//! and each line is written whole.
//!
//! The level comes from `--debug`, then `SCOUT_LOG=<level>`, then
//! `SCOUT_DEBUG=1`, and defaults to INFO.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};

static SINK: OnceLock<Mutex<File>> = OnceLock::new();
static LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// A node or the whole run could not complete.
    Error = 0,
    /// Search outages, schema re-prompts, skipped nodes.
    Warn = 1,
    Info = 2,
    /// Prompts, context sizes, model accounting.
    Debug = 3,
    /// Raw model replies and search payloads.
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
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

/// Pick the level from the CLI flag and the two environment variables.
fn resolve_level(debug_flag: bool, scout_log: Option<&str>, scout_debug: Option<&str>) -> LogLevel {
    if debug_flag {
        return LogLevel::Debug;
    }
    if let Some(level) = scout_log.and_then(|v| v.parse().ok()) {
        return level;
    }
    match scout_debug {
        Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => LogLevel::Debug,
        _ => LogLevel::Info,
    }
}

/// Log to `~/.scout/scout.log`. Does nothing without a home directory.
pub fn init_with_debug(debug: bool) {
    if let Some(dir) = dirs::home_dir().map(|h| h.join(".scout")) {
        let _ = std::fs::create_dir_all(&dir);
        init_at(&dir.join("scout.log"), debug);
    }
}

/// Log to an explicit file, truncating it. Only the first call opens a
/// file; later calls just reset the level.
pub fn init_at(path: &Path, debug: bool) {
    let scout_log = std::env::var("SCOUT_LOG").ok();
    let scout_debug = std::env::var("SCOUT_DEBUG").ok();
    set_level(resolve_level(debug, scout_log.as_deref(), scout_debug.as_deref()));

    if SINK.get().is_none() {
        if let Ok(file) = File::create(path) {
            let _ = SINK.set(Mutex::new(file));
        }
    }
}

pub fn set_level(level: LogLevel) {
    LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= LEVEL.load(Ordering::Relaxed)
}

fn format_line(level: LogLevel, args: fmt::Arguments<'_>) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    format!("[{}] [{}] {}", timestamp, level, args)
}

/// Append one line at `level`. Macros call this after checking `enabled`.
pub fn write(level: LogLevel, args: fmt::Arguments<'_>) {
    let Some(sink) = SINK.get() else {
        return;
    };
    let line = format_line(level, args);
    if let Ok(mut file) = sink.lock() {
        let _ = writeln!(file, "{}", line);
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __slog_at {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::write($level, format_args!($($arg)*))
        }
    };
}

/// INFO level.
#[macro_export]
macro_rules! slog {
    ($($arg:tt)*) => { $crate::__slog_at!($crate::log::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! slog_error {
    ($($arg:tt)*) => { $crate::__slog_at!($crate::log::LogLevel::Error, $($arg)*) };
}

#[macro_export]
macro_rules! slog_warn {
    ($($arg:tt)*) => { $crate::__slog_at!($crate::log::LogLevel::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! slog_debug {
    ($($arg:tt)*) => { $crate::__slog_at!($crate::log::LogLevel::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! slog_trace {
    ($($arg:tt)*) => { $crate::__slog_at!($crate::log::LogLevel::Trace, $($arg)*) };
}
