// quillbase-core/src/logging.rs
// Leveled diagnostics on stderr, gated by one atomic verbosity ceiling.
// Call sites go through the single `quill_log!` macro, which hands a
// `fmt::Arguments` to `emit` so nothing is formatted unless the record
// actually passes the gate.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Logger verbosity. `Off` silences everything; each step down admits one
/// more level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    const LABELS: [&'static str; 6] = ["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"];

    /// Fixed-width tag printed in each record.
    pub fn label(self) -> &'static str {
        Self::LABELS[self as usize]
    }

    fn from_index(index: usize) -> LogLevel {
        match index {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<LogLevel, ()> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

// Verbosity ceiling shared by every collection in the process
static MAX_LEVEL: AtomicUsize = AtomicUsize::new(LogLevel::Warn as usize);

/// Raise or lower the verbosity ceiling.
pub fn set_log_level(level: LogLevel) {
    MAX_LEVEL.store(level as usize, Ordering::Relaxed);
}

/// The current verbosity ceiling.
pub fn get_log_level() -> LogLevel {
    LogLevel::from_index(MAX_LEVEL.load(Ordering::Relaxed))
}

/// Whether a record at `level` would currently be written.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level as usize <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Write one record. Prefer `quill_log!`, which builds the `Arguments` and
/// fills in the module path.
pub fn emit(level: LogLevel, target: &str, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let ts = chrono::Utc::now().format("%H:%M:%S%.3f");
    eprintln!("[{} {:5} {}] {}", ts, level.label(), target, args);
}

/// Log at the given level: `quill_log!(Warn, "replay skipped {} lines", n)`.
///
/// The level is a bare `LogLevel` variant name; formatting is deferred until
/// the verbosity gate has passed.
#[macro_export]
macro_rules! quill_log {
    ($level:ident, $($arg:tt)+) => {
        $crate::logging::emit(
            $crate::logging::LogLevel::$level,
            module_path!(),
            format_args!($($arg)+),
        )
    };
}
