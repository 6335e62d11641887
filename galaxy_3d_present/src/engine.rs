//! Galaxy3D logger hub
//!
//! Holds the process-wide log sink used by the `engine_*` macros. Nothing
//! else is global: frame pipelines, surfaces and frame loops are plain values
//! owned by the caller, so several of them can coexist (one per window).

use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

fn logger_slot() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Entry point for engine-wide logging
pub struct Engine;

impl Engine {
    /// Replace the active logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use galaxy_3d_present::galaxy3d::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct Silent;
    /// impl Logger for Silent {
    ///     fn log(&self, _entry: &LogEntry) {}
    /// }
    ///
    /// Engine::set_logger(Silent);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_slot().write() {
            *lock = Box::new(logger);
        }
    }

    /// Restore the DefaultLogger
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_slot().write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Log without file:line (used by engine_trace! .. engine_warn!)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        if let Ok(lock) = logger_slot().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: None,
                line: None,
            });
        }
    }

    /// Log with file:line (used by engine_error!)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if let Ok(lock) = logger_slot().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file: Some(file),
                line: Some(line),
            });
        }
    }
}
