//! `log` backend that forwards records to the host through [`LogCallback`]
//!
//! Lets engine logs show up in the host's own logging (os_log on Apple
//! platforms, Logcat on Android).

use std::sync::{Arc, OnceLock, RwLock};

use log::{Level, Log, Metadata, Record, SetLoggerError};

use super::types::{FfiLogLevel, LogCallback};

static HOST_LOGGER: OnceLock<HostLogger> = OnceLock::new();

struct HostLogger {
    callback: RwLock<Option<Arc<dyn LogCallback>>>,
}

impl HostLogger {
    fn replace_callback(&self, callback: Option<Arc<dyn LogCallback>>) {
        if let Ok(mut slot) = self.callback.write() {
            *slot = callback;
        }
    }

    fn current(&self) -> Option<Arc<dyn LogCallback>> {
        self.callback.read().ok().and_then(|slot| slot.clone())
    }
}

impl Log for HostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Clone out of the lock so a callback that logs cannot deadlock
        if let Some(callback) = self.current() {
            callback.on_log(
                FfiLogLevel::from(record.level()),
                record.target().to_string(),
                record.args().to_string(),
            );
        }
    }

    fn flush(&self) {}
}

/// Install the host logger as the global `log` backend
///
/// Fails if another logger (e.g. env_logger in a CLI) is already installed;
/// the callback is stored either way.
pub fn install_host_logger(
    callback: Arc<dyn LogCallback>,
    max_level: Level,
) -> Result<(), SetLoggerError> {
    let logger = HOST_LOGGER.get_or_init(|| HostLogger {
        callback: RwLock::new(None),
    });
    logger.replace_callback(Some(callback));

    log::set_logger(logger)?;
    log::set_max_level(max_level.to_level_filter());
    Ok(())
}

/// Swap or clear the callback of an installed host logger
pub fn set_host_log_callback(callback: Option<Arc<dyn LogCallback>>) {
    if let Some(logger) = HOST_LOGGER.get() {
        logger.replace_callback(callback);
    }
}

/// Route Rust logs to `callback`; returns false if a logger already existed
#[uniffi::export]
pub fn initialize_logging(callback: Box<dyn LogCallback>, max_level: FfiLogLevel) -> bool {
    install_host_logger(Arc::from(callback), max_level.into()).is_ok()
}

/// Change the most verbose level forwarded to the host
#[uniffi::export]
pub fn set_logging_level(level: FfiLogLevel) {
    log::set_max_level(Level::from(level).to_level_filter());
}
