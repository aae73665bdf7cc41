// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance and initialization.

use super::output::{LogLevel, Output};
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<GlobalLogger>>> = OnceLock::new();

struct GlobalLogger {
    output: Option<Arc<dyn Output>>,
    level_filter: LogLevel,
}

impl GlobalLogger {
    fn new() -> Self {
        Self {
            output: None,
            level_filter: LogLevel::Info,
        }
    }

    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        if let Some(ref output) = self.output {
            output.write(level, message)?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(ref output) = self.output {
            output.flush()?;
        }
        Ok(())
    }
}

/// Initialize the global logger. Can only be called once; later calls are
/// ignored. Call before the STM is exercised from more than one thread.
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let _ = LOGGER.get_or_init(|| {
        Arc::new(Mutex::new(GlobalLogger {
            output: Some(output),
            level_filter: level,
        }))
    });
}

#[inline]
fn get_logger() -> Option<Arc<Mutex<GlobalLogger>>> {
    LOGGER.get().cloned()
}

#[inline]
pub(crate) fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    match get_logger() {
        Some(logger) => logger.lock().log(level, message),
        None => Ok(()),
    }
}

pub fn flush_logger() -> io::Result<()> {
    match get_logger() {
        Some(logger) => logger.lock().flush(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::output::ConsoleOutput;

    #[test]
    fn log_message_no_panic_when_uninitialized() {
        let result = log_message(LogLevel::Info, "test message");
        assert!(result.is_ok());
    }

    #[test]
    fn init_logger_then_log() {
        init_logger(Arc::new(ConsoleOutput::new()), LogLevel::Debug);
        assert!(log_message(LogLevel::Warning, "warning").is_ok());
        assert!(flush_logger().is_ok());
    }
}
