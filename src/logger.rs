//! `log` backend that prints through semihosting to the debugger console.
//!
//! Each record costs a debugger round trip with the core halted, so the
//! default level stays at `Info`; kernel records above that come from the
//! tick and service-call paths.

use cortex_m_semihosting::hprintln;
use log::{LevelFilter, Log, Metadata, Record, set_logger, set_max_level};

pub struct Logger;

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = hprintln!("[{:>5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Install the semihosting logger at `Info`.
pub fn init() {
    init_with_level(LevelFilter::Info);
}

/// Install the semihosting logger. A second call keeps the first logger.
pub fn init_with_level(level: LevelFilter) {
    static LOGGER: Logger = Logger;
    if set_logger(&LOGGER).is_ok() {
        set_max_level(level);
    }
}
