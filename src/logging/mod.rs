//! Structured logging with client context.
//!
//! Provides logging macros and utilities that include the client id and,
//! where relevant, the report id in every log message for easy correlation.

pub mod structured;

pub use structured::*;

/// Initialize the process-wide logger.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_millis()
        .try_init();
}
