#![deny(missing_docs)]
//! Logging macros for page-watch.
//!
//! `watch_*` lines describe the process as a whole (batches, retries, delivery
//! channels). `cycle_*` lines belong to one monitoring cycle and carry its
//! target id as a `[id]` prefix, so interleaved cycles stay readable.

/// Process-level info line.
#[macro_export]
macro_rules! watch_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Process-level warning, e.g. a retried fetch.
#[macro_export]
macro_rules! watch_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Process-level error.
#[macro_export]
macro_rules! watch_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Debug line for the cycle of `$target_id`.
#[macro_export]
macro_rules! cycle_debug {
    ($target_id:expr, $($arg:tt)*) => {{
        log::debug!("[{}] {}", $target_id, format_args!($($arg)*));
    }};
}

/// Info line for the cycle of `$target_id`.
#[macro_export]
macro_rules! cycle_info {
    ($target_id:expr, $($arg:tt)*) => {{
        log::info!("[{}] {}", $target_id, format_args!($($arg)*));
    }};
}

/// Warning for the cycle of `$target_id`.
#[macro_export]
macro_rules! cycle_warn {
    ($target_id:expr, $($arg:tt)*) => {{
        log::warn!("[{}] {}", $target_id, format_args!($($arg)*));
    }};
}

/// Error for the cycle of `$target_id`.
#[macro_export]
macro_rules! cycle_error {
    ($target_id:expr, $($arg:tt)*) => {{
        log::error!("[{}] {}", $target_id, format_args!($($arg)*));
    }};
}

/// Route cycle logs to stderr during tests, with HTTP client and mock-server chatter
/// filtered out. Safe to call from every test; only the first call installs a logger.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

    let config = ConfigBuilder::new()
        .add_filter_ignore_str("reqwest")
        .add_filter_ignore_str("hyper")
        .add_filter_ignore_str("wiremock")
        .build();
    let _ = TermLogger::init(
        log::LevelFilter::Debug,
        config,
        TerminalMode::Stderr,
        ColorChoice::Never,
    );
}
