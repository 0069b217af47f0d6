//! Logging infrastructure for pullbridge
//!
//! Negotiation messages go to the `audio` target and native host messages
//! to `audio::host`; each can be tuned separately from the global level.
//! `RUST_LOG`, when set, replaces the configured filter entirely.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Config, DebugConfig};

#[doc(hidden)]
pub use tracing;

/// Target of negotiation and teardown messages
pub const AUDIO_TARGET: &str = "audio";

/// Target of native host messages
pub const HOST_TARGET: &str = "audio::host";

/// Filter directives for a debug configuration, `None` when logging is off.
///
/// A target override applies even when it is quieter than the global level.
pub fn filter_directives(debug: &DebugConfig) -> Option<String> {
    let overrides = [
        (AUDIO_TARGET, debug.audio_log_level),
        (HOST_TARGET, debug.host_log_level),
    ];
    let mut directives = vec![debug.log_level.as_str().to_string()];
    for (target, level) in overrides {
        if let Some(level) = level {
            directives.push(format!("{}={}", target, level.as_str()));
        }
    }

    let all_off = directives.iter().all(|d| d.ends_with("off"));
    (!all_off).then(|| directives.join(","))
}

/// Initialize the logging system based on configuration
pub fn init(config: &Config) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match filter_directives(&config.debug) {
            Some(directives) => EnvFilter::new(directives),
            None => return,
        },
    };

    let console = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file = if config.debug.log_to_file {
        match std::fs::File::create(&config.debug.log_path) {
            Ok(file) => Some(
                fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            ),
            Err(e) => {
                eprintln!(
                    "Cannot open log file {}: {}",
                    config.debug.log_path.display(),
                    e
                );
                None
            }
        }
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
}

/// Log an audio negotiation trace message
#[macro_export]
macro_rules! audio_trace {
    ($($arg:tt)*) => {
        $crate::logging::tracing::trace!(target: $crate::logging::AUDIO_TARGET, $($arg)*)
    };
}

/// Log an audio negotiation debug message
#[macro_export]
macro_rules! audio_debug {
    ($($arg:tt)*) => {
        $crate::logging::tracing::debug!(target: $crate::logging::AUDIO_TARGET, $($arg)*)
    };
}

/// Log a native host debug message
#[macro_export]
macro_rules! host_debug {
    ($($arg:tt)*) => {
        $crate::logging::tracing::debug!(target: $crate::logging::HOST_TARGET, $($arg)*)
    };
}
