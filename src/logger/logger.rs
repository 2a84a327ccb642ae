use crate::config::config::LoggerConfig;

/// level_filter maps a configured level name to a filter, defaulting to info.
pub fn level_filter(level: &str) -> log::LevelFilter {
    match level {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

/// setup_logger installs the process logger. Calling it again is a no-op.
pub fn setup_logger(config: &LoggerConfig) {
    let _ = env_logger::builder()
        .filter_level(level_filter(&config.level))
        .format_timestamp_micros()
        .target(env_logger::Target::Stderr)
        .try_init();
}
