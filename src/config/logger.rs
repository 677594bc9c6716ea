// logger.rs
use log::LevelFilter;

/// Installs env_logger. Without RUST_LOG the exporter's own records pass at any
/// level and dependencies are held to warn; the effective level is set
/// afterwards with `set_level`, once the configuration file has been read.
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter()))
        .format_timestamp_secs()
        .try_init();
}

fn default_filter() -> String {
    format!("warn,{}=trace", env!("CARGO_CRATE_NAME"))
}

pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Level to apply from the configuration, `None` when RUST_LOG is set and wins.
pub fn configured_level(level: &str, rust_log: Option<&str>) -> Option<LevelFilter> {
    match rust_log {
        Some(spec) if !spec.trim().is_empty() => None,
        _ => Some(parse_level(level)),
    }
}

pub fn set_level(level: &str) {
    let rust_log = std::env::var(env_logger::DEFAULT_FILTER_ENV).ok();
    match configured_level(level, rust_log.as_deref()) {
        Some(filter) => {
            log::set_max_level(filter);
            log::debug!("Logger level set to {}", filter);
        }
        None => log::debug!("RUST_LOG is set, ignoring log_level {}", level),
    }
}
