//! Process-wide `tracing` subscriber.

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG`, when set, takes precedence over `config.level`. Calling this
/// more than once is harmless: later calls leave the first subscriber in
/// place and return `false`.
pub fn init(config: &LogConfig) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config))
        .with_target(true);

    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
    installed.is_ok()
}

fn filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_falls_back() {
        let config = LogConfig { level: "not a [valid filter".to_owned(), format: LogFormat::Json };
        // the fallback filter still builds
        let _ = filter(&config);
    }

    #[test]
    fn second_init_is_a_no_op() {
        let config = LogConfig::default();
        init(&config);
        assert!(!init(&config));
    }
}
