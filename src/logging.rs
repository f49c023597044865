//! Tracing subscriber setup

use crate::config::MonitoringConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// production deployments log JSON lines.
///
/// Calling this more than once is harmless: later calls leave the first
/// subscriber in place.
pub fn init_tracing(config: &MonitoringConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

fn default_filter(config: &MonitoringConfig) -> EnvFilter {
    let level = config.log_level.as_str();
    EnvFilter::new(format!(
        "bingo_engine={level},bingo_server={level},tower_http=info"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_filter_uses_configured_level() {
        let config = MonitoringConfig {
            log_level: LogLevel::Debug,
            ..Default::default()
        };
        let rendered = default_filter(&config).to_string();
        assert!(rendered.contains("bingo_engine=debug"));
        assert!(rendered.contains("tower_http=info"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let config = MonitoringConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
