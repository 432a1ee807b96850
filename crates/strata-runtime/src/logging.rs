#![forbid(unsafe_code)]

//! Log subscriber setup.
//!
//! Library code only emits through `tracing`. Binaries and test harnesses
//! call [`init`] once to install a `tracing-subscriber` registry.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Environment variable that overrides [`LoggingConfig::filter`].
pub const LOG_ENV: &str = "STRATA_LOG";

/// Build the filter for `config`, preferring `STRATA_LOG` when it is set.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber.
///
/// Returns `false` if a global subscriber was already set; the call is then a
/// no-op.
pub fn init(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    #[cfg(feature = "tracing-json")]
    if config.json {
        return registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .is_ok();
    }

    let installed = registry
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();
    #[cfg(not(feature = "tracing-json"))]
    if installed && config.json {
        tracing::warn!("JSON logging requested but the tracing-json feature is disabled");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_noop() {
        let config = LoggingConfig::default();
        let _ = init(&config);
        assert!(!init(&config));
    }

    #[test]
    fn bad_directive_falls_back() {
        let config = LoggingConfig {
            filter: "strata=notalevel".into(),
            json: false,
        };
        let filter = env_filter(&config);
        assert!(!filter.to_string().is_empty());
    }
}
