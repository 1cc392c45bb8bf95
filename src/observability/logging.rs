//! Structured logging setup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset and no level is configured.
pub const DEFAULT_FILTER: &str = "ride_matcher=debug,tower_http=debug";

/// Filter directive for a configured level, e.g. `info` becomes
/// `ride_matcher=info,tower_http=info`.
pub fn filter_for(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        return DEFAULT_FILTER.to_string();
    }
    format!("ride_matcher={level},tower_http={level}")
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_for_level() {
        assert_eq!(filter_for("warn"), "ride_matcher=warn,tower_http=warn");
        assert_eq!(filter_for(" "), DEFAULT_FILTER);
    }
}
