//! Observability for the room client.
//!
//! # Logging
//!
//! All log lines go through `tracing` with structured fields (`room_id`,
//! `peer_id`, `producer_id`, `consumer_id`, `kind`). Targets are prefixed
//! `rc.` so embedders can filter them. Display names and avatars are never
//! logged.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `rc_producers_active` | Gauge | none | Local producers |
//! | `rc_consumers_active` | Gauge | none | Inbound consumers |
//! | `rc_roster_peers` | Gauge | none | Remote peers in the roster |
//! | `rc_join_total` | Counter | `status` | Join outcomes |
//! | `rc_signaling_requests_total` | Counter | `method`, `status` | Signaling round trips |
//! | `rc_signaling_request_duration_seconds` | Histogram | `method` | Round trip latency |
//! | `rc_attribution_misses_total` | Counter | none | Streams shown in the fallback slot |
//! | `rc_transport_failures_total` | Counter | `direction` | Transports that reached `failed` |

pub mod metrics;

use crate::errors::ClientError;
use common::config::ObservabilityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
///
/// # Errors
///
/// Returns `ClientError::Config` if the filter directive is invalid or a
/// global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), ClientError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| ClientError::Config(format!("invalid log level: {e}")))?,
    };

    let json = config.json_logs.then(|| tracing_subscriber::fmt::layer().json());
    let plain = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
        .map_err(|e| ClientError::Config(format!("tracing already initialized: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = ObservabilityConfig {
            log_level: "room_client=verbose".to_string(),
            json_logs: false,
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
