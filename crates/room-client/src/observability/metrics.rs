//! Metrics recorded by the room client.
//!
//! Naming follows Prometheus conventions:
//! - `rc_` prefix for the room client
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! No recorder is installed here; the embedding application chooses the
//! exporter. Without one, every call is a no-op.
//!
//! # Cardinality
//!
//! - `method`: bounded by the signaling method table (~12 values)
//! - `status`: success, error, unavailable
//! - `direction`: send, recv

use crate::media::TransportDirection;
use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Session Resource Gauges
// ============================================================================

/// Set the number of local producers.
///
/// Metric: `rc_producers_active`
/// Labels: none
///
/// Never exceeds 2 (one per media kind).
pub fn set_producers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_producers_active").set(count as f64);
}

/// Set the number of inbound consumers.
///
/// Metric: `rc_consumers_active`
/// Labels: none
pub fn set_consumers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_consumers_active").set(count as f64);
}

/// Set the number of remote peers in the roster.
///
/// Metric: `rc_roster_peers`
/// Labels: none
pub fn set_roster_peers(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("rc_roster_peers").set(count as f64);
}

// ============================================================================
// Counters
// ============================================================================

/// Record the outcome of a join attempt.
///
/// Metric: `rc_join_total`
/// Labels: `status` (success, failure, aborted)
pub fn record_join(status: &'static str) {
    counter!("rc_join_total", "status" => status).increment(1);
}

/// Record an inbound stream that could not be attributed to a roster peer.
///
/// Metric: `rc_attribution_misses_total`
/// Labels: none
///
/// The stream is shown in the fallback slot; a steady non-zero rate means
/// producers are announced before their owners join.
pub fn record_attribution_miss() {
    counter!("rc_attribution_misses_total").increment(1);
}

/// Record a transport that reached the `failed` state.
///
/// Metric: `rc_transport_failures_total`
/// Labels: `direction`
pub fn record_transport_failure(direction: TransportDirection) {
    counter!("rc_transport_failures_total", "direction" => direction.as_str()).increment(1);
}

// ============================================================================
// Signaling
// ============================================================================

/// Record one signaling round trip.
///
/// Metrics: `rc_signaling_requests_total`, `rc_signaling_request_duration_seconds`
/// Labels: `method`, `status` (counter); `method` (histogram)
pub fn record_signaling_request(method: &'static str, status: &'static str, duration: Duration) {
    counter!(
        "rc_signaling_requests_total",
        "method" => method,
        "status" => status
    )
    .increment(1);
    histogram!("rc_signaling_request_duration_seconds", "method" => method)
        .record(duration.as_secs_f64());
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_recording_without_recorder_is_noop() {
        set_producers_active(0);
        set_consumers_active(3);
        set_roster_peers(12);
        record_join("success");
        record_attribution_miss();
        record_transport_failure(TransportDirection::Recv);
        record_signaling_request("join", "error", Duration::from_millis(3));
    }

    #[test]
    fn test_metric_names_and_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_signaling_request("consume", "success", Duration::from_millis(12));
            record_signaling_request("consume", "success", Duration::from_millis(8));
            record_transport_failure(TransportDirection::Send);
            set_producers_active(2);
        });

        let entries = snapshotter.snapshot().into_vec();

        let requests = entries
            .iter()
            .find(|(key, _, _, _)| key.key().name() == "rc_signaling_requests_total")
            .expect("request counter recorded");
        assert_eq!(requests.3, DebugValue::Counter(2));
        let labels: Vec<(String, String)> = requests
            .0
            .key()
            .labels()
            .map(|l| (l.key().to_string(), l.value().to_string()))
            .collect();
        assert!(labels.contains(&("method".to_string(), "consume".to_string())));
        assert!(labels.contains(&("status".to_string(), "success".to_string())));

        assert!(entries
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "rc_signaling_request_duration_seconds"));
        assert!(entries.iter().any(|(key, _, _, value)| {
            key.key().name() == "rc_transport_failures_total" && *value == DebugValue::Counter(1)
        }));
        assert!(entries
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "rc_producers_active"));
    }
}
