//! Call metrics
//!
//! Samples go through the `metrics` facade into a Prometheus recorder owned by
//! each [`CallMetrics`], so separate handlers never share series. The text
//! exposition is served by the RPC layer.

use callctl_core::{
    models::{Direction, HangupReason},
    traits::MetricsSink,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::time::Duration;
use tracing::{debug, warn};

pub const CALL_CREATE_TOTAL: &str = "call_create_total";
pub const CALL_HANGUP_TOTAL: &str = "call_hangup_total";
pub const CALL_ACTION_PROCESS_TIME_MS: &str = "call_action_process_time_ms";

/// Action execution buckets in milliseconds
const ACTION_BUCKETS_MS: &[f64] = &[
    1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// Default [`MetricsSink`]
pub struct CallMetrics {
    recorder: PrometheusRecorder,
    handle: PrometheusHandle,
}

impl Default for CallMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CallMetrics {
    pub fn new() -> Self {
        let recorder = match PrometheusBuilder::new().set_buckets(ACTION_BUCKETS_MS) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                warn!("Could not set the histogram buckets. Falling back to summaries. err: {}", e);
                PrometheusBuilder::new().build_recorder()
            }
        };
        let handle = recorder.handle();

        Self { recorder, handle }
    }

    /// Prometheus text exposition of every recorded series
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Current value of a counter or histogram series.
    ///
    /// The series is matched by name and by every given label pair.
    pub fn sample(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let rendered = self.render();
        rendered
            .lines()
            .filter(|l| !l.starts_with('#'))
            .filter(|l| {
                l.strip_prefix(name)
                    .map_or(false, |rest| rest.starts_with('{') || rest.starts_with(' '))
            })
            .find(|l| {
                labels
                    .iter()
                    .all(|(k, v)| l.contains(&format!("{}=\"{}\"", k, v)))
            })
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }
}

impl MetricsSink for CallMetrics {
    fn call_created(&self, direction: Direction) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(CALL_CREATE_TOTAL, "direction" => direction.as_str()).increment(1);
        });

        debug!(target: "callctl::metrics", direction = direction.as_str(), "call_create_total");
    }

    fn call_hungup(&self, direction: Direction, reason: HangupReason) {
        metrics::with_local_recorder(&self.recorder, || {
            metrics::counter!(
                CALL_HANGUP_TOTAL,
                "direction" => direction.as_str(),
                "reason" => reason.as_str()
            )
            .increment(1);
        });

        debug!(
            target: "callctl::metrics",
            direction = direction.as_str(),
            reason = reason.as_str(),
            "call_hangup_total"
        );
    }

    fn action_executed(&self, action: &str, elapsed: Duration) {
        let ms = elapsed.as_millis() as f64;
        metrics::with_local_recorder(&self.recorder, || {
            metrics::histogram!(CALL_ACTION_PROCESS_TIME_MS, "type" => action.to_string())
                .record(ms);
        });

        debug!(target: "callctl::metrics", action, elapsed_ms = ms, "action_execute");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let m = CallMetrics::new();
        m.call_created(Direction::Incoming);
        m.call_created(Direction::Incoming);
        m.call_created(Direction::Outgoing);
        m.call_hungup(Direction::Outgoing, HangupReason::Busy);

        assert_eq!(m.sample(CALL_CREATE_TOTAL, &[("direction", "incoming")]), Some(2.0));
        assert_eq!(m.sample(CALL_CREATE_TOTAL, &[("direction", "outgoing")]), Some(1.0));
        assert_eq!(
            m.sample(
                CALL_HANGUP_TOTAL,
                &[("direction", "outgoing"), ("reason", "busy")]
            ),
            Some(1.0)
        );
        assert_eq!(m.sample(CALL_HANGUP_TOTAL, &[("reason", "normal")]), None);
    }

    #[test]
    fn test_action_histogram() {
        let m = CallMetrics::new();
        m.action_executed("answer", Duration::from_millis(20));
        m.action_executed("answer", Duration::from_millis(50));

        let count = format!("{}_count", CALL_ACTION_PROCESS_TIME_MS);
        let sum = format!("{}_sum", CALL_ACTION_PROCESS_TIME_MS);
        assert_eq!(m.sample(&count, &[("type", "answer")]), Some(2.0));
        assert_eq!(m.sample(&sum, &[("type", "answer")]), Some(70.0));
        assert!(m.render().contains("# TYPE call_action_process_time_ms histogram"));
    }

    #[test]
    fn test_recorders_are_isolated() {
        let a = CallMetrics::new();
        let b = CallMetrics::new();
        a.call_created(Direction::Incoming);

        assert_eq!(a.sample(CALL_CREATE_TOTAL, &[]), Some(1.0));
        assert_eq!(b.sample(CALL_CREATE_TOTAL, &[]), None);
    }
}
