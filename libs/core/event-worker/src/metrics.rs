//! Pipeline metrics.
//!
//! Components never touch global counters directly: they receive a
//! `MetricsRecorder` at construction, so tests can substitute a fake and
//! production wires in the Prometheus-backed recorder.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus exporter.
///
/// Call once at startup; subsequent calls are no-ops.
pub fn init_metrics() {
    let _ = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("Failed to install Prometheus recorder");
        info!("Prometheus metrics initialized");
        handle
    });
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus exposition format
pub fn render_metrics() -> String {
    prometheus_handle()
        .map(|h| h.render())
        .unwrap_or_default()
}

/// Capability for recording pipeline metrics.
///
/// Counter increments must be safe under concurrent workers; the
/// Prometheus implementation relies on the atomic handles of the `metrics`
/// crate for that.
pub trait MetricsRecorder: Send + Sync {
    /// Count one processing attempt for `service`.
    fn request(&self, service: &str);

    /// Observe the latency of one processing attempt, in seconds.
    fn latency(&self, service: &str, seconds: f64);

    /// Count a generation failure against the backend that produced it.
    fn generation_error(&self, provider: &str);

    /// Count a scheduled retry.
    fn retry(&self, service: &str);

    /// Count a terminal quarantine.
    fn quarantined(&self, service: &str);
}

/// Prometheus-backed recorder.
#[derive(Debug, Clone, Default)]
pub struct PrometheusRecorder;

impl PrometheusRecorder {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn request(&self, service: &str) {
        counter!("ai_requests_total", "service" => service.to_string()).increment(1);
    }

    fn latency(&self, service: &str, seconds: f64) {
        histogram!("ai_request_latency_seconds", "service" => service.to_string())
            .record(seconds);
    }

    fn generation_error(&self, provider: &str) {
        counter!("llm_errors_total", "provider" => provider.to_string()).increment(1);
    }

    fn retry(&self, service: &str) {
        counter!("pipeline_retries_total", "service" => service.to_string()).increment(1);
    }

    fn quarantined(&self, service: &str) {
        counter!("pipeline_quarantined_total", "service" => service.to_string()).increment(1);
    }
}

/// Scoped attempt measurement.
///
/// Counts the attempt and records its latency when dropped, so both are
/// recorded exactly once per attempt on every exit path.
pub struct AttemptTimer {
    recorder: Arc<dyn MetricsRecorder>,
    service: String,
    started: Instant,
}

impl AttemptTimer {
    pub fn start(recorder: Arc<dyn MetricsRecorder>, service: impl Into<String>) -> Self {
        Self {
            recorder,
            service: service.into(),
            started: Instant::now(),
        }
    }
}

impl Drop for AttemptTimer {
    fn drop(&mut self) {
        self.recorder.request(&self.service);
        self.recorder
            .latency(&self.service, self.started.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        requests: AtomicU32,
        latencies: Mutex<Vec<f64>>,
    }

    impl MetricsRecorder for Recording {
        fn request(&self, _service: &str) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }
        fn latency(&self, _service: &str, seconds: f64) {
            self.latencies.lock().unwrap().push(seconds);
        }
        fn generation_error(&self, _provider: &str) {}
        fn retry(&self, _service: &str) {}
        fn quarantined(&self, _service: &str) {}
    }

    #[test]
    fn attempt_timer_records_once_on_drop() {
        let recorder = Arc::new(Recording::default());

        {
            let _timer = AttemptTimer::start(recorder.clone(), "chat-pipeline");
        }

        assert_eq!(recorder.requests.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.latencies.lock().unwrap().len(), 1);
    }

    #[test]
    fn attempt_timer_records_on_early_return() {
        let recorder = Arc::new(Recording::default());

        fn failing_path(recorder: Arc<Recording>) -> Result<(), &'static str> {
            let _timer = AttemptTimer::start(recorder, "chat-pipeline");
            Err("boom")
        }

        assert!(failing_path(recorder.clone()).is_err());
        assert_eq!(recorder.requests.load(Ordering::SeqCst), 1);
    }
}
