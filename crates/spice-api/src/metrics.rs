use std::sync::{Mutex, PoisonError};

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use spice_core::RunnerStats;

/// Prometheus view of the scheduler counters, refreshed from a [`RunnerStats`] snapshot at scrape time.
///
/// - `spice_tasks_submitted_total`, `spice_tasks_succeeded_total`, `spice_tasks_failed_total`,
///   `spice_tasks_timed_out_total` - counters
/// - `spice_tasks_running`, `spice_tasks_pending`, `spice_sessions` - gauges
pub struct Metrics {
    registry: Registry,
    submitted: IntCounter,
    succeeded: IntCounter,
    failed: IntCounter,
    timed_out: IntCounter,
    running: IntGauge,
    pending: IntGauge,
    sessions: IntGauge,
    observe: Mutex<()>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("spice".to_string()), None)?;

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let submitted = counter("tasks_submitted_total", "Simulations submitted")?;
        let succeeded = counter("tasks_succeeded_total", "Simulations that succeeded")?;
        let failed = counter("tasks_failed_total", "Simulations that failed")?;
        let timed_out = counter("tasks_timed_out_total", "Simulations killed on timeout")?;

        let gauge = |name: &str, help: &str| -> Result<IntGauge, prometheus::Error> {
            let g = IntGauge::new(name, help)?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };
        let running = gauge("tasks_running", "Simulations holding a worker slot")?;
        let pending = gauge("tasks_pending", "Simulations waiting for a worker slot")?;
        let sessions = gauge("sessions", "Open client sessions")?;

        Ok(Self {
            registry,
            submitted,
            succeeded,
            failed,
            timed_out,
            running,
            pending,
            sessions,
            observe: Mutex::new(()),
        })
    }

    pub fn observe(&self, stats: &RunnerStats, sessions: usize) {
        let _guard = self.observe.lock().unwrap_or_else(PoisonError::into_inner);
        advance(&self.submitted, stats.submitted);
        advance(&self.succeeded, stats.succeeded);
        advance(&self.failed, stats.failed);
        advance(&self.timed_out, stats.timed_out);
        self.running.set(i64::try_from(stats.running).unwrap_or(i64::MAX));
        self.pending.set(i64::try_from(stats.pending).unwrap_or(i64::MAX));
        self.sessions.set(i64::try_from(sessions).unwrap_or(i64::MAX));
    }

    /// Content type and text exposition of every metric.
    pub fn encode(&self) -> Result<(String, Vec<u8>), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn advance(counter: &IntCounter, to: u64) {
    let now = counter.get();
    if to > now {
        counter.inc_by(to - now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_follow_snapshots() {
        let m = Metrics::new().unwrap();
        let mut stats = RunnerStats {
            submitted: 3,
            succeeded: 1,
            running: 2,
            ..RunnerStats::default()
        };
        m.observe(&stats, 1);
        stats.submitted = 5;
        stats.running = 0;
        m.observe(&stats, 0);

        let (ty, body) = m.encode().unwrap();
        assert!(ty.starts_with("text/plain"));
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("spice_tasks_submitted_total 5"));
        assert!(body.contains("spice_tasks_succeeded_total 1"));
        assert!(body.contains("spice_tasks_running 0"));
        assert!(body.contains("spice_sessions 0"));
    }
}
