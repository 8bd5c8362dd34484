use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

// ============================================================================
// Metrics Module - Prometheus metrics for the benchmark core
// ============================================================================
//
// Tracks:
// - Units of work committed / rolled back (by failure kind)
// - Events appended
// - Unit-of-work latency
// - Conflict retries
//
// Counters only; turning them into reports is left to whoever scrapes the
// registry.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub units_of_work_committed: IntCounter,
    pub units_of_work_rolled_back: IntCounterVec,
    pub events_appended: IntCounter,
    pub unit_of_work_duration: Histogram,
    pub retry_attempts_total: IntCounter,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let units_of_work_committed = IntCounter::new(
            "units_of_work_committed_total",
            "Total units of work that committed",
        )?;
        registry.register(Box::new(units_of_work_committed.clone()))?;

        let units_of_work_rolled_back = IntCounterVec::new(
            Opts::new("units_of_work_rolled_back_total", "Total units of work that rolled back"),
            &["reason"],
        )?;
        registry.register(Box::new(units_of_work_rolled_back.clone()))?;

        let events_appended = IntCounter::new(
            "events_appended_total",
            "Total events appended by committed units of work",
        )?;
        registry.register(Box::new(events_appended.clone()))?;

        let unit_of_work_duration = Histogram::with_opts(
            HistogramOpts::new("unit_of_work_duration_seconds", "Unit of work execution duration")
                .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(unit_of_work_duration.clone()))?;

        let retry_attempts_total = IntCounter::new(
            "conflict_retry_attempts_total",
            "Units of work re-run after a concurrency conflict",
        )?;
        registry.register(Box::new(retry_attempts_total.clone()))?;

        Ok(Self {
            registry,
            units_of_work_committed,
            units_of_work_rolled_back,
            events_appended,
            unit_of_work_duration,
            retry_attempts_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a committed unit of work
    pub fn record_commit(&self, event_count: usize, duration_secs: f64) {
        self.units_of_work_committed.inc();
        self.events_appended.inc_by(event_count as u64);
        self.unit_of_work_duration.observe(duration_secs);
    }

    /// Helper to record a rolled back unit of work
    pub fn record_rollback(&self, reason: &str, duration_secs: f64) {
        self.units_of_work_rolled_back.with_label_values(&[reason]).inc();
        self.unit_of_work_duration.observe(duration_secs);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(metrics.registry.gather().len() > 0);
    }

    #[test]
    fn test_record_commit() {
        let metrics = Metrics::new().unwrap();
        metrics.record_commit(5, 0.002);
        metrics.record_commit(5, 0.003);

        let gathered = metrics.registry.gather();
        let committed = gathered.iter().find(|m| m.name() == "units_of_work_committed_total").unwrap();
        assert_eq!(committed.metric[0].counter.value, Some(2.0));
        let appended = gathered.iter().find(|m| m.name() == "events_appended_total").unwrap();
        assert_eq!(appended.metric[0].counter.value, Some(10.0));
    }

    #[test]
    fn test_record_rollback_by_reason() {
        let metrics = Metrics::new().unwrap();
        metrics.record_rollback("concurrency_conflict", 0.001);
        metrics.record_rollback("transaction_failure", 0.001);
        metrics.record_rollback("transaction_failure", 0.001);

        let gathered = metrics.registry.gather();
        let rolled_back = gathered.iter().find(|m| m.name() == "units_of_work_rolled_back_total").unwrap();
        assert_eq!(rolled_back.metric.len(), 2); // Two different reason labels
    }
}
