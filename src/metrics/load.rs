//! Load Phase Metrics
//!
//! Table copies, orphan deletes and transaction outcomes from the loader.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for the load phase
pub struct LoadMetrics;

impl LoadMetrics {
    /// Record a table truncated and copied inside the run transaction
    pub fn record_table_loaded(table: &str, rows: u64, duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "load", "rows_copied"), "table" => table.to_string())
            .increment(rows);
        ::metrics::histogram!(phase_metric!(histogram, "load", "table_duration_seconds"), "table" => table.to_string())
            .record(duration_secs);
    }

    pub fn record_orphans_deleted(table: &str, deleted: u64) {
        ::metrics::counter!(phase_metric!(counter, "load", "orphans_deleted"), "table" => table.to_string())
            .increment(deleted);
    }

    pub fn record_commit(total_rows: u64) {
        ::metrics::counter!(phase_metric!(counter, "load", "commits")).increment(1);
        ::metrics::gauge!(phase_metric!(gauge, "load", "last_run_rows")).set(total_rows as f64);
    }

    pub fn record_rollback() {
        ::metrics::counter!(phase_metric!(counter, "load", "rollbacks")).increment(1);
    }
}

impl PhaseMetrics for LoadMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "load", "rows_copied"));
        let _ = counter!(phase_metric!(counter, "load", "orphans_deleted"));
        let _ = counter!(phase_metric!(counter, "load", "commits"));
        let _ = counter!(phase_metric!(counter, "load", "rollbacks"));
        let _ = histogram!(phase_metric!(histogram, "load", "table_duration_seconds"));
        let _ = gauge!(phase_metric!(gauge, "load", "last_run_rows"));
    }

    fn phase_name() -> &'static str {
        "load"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "load", "rows_copied"),
                metric_type: MetricType::Counter,
                help: "Rows bulk-copied into target tables",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "orphans_deleted"),
                metric_type: MetricType::Counter,
                help: "Rows removed by post-load orphan cleanup",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "commits"),
                metric_type: MetricType::Counter,
                help: "Load transactions committed",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "rollbacks"),
                metric_type: MetricType::Counter,
                help: "Load transactions rolled back",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "load", "table_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent truncating and copying one table",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(gauge, "load", "last_run_rows"),
                metric_type: MetricType::Gauge,
                help: "Rows committed by the most recent load",
                labels: vec![],
            },
        ]
    }
}
