//! Clean Phase Metrics
//!
//! Per-file outcomes and row-level counts from the cleaner.

use crate::clean::CleanStats;
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for the clean phase
pub struct CleanMetrics;

impl CleanMetrics {
    /// Record a file that was cleaned and written
    pub fn record_file_cleaned(stats: &CleanStats) {
        ::metrics::counter!(phase_metric!(counter, "clean", "files_cleaned")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "clean", "rows_read"))
            .increment(stats.rows_read as u64);
        ::metrics::counter!(phase_metric!(counter, "clean", "rows_written"))
            .increment(stats.rows_written as u64);
        ::metrics::counter!(phase_metric!(counter, "clean", "rows_filtered"))
            .increment(stats.filtered_rows as u64);
        ::metrics::counter!(phase_metric!(counter, "clean", "rows_malformed"))
            .increment(stats.malformed_rows as u64);
        ::metrics::counter!(phase_metric!(counter, "clean", "values_nulled"))
            .increment(stats.nulled_values as u64);
    }

    /// Record a file that could not be cleaned
    pub fn record_file_failed() {
        ::metrics::counter!(phase_metric!(counter, "clean", "files_failed")).increment(1);
    }

    /// Record a file without a table descriptor
    pub fn record_file_skipped() {
        ::metrics::counter!(phase_metric!(counter, "clean", "files_skipped")).increment(1);
    }
}

impl PhaseMetrics for CleanMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(phase_metric!(counter, "clean", "files_cleaned"));
        let _ = counter!(phase_metric!(counter, "clean", "files_failed"));
        let _ = counter!(phase_metric!(counter, "clean", "files_skipped"));
        let _ = counter!(phase_metric!(counter, "clean", "rows_read"));
        let _ = counter!(phase_metric!(counter, "clean", "rows_written"));
        let _ = counter!(phase_metric!(counter, "clean", "rows_filtered"));
        let _ = counter!(phase_metric!(counter, "clean", "rows_malformed"));
        let _ = counter!(phase_metric!(counter, "clean", "values_nulled"));
    }

    fn phase_name() -> &'static str {
        "clean"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "clean", "files_cleaned"),
                metric_type: MetricType::Counter,
                help: "Source files cleaned and written",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "files_failed"),
                metric_type: MetricType::Counter,
                help: "Source files that could not be read or written",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "files_skipped"),
                metric_type: MetricType::Counter,
                help: "Source files with no table descriptor",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "rows_read"),
                metric_type: MetricType::Counter,
                help: "Data rows read from source files",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "rows_written"),
                metric_type: MetricType::Counter,
                help: "Rows written to cleaned files",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "rows_filtered"),
                metric_type: MetricType::Counter,
                help: "Rows dropped by the pre-load reference filter",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "rows_malformed"),
                metric_type: MetricType::Counter,
                help: "Rows skipped because they could not be parsed",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "clean", "values_nulled"),
                metric_type: MetricType::Counter,
                help: "Non-blank integer values replaced by missing",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_metrics_registration() {
        CleanMetrics::register_metrics();
        CleanMetrics::record_file_cleaned(&CleanStats::default());
    }

    #[test]
    fn test_metrics_documentation() {
        let docs = CleanMetrics::metrics_documentation();
        assert_eq!(docs.len(), 8);
        for doc in docs {
            assert!(doc.name.starts_with("imdb_clean_"));
        }
    }

    #[test]
    fn test_recorded_metrics_reach_prometheus_output() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            CleanMetrics::record_file_failed();
            CleanMetrics::record_file_cleaned(&CleanStats {
                rows_read: 3,
                rows_written: 2,
                ..CleanStats::default()
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains("imdb_clean_files_failed_total 1"), "{}", rendered);
        assert!(rendered.contains("imdb_clean_rows_written_total 2"), "{}", rendered);
    }
}
