//! Catalogue of every phase's metrics.
//!
//! Names are unique across phases; the catalogue is what gets described to the
//! installed recorder so scrapes carry help text and units.

use crate::metrics::{MetricDoc, MetricType, PhaseMetrics};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Every documented metric, keyed by name
pub fn catalogue() -> BTreeMap<&'static str, MetricDoc> {
    let mut catalogue = BTreeMap::new();
    add_phase::<super::clean::CleanMetrics>(&mut catalogue);
    add_phase::<super::load::LoadMetrics>(&mut catalogue);
    catalogue
}

/// Register and describe all metrics with the installed recorder
pub fn register_all_metrics() {
    super::clean::CleanMetrics::register_metrics();
    super::load::LoadMetrics::register_metrics();

    let catalogue = catalogue();
    for doc in catalogue.values() {
        describe(doc);
    }
    info!("Described {} metrics", catalogue.len());
}

fn add_phase<T: PhaseMetrics>(catalogue: &mut BTreeMap<&'static str, MetricDoc>) {
    for doc in T::metrics_documentation() {
        if phase_of(doc.name) != Some(T::phase_name()) {
            warn!("Metric '{}' is not prefixed with phase '{}'", doc.name, T::phase_name());
        }
        if catalogue.contains_key(doc.name) {
            warn!("Metric '{}' from phase '{}' is already documented", doc.name, T::phase_name());
            continue;
        }
        catalogue.insert(doc.name, doc);
    }
}

fn describe(doc: &MetricDoc) {
    debug!("{} ({:?}) labels={:?}", doc.name, doc.metric_type, doc.labels);
    match doc.metric_type {
        MetricType::Counter => ::metrics::describe_counter!(doc.name, doc.help),
        MetricType::Histogram => {
            ::metrics::describe_histogram!(doc.name, ::metrics::Unit::Seconds, doc.help)
        }
        MetricType::Gauge => ::metrics::describe_gauge!(doc.name, doc.help),
    }
}

/// Phase a metric belongs to: `imdb_load_rollbacks_total` -> `load`
fn phase_of(metric_name: &str) -> Option<&str> {
    metric_name
        .strip_prefix("imdb_")
        .and_then(|rest| rest.split_once('_'))
        .map(|(phase, _)| phase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_of() {
        assert_eq!(phase_of("imdb_clean_files_cleaned_total"), Some("clean"));
        assert_eq!(phase_of("imdb_load_rollbacks_total"), Some("load"));
        assert_eq!(phase_of("scraper_rollbacks_total"), None);
    }

    #[test]
    fn test_catalogue_names_match_their_phase() {
        let catalogue = catalogue();
        assert_eq!(catalogue.len(), 14);
        for doc in catalogue.values() {
            let phase = phase_of(doc.name);
            assert!(phase == Some("clean") || phase == Some("load"), "{}", doc.name);
            assert!(!doc.help.is_empty(), "{} has no help text", doc.name);
        }
    }

    #[test]
    fn test_per_table_metrics_carry_table_label() {
        let catalogue = catalogue();
        let rows = &catalogue["imdb_load_rows_copied_total"];
        assert_eq!(rows.labels, vec!["table"]);
        assert!(catalogue["imdb_load_commits_total"].labels.is_empty());
    }
}
