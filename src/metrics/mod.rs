//! Centralized metrics for the clean and load phases
//!
//! Each phase defines its own metrics in a dedicated submodule, so names stay
//! consistent and ownership is clear. Recording is always on; exporting only
//! happens when `IMDB_METRICS_ADDR` names a listen address.

pub mod clean;
pub mod load;
pub mod registry;

pub use clean::CleanMetrics;
pub use load::LoadMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus exporter if `IMDB_METRICS_ADDR` is set.
///
/// Safe to call more than once; only the first call does anything. Without an
/// address, recording calls are no-ops.
pub fn init_metrics() {
    INIT.call_once(|| {
        let Some(addr) = exporter_addr(std::env::var("IMDB_METRICS_ADDR").ok().as_deref()) else {
            return;
        };

        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening at http://{}/metrics", addr);
                registry::register_all_metrics();
            }
            Err(e) => warn!("Metrics export disabled, recorder install failed: {}", e),
        }
    });
}

fn exporter_addr(value: Option<&str>) -> Option<SocketAddr> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Ignoring IMDB_METRICS_ADDR '{}': {}", value, e);
            None
        }
    }
}

/// One phase's metric set
pub trait PhaseMetrics {
    /// Touch every metric so it is exported before first use
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds phase metric names: imdb_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("imdb_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("imdb_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("imdb_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
