pub mod batch;
pub mod clean;
pub mod config;
pub mod constants;
pub mod error;
pub mod load;
pub mod logging;
pub mod metrics;
pub mod store;
pub mod tables;

pub use clean::{CleanReport, Cleaner};
pub use config::{Config, IntegrityPolicy};
pub use error::{PipelineError, Result};
pub use load::{LoadReport, Loader};
pub use store::{BulkStore, MemoryStore, PgStore};
