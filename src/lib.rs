pub mod adapters;
pub mod config;
pub mod constants;
pub mod error;
pub mod geocode;
pub mod logging;
pub mod metrics;
pub mod monitoring;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use error::{IngestError, Result};
pub use pipeline::{ImportOrchestrator, ImportReport};
pub use types::City;
