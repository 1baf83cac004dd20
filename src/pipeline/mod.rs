//! Ingestion stages, in the order a candidate passes through them.

pub mod validator;
pub mod dates;
pub mod venue;
pub mod category;
pub mod dedup;
pub mod engagement;
pub mod orchestrator;

pub use orchestrator::{ImportOptions, ImportOrchestrator, ImportPhase, ImportReport};
