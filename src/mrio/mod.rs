pub mod ingest;

pub use ingest::{IngestError, Result};
