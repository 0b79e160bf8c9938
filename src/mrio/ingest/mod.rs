pub mod adapters;
pub mod config;
pub mod error;
pub mod io;
pub mod logging;
pub mod model;
pub mod provenance;
pub mod sniff;
pub mod transform;

pub use error::{IngestError, ParseWarning, Result};
