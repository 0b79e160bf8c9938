//! Ingestion of multi-regional input-output (MRIO) releases.
//!
//! Each supported source family (EXIOBASE 1/2/3, WIOD, OECD-ICIO, Eora26,
//! THEMIS, Cecilia 2050) is parsed by an adapter under
//! [`mrio::ingest::adapters`] into one [`mrio::ingest::model::CanonicalSystem`]:
//! labelled matrices sharing a region/sector index, unit tables, extensions
//! and a [`mrio::ingest::provenance::ProvenanceLog`] of every file read and
//! every modification applied. Layout detection for delimited files lives in
//! [`mrio::ingest::sniff`], the supply-use conversion and Leontief inverse in
//! [`mrio::ingest::transform`].

pub mod mrio;

pub use mrio::ingest::{
    IngestError, ParseWarning, Result, adapters, config, error, io, logging, model, provenance,
    sniff, transform,
};
