//! Document sources for ingestion.

mod local;

pub use local::{LoadedDocuments, LocalSource};
