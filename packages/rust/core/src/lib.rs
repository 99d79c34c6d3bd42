//! Core orchestration for siren-enrich.
//!
//! This crate ties the input readers, page fetcher and record extractor into
//! one run ([`pipeline::run_enrichment`]), writes results through the
//! incremental [`sink::CsvSink`], and tracks background runs in a
//! [`registry::RunRegistry`].

pub mod pipeline;
pub mod registry;
pub mod sink;

pub use pipeline::{
    Failure, ProgressReporter, RunRequest, RunSummary, SilentProgress, run_enrichment,
};
pub use registry::{RunEntry, RunHandle, RunRegistry, RunStatus};
pub use sink::CsvSink;
