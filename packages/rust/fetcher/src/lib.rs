//! Company page fetching and record extraction.
//!
//! This crate provides:
//! - [`fetcher`] — paced, per-worker HTTP fetcher for registry pages
//! - [`extractor`] — projection of the embedded JSON payload onto [`CompanyRecord`]
//!
//! [`CompanyRecord`]: siren_enrich_shared::CompanyRecord

pub mod extractor;
pub mod fetcher;

pub use extractor::{Extraction, extract_record, project_company};
pub use fetcher::PageFetcher;
