//! Shared types, error model, and configuration for siren-enrich.
//!
//! This crate is the foundation depended on by all other siren-enrich crates.
//! It provides:
//! - [`EnrichError`] — the unified error type
//! - Domain types ([`Siren`], [`CompanyRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`FetchConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FetchConfig, FetchSection, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{EnrichError, Result};
pub use types::{CompanyRecord, OUTPUT_COLUMNS, RunId, SIREN_LEN, Siren};
