//! Input side of an enrichment run: reading rows, resolving identifiers,
//! and reading the checkpoint left by a previous run.
//!
//! Rows come from CSV or JSON-lines files and are handed to the
//! [`Normalizer`], which tries an ordered list of [`ExtractionStrategy`]
//! implementations and keeps the first SIREN found. The [`checkpoint`]
//! module reads an existing output file so resumed runs skip identifiers
//! already enriched.

pub mod checkpoint;
pub mod normalize;
pub mod reader;

pub use checkpoint::{has_existing_output, read_checkpoint};
pub use normalize::{AnyField, ExtractionStrategy, KNOWN_FIELDS, KnownFields, Normalizer, TargetSet};
pub use reader::{InputFormat, InputRow, read_rows};
