//! Checkpoint reading for resumable runs.
//!
//! The output CSV doubles as the checkpoint: every identifier present in its
//! `siren` column has already been enriched and is skipped on resume.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{info, warn};

use siren_enrich_shared::{EnrichError, Result, Siren};

/// Name of the identifier column in the output artifact.
const ID_COLUMN: &str = "siren";

/// True when `path` exists and is non-empty, i.e. a previous run wrote at least a header.
pub fn has_existing_output(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.len() > 0)
}

/// Read the identifiers already present in an output artifact.
///
/// A missing or zero-length file yields an empty set. Rows whose `siren`
/// value is not a valid identifier are ignored.
pub fn read_checkpoint(path: &Path) -> Result<HashSet<Siren>> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(EnrichError::io(path, e)),
    };
    if meta.len() == 0 {
        return Ok(HashSet::new());
    }

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| EnrichError::csv(path, e))?;

    let headers = rdr.headers().map_err(|e| EnrichError::csv(path, e))?;
    let column = headers
        .iter()
        .position(|h| h.trim() == ID_COLUMN)
        .ok_or_else(|| {
            EnrichError::validation(format!(
                "{} has no '{ID_COLUMN}' column; refusing to resume into it",
                path.display()
            ))
        })?;

    let mut done = HashSet::new();
    for record in rdr.records() {
        match record {
            Ok(record) => {
                if let Some(siren) = record.get(column).and_then(Siren::parse) {
                    done.insert(siren);
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint row"),
        }
    }

    info!(path = %path.display(), completed = done.len(), "checkpoint loaded");
    Ok(done)
}
