//! Identifier normalization: turn free-form rows into a deduplicated SIREN set.
//!
//! Strategies are tried in priority order; [`AnyField`] is the last-resort
//! fallback that scans every value of the row.

use std::collections::HashSet;

use tracing::debug;

use siren_enrich_shared::Siren;

use crate::reader::InputRow;

/// Identifier-bearing field names, in lookup order.
pub const KNOWN_FIELDS: [&str; 3] = ["siren", "siret", "registration_number"];

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One way of finding an identifier in a row.
pub trait ExtractionStrategy: Send + Sync {
    /// Return a candidate, or `None` to let the next strategy try.
    fn extract(&self, row: &InputRow) -> Option<Siren>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

/// Looks up well-known columns by name.
pub struct KnownFields {
    names: Vec<String>,
}

impl KnownFields {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for KnownFields {
    fn default() -> Self {
        Self::new(KNOWN_FIELDS)
    }
}

impl ExtractionStrategy for KnownFields {
    fn extract(&self, row: &InputRow) -> Option<Siren> {
        self.names
            .iter()
            .filter_map(|name| row.get(name))
            .find_map(Siren::from_registration_code)
    }

    fn name(&self) -> &str {
        "known-fields"
    }
}

/// Takes the first value of the row that carries at least nine digits.
pub struct AnyField;

impl ExtractionStrategy for AnyField {
    fn extract(&self, row: &InputRow) -> Option<Siren> {
        row.values().find_map(Siren::from_registration_code)
    }

    fn name(&self) -> &str {
        "any-field"
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Deduplicated identifiers resolved from a batch of rows.
#[derive(Debug, Clone, Default)]
pub struct TargetSet {
    /// Unique identifiers.
    pub sirens: HashSet<Siren>,
    /// Rows inspected.
    pub rows_read: usize,
    /// Rows that yielded no identifier.
    pub rows_without_identifier: usize,
}

impl TargetSet {
    /// Drop every identifier contained in `done`. Returns how many were removed.
    pub fn subtract(&mut self, done: &HashSet<Siren>) -> usize {
        let before = self.sirens.len();
        self.sirens.retain(|s| !done.contains(s));
        before - self.sirens.len()
    }

    pub fn len(&self) -> usize {
        self.sirens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sirens.is_empty()
    }
}

/// Holds extraction strategies in priority order.
pub struct Normalizer {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
}

impl Normalizer {
    /// Known columns first, then a scan of every value.
    pub fn new() -> Self {
        Self {
            strategies: vec![Box::new(KnownFields::default()), Box::new(AnyField)],
        }
    }

    /// Use a custom strategy list, tried in the given order.
    pub fn with_strategies(strategies: Vec<Box<dyn ExtractionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Resolve at most one identifier for a row.
    pub fn normalize(&self, row: &InputRow) -> Option<Siren> {
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.extract(row);
            if let Some(siren) = &found {
                debug!(strategy = strategy.name(), %siren, "identifier resolved");
            }
            found
        })
    }

    /// Normalize every row and deduplicate the result.
    pub fn collect_targets<'a>(&self, rows: impl IntoIterator<Item = &'a InputRow>) -> TargetSet {
        let mut targets = TargetSet::default();
        for row in rows {
            targets.rows_read += 1;
            match self.normalize(row) {
                Some(siren) => {
                    targets.sirens.insert(siren);
                }
                None => targets.rows_without_identifier += 1,
            }
        }
        targets
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}
