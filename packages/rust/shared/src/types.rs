//! Core domain types for siren-enrich runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EnrichError;

/// Number of digits in a SIREN.
pub const SIREN_LEN: usize = 9;

/// Output CSV columns, in order. Must match the serde names of [`CompanyRecord`].
pub const OUTPUT_COLUMNS: [&str; 9] = [
    "siren",
    "denomination",
    "forme_juridique",
    "date_creation",
    "capital",
    "effectif",
    "naf_code",
    "adresse_siege",
    "dirigeants",
];

// ---------------------------------------------------------------------------
// Siren
// ---------------------------------------------------------------------------

/// A canonical 9-digit business identifier.
///
/// Always exactly [`SIREN_LEN`] ASCII digits. Used as the dedup and checkpoint key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Siren(String);

impl Siren {
    /// Parse a value that must already be exactly nine digits (surrounding whitespace allowed).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.len() == SIREN_LEN && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(trimmed.to_string()))
        } else {
            None
        }
    }

    /// Derive a SIREN from a free-form registration code.
    ///
    /// Non-digit characters are stripped; the first nine remaining digits form
    /// the identifier. Returns `None` when fewer than nine digits remain.
    pub fn from_registration_code(raw: &str) -> Option<Self> {
        let digits: String = raw
            .chars()
            .filter(|c| c.is_ascii_digit())
            .take(SIREN_LEN)
            .collect();

        (digits.len() == SIREN_LEN).then_some(Self(digits))
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Siren {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Siren {
    type Err = EnrichError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
            .ok_or_else(|| EnrichError::validation(format!("'{s}' is not a 9-digit SIREN")))
    }
}

impl TryFrom<String> for Siren {
    type Error = EnrichError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Siren> for String {
    fn from(value: Siren) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// CompanyRecord
// ---------------------------------------------------------------------------

/// One enriched output row. Field order is the output column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// The identifier this row was fetched for.
    pub siren: String,
    /// Legal name.
    #[serde(rename = "denomination")]
    pub legal_name: Option<String>,
    /// Legal form (e.g. "SAS, société par actions simplifiée").
    #[serde(rename = "forme_juridique")]
    pub legal_form: Option<String>,
    /// Creation date as published by the registry.
    #[serde(rename = "date_creation")]
    pub creation_date: Option<String>,
    /// Share capital.
    pub capital: Option<String>,
    /// Headcount bracket.
    #[serde(rename = "effectif")]
    pub headcount: Option<String>,
    /// Primary activity (NAF) code.
    #[serde(rename = "naf_code")]
    pub activity_code: Option<String>,
    /// Registered-office address.
    #[serde(rename = "adresse_siege")]
    pub office_address: Option<String>,
    /// Officer names joined with `"; "`.
    #[serde(rename = "dirigeants")]
    pub officers: Option<String>,
}

impl CompanyRecord {
    /// True when no profile field was found. The identifier is not considered.
    pub fn is_empty(&self) -> bool {
        [
            &self.legal_name,
            &self.legal_form,
            &self.creation_date,
            &self.capital,
            &self.headcount,
            &self.activity_code,
            &self.office_address,
            &self.officers,
        ]
        .iter()
        .all(|field| field.is_none())
    }

    /// Stamp the row with the identifier it was requested for.
    pub fn with_siren(mut self, siren: &Siren) -> Self {
        self.siren = siren.to_string();
        self
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
