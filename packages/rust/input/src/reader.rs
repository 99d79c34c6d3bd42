//! CSV and JSON-lines input readers.
//!
//! Both formats are flattened into [`InputRow`]: an ordered list of
//! `(field, value)` pairs. No schema is enforced beyond what identifier
//! discovery needs.

use std::fs::File;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, instrument};

use siren_enrich_shared::{EnrichError, Result};

// ---------------------------------------------------------------------------
// InputRow
// ---------------------------------------------------------------------------

/// One input row as ordered `(field, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputRow {
    fields: Vec<(String, String)>,
}

impl InputRow {
    /// Build a row from pairs, keeping their order.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of the first field whose trimmed name matches `name`, ignoring ASCII case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values in row order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ---------------------------------------------------------------------------
// InputFormat
// ---------------------------------------------------------------------------

/// How to interpret an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// Decide from the extension, then from the first non-blank byte.
    #[default]
    Auto,
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON object per line.
    JsonLines,
}

impl InputFormat {
    /// Resolve `Auto` for a concrete file. `Csv` and `JsonLines` are returned unchanged.
    pub fn resolve(self, path: &Path) -> Result<Self> {
        if self != Self::Auto {
            return Ok(self);
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("csv") => return Ok(Self::Csv),
            Some("jsonl" | "ndjson" | "json") => return Ok(Self::JsonLines),
            _ => {}
        }

        let content = std::fs::read(path).map_err(|e| EnrichError::io(path, e))?;
        let first = content.iter().find(|b| !b.is_ascii_whitespace());
        Ok(if first == Some(&b'{') {
            Self::JsonLines
        } else {
            Self::Csv
        })
    }
}

impl std::str::FromStr for InputFormat {
    type Err = EnrichError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "csv" => Ok(Self::Csv),
            "jsonl" | "ndjson" | "json-lines" => Ok(Self::JsonLines),
            other => Err(EnrichError::validation(format!(
                "unknown input format '{other}': expected auto, csv, or jsonl"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Read every row of `path`. Malformed rows are skipped; an unreadable file is an error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_rows(path: &Path, format: InputFormat) -> Result<Vec<InputRow>> {
    let rows = match format.resolve(path)? {
        InputFormat::Csv => read_csv(path)?,
        InputFormat::JsonLines | InputFormat::Auto => read_json_lines(path)?,
    };

    info!(rows = rows.len(), "input rows loaded");
    Ok(rows)
}

fn read_csv(path: &Path) -> Result<Vec<InputRow>> {
    let file = File::open(path).map_err(|e| EnrichError::io(path, e))?;
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(file);

    let headers = rdr
        .headers()
        .map_err(|e| EnrichError::csv(path, e))?
        .clone();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        match record {
            Ok(record) => rows.push(InputRow::from_pairs(
                headers.iter().zip(record.iter()),
            )),
            Err(e) => debug!(line = line + 2, error = %e, "skipping unparseable CSV record"),
        }
    }
    Ok(rows)
}

fn read_json_lines(path: &Path) -> Result<Vec<InputRow>> {
    let content = std::fs::read(path).map_err(|e| EnrichError::io(path, e))?;

    let mut rows = Vec::new();
    for (line_no, raw) in content.split(|b| *b == b'\n').enumerate() {
        let Ok(line) = std::str::from_utf8(raw) else {
            debug!(line = line_no + 1, "skipping JSON line with invalid UTF-8");
            continue;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => rows.push(InputRow::from_pairs(
                map.into_iter()
                    .filter_map(|(k, v)| scalar_text(v).map(|text| (k, text))),
            )),
            Ok(_) => debug!(line = line_no + 1, "skipping non-object JSON line"),
            Err(e) => debug!(line = line_no + 1, error = %e, "skipping unparseable JSON line"),
        }
    }
    Ok(rows)
}

/// Text of a scalar JSON value; containers and null carry no identifier.
fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
