//! Company record extraction from the page's embedded Next.js payload.
//!
//! The registry renders company data server-side into
//! `<script id="__NEXT_DATA__">`. The company object sits at
//! `props.pageProps.pageData.entreprise`.

use scraper::{Html, Selector};
use serde_json::Value;

use siren_enrich_shared::CompanyRecord;

/// Element id of the script tag carrying the JSON payload.
pub const PAYLOAD_SCRIPT_ID: &str = "__NEXT_DATA__";

/// Path from the payload root to the company object.
pub const COMPANY_PATH: [&str; 4] = ["props", "pageProps", "pageData", "entreprise"];

/// Separator between officer names in the `dirigeants` column.
pub const OFFICER_SEPARATOR: &str = "; ";

/// Outcome of extracting a record from one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Payload found and projected. The record may be empty when the company
    /// object is missing from the payload.
    Record(CompanyRecord),
    /// No payload script in the page.
    NoPayload,
    /// Payload present but not valid JSON.
    Malformed(String),
}

/// Extract a [`CompanyRecord`] from a fetched page. Never fails.
///
/// The returned record's `siren` comes from the payload; callers stamp the
/// requested identifier with [`CompanyRecord::with_siren`].
pub fn extract_record(html: &str) -> Extraction {
    let Some(raw) = payload_text(html) else {
        return Extraction::NoPayload;
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(payload) => Extraction::Record(project_company(&payload)),
        Err(e) => Extraction::Malformed(e.to_string()),
    }
}

/// Project the payload onto the output schema. Missing path segments give an empty record.
pub fn project_company(payload: &Value) -> CompanyRecord {
    let company = COMPANY_PATH
        .iter()
        .try_fold(payload, |node, key| node.get(key));

    let Some(company) = company else {
        return CompanyRecord::default();
    };

    CompanyRecord {
        siren: text_at(company, "siren").unwrap_or_default(),
        legal_name: text_at(company, "nom_entreprise"),
        legal_form: text_at(company, "forme_juridique"),
        creation_date: text_at(company, "date_creation"),
        capital: text_at(company, "capital"),
        headcount: text_at(company, "effectif"),
        activity_code: text_at(company, "activite_principale"),
        office_address: company
            .get("siege")
            .and_then(|siege| text_at(siege, "adresse_complete")),
        officers: officer_names(company),
    }
}

fn payload_text(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse(&format!(r#"script[id="{PAYLOAD_SCRIPT_ID}"]"#)).ok()?;
    doc.select(&sel)
        .next()
        .map(|el| el.text().collect::<String>())
}

/// Text of a scalar field. Null, blank strings, and containers count as absent.
fn text_at(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Join officer names; entries without a name are skipped.
fn officer_names(company: &Value) -> Option<String> {
    let names: Vec<String> = company
        .get("dirigeants")?
        .as_array()?
        .iter()
        .filter_map(|officer| text_at(officer, "nom"))
        .collect();

    (!names.is_empty()).then(|| names.join(OFFICER_SEPARATOR))
}
