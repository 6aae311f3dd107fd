use anyhow::anyhow;
use chrono::NaiveDate;
use deunicode::deunicode;
use regex::Regex;

/// Trade dates arrive in whichever format the source document used.
pub fn parse_trade_date(date_str: &str) -> anyhow::Result<NaiveDate> {
    let formats = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d.%m.%Y", "%d/%m/%y"];
    let trimmed = date_str.trim();
    for format in formats.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date);
        }
    }
    Err(anyhow!("Unable to parse trade date '{}'", date_str))
}

/// Strips the currency-suffix phrases the summary format appends to
/// instrument names ("CEDEAR APPLE INC. - Pesos" -> "CEDEAR APPLE INC.").
pub fn clean_instrument_name(name: &str) -> String {
    let suffixes = [
        r"\s*-\s*Pesos\s*$",
        r"\s*-\s*Dolar\s+MEP\s*$",
        r"\s*-\s*Dólar\s+MEP\s*$",
        r"\s*-\s*Dolar\s+Cable\s*$",
        r"\s*-\s*Dólar\s+Cable\s*$",
        r"\s*-\s*USD\s*$",
        r"\s*-\s*ARS\s*$",
    ];

    let mut result = name.to_string();
    for suffix in suffixes.iter() {
        let regex = Regex::new(&format!("(?i){}", suffix)).unwrap();
        result = regex.replace(&result, "").to_string();
    }
    collapse_whitespace(result.trim())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Folds a free-text label to its comparison form: ASCII, lowercase, single
/// spaces. All label tables are keyed on this form.
pub fn normalize_label(label: &str) -> String {
    collapse_whitespace(&deunicode(label).to_lowercase())
}

/// Splits "CATEGORY (Qualifier)" into the base label and the qualifier.
pub fn split_parenthetical(label: &str) -> (String, Option<String>) {
    let regex = Regex::new(r"^(.+?)\s*\((.+?)\)\s*$").unwrap();
    match regex.captures(label.trim()) {
        Some(caps) => (
            caps[1].trim().to_string(),
            Some(caps[2].trim().to_string()),
        ),
        None => (label.trim().to_string(), None),
    }
}
