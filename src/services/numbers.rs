use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq)]
#[error("Malformed numeric token '{0}'")]
pub struct MalformedNumber(pub String);

/// Converts a locale-formatted numeric token into an exact decimal.
///
/// The sources disagree on conventions: the ledger format writes negatives
/// with a trailing minus ("5,212,573.58-"), the summary format wraps them in
/// parentheses ("(42.750,09)"), and both mix European and American grouping.
/// A blank token means an explicit zero, never an absent value.
pub fn normalize(token: &str) -> Result<Decimal, MalformedNumber> {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Ok(dec!(0));
    }

    let mut text = trimmed.to_string();
    let mut negative = false;

    if text.starts_with('(') && text.ends_with(')') && text.len() > 2 {
        text = text[1..text.len() - 1].trim().to_string();
        negative = !negative;
    }

    if let Some(stripped) = text.strip_suffix('-') {
        text = stripped.trim().to_string();
        negative = !negative;
    }

    let magnitude = parse_magnitude(&text).ok_or_else(|| MalformedNumber(token.to_string()))?;

    if negative {
        Ok(-magnitude)
    } else {
        Ok(magnitude)
    }
}

/// Recoverable-path wrapper: a malformed token becomes 0 with a warning so a
/// single bad cell never aborts the batch.
pub fn normalize_or_zero(token: &str) -> Decimal {
    match normalize(token) {
        Ok(value) => value,
        Err(error) => {
            warn!(target: "normalize", "{}, substituting 0", error);
            dec!(0)
        }
    }
}

fn parse_magnitude(text: &str) -> Option<Decimal> {
    if text.is_empty() {
        return None;
    }

    // plain token without grouping ambiguity
    if let Ok(value) = text.parse::<Decimal>() {
        return Some(value);
    }

    // whichever separator appears last is the radix point
    let last_comma = text.rfind(',');
    let last_period = text.rfind('.');

    let cleaned = match (last_comma, last_period) {
        (Some(comma), Some(period)) if comma > period => {
            text.replace('.', "").replace(',', ".")
        }
        (Some(_), None) if text.matches(',').count() == 1 => text.replace(',', "."),
        _ => text.replace(',', ""),
    };

    cleaned.parse::<Decimal>().ok()
}
