use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use crate::models::catalog::{InstrumentCatalogEntry, ReferenceCatalogs};

use super::parsers::{clean_instrument_name, collapse_whitespace};

/// How a canonical code was obtained. Carried on every resolved row so a
/// reviewer can tell a direct code from a fuzzy or fallback match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Provenance {
    Direct,
    Primary,
    Fuzzy,
    Fallback,
    ManualReview,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub code: Option<String>,
    pub provenance: Provenance,
    pub candidates: Vec<String>,
}

impl Resolution {
    fn found(code: String, provenance: Provenance) -> Resolution {
        Resolution {
            code: Some(code),
            provenance,
            candidates: Vec::new(),
        }
    }

    fn manual_review(candidates: Vec<String>) -> Resolution {
        Resolution {
            code: None,
            provenance: Provenance::ManualReview,
            candidates,
        }
    }
}

/// Extraction renders codes with spreadsheet artifacts ("5152.0") and stray
/// spaces.
pub fn clean_code(code: &str) -> String {
    let trimmed = code.trim().trim_end_matches(".0");
    trimmed.replace(' ', "")
}

/// All single-character 0<->O substitutions of a code, original first. OCR
/// confuses the two inside tickers (TLC1O vs TLC10), so lookups try every
/// variant before giving up.
pub fn code_variants(code: &str) -> Vec<String> {
    let upper = code.to_uppercase();
    let mut variants = vec![upper.clone()];

    for (position, character) in upper.char_indices() {
        let substitute = match character {
            '0' => 'O',
            'O' => '0',
            _ => continue,
        };
        let mut variant = upper.clone();
        variant.replace_range(position..position + 1, &substitute.to_string());
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }

    variants
}

pub struct EntityResolver<'a> {
    catalogs: &'a ReferenceCatalogs,
    period_codes: HashSet<String>,
}

impl<'a> EntityResolver<'a> {
    /// `period_codes` holds every code that appears as a transaction in the
    /// current period's detail; it breaks ties among equally-scored fuzzy
    /// candidates.
    pub fn new(catalogs: &'a ReferenceCatalogs, period_codes: HashSet<String>) -> EntityResolver<'a> {
        EntityResolver {
            catalogs,
            period_codes,
        }
    }

    pub fn resolve(
        &self,
        raw_code: &str,
        display_name: &str,
        category_hint: Option<&str>,
    ) -> Resolution {
        // 1. a code present on the record itself is trusted
        let cleaned_code = clean_code(raw_code);
        if !cleaned_code.is_empty() {
            return Resolution::found(cleaned_code, Provenance::Direct);
        }

        let normalized = collapse_whitespace(&clean_instrument_name(display_name)).to_uppercase();
        if normalized.is_empty() {
            return Resolution::manual_review(Vec::new());
        }

        // 2. exact normalized-name / ticker lookup in the primary catalog
        if let Some(entry) = exact_match(&self.catalogs.instruments, &normalized) {
            return Resolution::found(entry.code.clone(), Provenance::Primary);
        }

        // 3. scored containment match against primary catalog names
        match self.containment_match(&normalized, category_hint) {
            ContainmentOutcome::Single(code) => {
                return Resolution::found(code, Provenance::Fuzzy);
            }
            ContainmentOutcome::Ambiguous(candidates) => {
                warn!(
                    target: "resolver",
                    "Ambiguous match for '{}', flagging for manual review", display_name
                );
                return Resolution::manual_review(candidates);
            }
            ContainmentOutcome::None => {}
        }

        // 4. fallback catalog, for instruments with no activity in the period
        if let Some(entry) = exact_match(&self.catalogs.fallback_instruments, &normalized) {
            return Resolution::found(entry.code.clone(), Provenance::Fallback);
        }

        warn!(
            target: "resolver",
            "No catalog entry for '{}', flagging for manual review", display_name
        );
        Resolution::manual_review(Vec::new())
    }

    fn containment_match(
        &self,
        normalized: &str,
        category_hint: Option<&str>,
    ) -> ContainmentOutcome {
        let hint = category_hint.map(|hint| hint.trim().to_uppercase());

        let mut scored: Vec<(i64, &InstrumentCatalogEntry)> = Vec::new();
        for entry in &self.catalogs.instruments {
            if !entry.name.contains(normalized) && !normalized.contains(&entry.name) {
                continue;
            }
            let mut score = common_token_count(normalized, &entry.name);
            if let Some(ref hint) = hint {
                if entry.category.contains(hint.as_str()) || hint.contains(entry.category.as_str())
                {
                    score += 1;
                }
            }
            scored.push((score, entry));
        }

        let Some(best_score) = scored.iter().map(|(score, _)| *score).max() else {
            return ContainmentOutcome::None;
        };

        let best: Vec<&InstrumentCatalogEntry> = scored
            .into_iter()
            .filter(|(score, _)| *score == best_score)
            .map(|(_, entry)| entry)
            .collect();

        if best.len() == 1 {
            return ContainmentOutcome::Single(best[0].code.clone());
        }

        // tie-break: prefer the candidate that actually traded this period
        let active: Vec<&&InstrumentCatalogEntry> = best
            .iter()
            .filter(|entry| self.period_codes.contains(&entry.code))
            .collect();
        if active.len() == 1 {
            return ContainmentOutcome::Single(active[0].code.clone());
        }

        ContainmentOutcome::Ambiguous(best.iter().map(|entry| entry.code.clone()).collect())
    }
}

enum ContainmentOutcome {
    Single(String),
    Ambiguous(Vec<String>),
    None,
}

fn exact_match<'a>(
    entries: &'a [InstrumentCatalogEntry],
    normalized: &str,
) -> Option<&'a InstrumentCatalogEntry> {
    if let Some(entry) = entries.iter().find(|entry| entry.name == normalized) {
        return Some(entry);
    }
    for variant in code_variants(normalized) {
        if let Some(entry) = entries.iter().find(|entry| entry.ticker == variant) {
            return Some(entry);
        }
    }
    None
}

fn common_token_count(left: &str, right: &str) -> i64 {
    let left_tokens: HashSet<&str> = left.split_whitespace().collect();
    let right_tokens: HashSet<&str> = right.split_whitespace().collect();
    left_tokens.intersection(&right_tokens).count() as i64
}
