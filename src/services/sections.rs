use tracing::warn;

use crate::models::schema::SectionKey;
use crate::models::transaction::ResultClass;

use super::parsers::{normalize_label, split_parenthetical};

/// Canonical label table, many-to-one. Keys are in normalized form (ASCII,
/// lowercase, single spaces); the variants cover both source formats plus the
/// spellings seen in extracted category rows.
const LABEL_TABLE: &[(&str, SectionKey)] = &[
    // ledger format
    ("resultado totales", SectionKey::Totals),
    ("resultados totales", SectionKey::Totals),
    ("tit.privados exentos", SectionKey::ExemptSecurities),
    ("tit privados exentos", SectionKey::ExemptSecurities),
    ("titulos privados exentos", SectionKey::ExemptSecurities),
    ("tit.privados del exterior", SectionKey::ForeignSecurities),
    ("tit privados del exterior", SectionKey::ForeignSecurities),
    ("titulos privados del exterior", SectionKey::ForeignSecurities),
    ("renta fija en pesos", SectionKey::FixedIncomeArs),
    ("renta fija pesos", SectionKey::FixedIncomeArs),
    ("renta fija en dolares", SectionKey::FixedIncomeUsd),
    ("renta fija dolares", SectionKey::FixedIncomeUsd),
    ("fci", SectionKey::Funds),
    ("fondos comunes de inversion", SectionKey::Funds),
    ("opciones", SectionKey::Options),
    ("futuros", SectionKey::Futures),
    ("cauciones en pesos", SectionKey::RepoArs),
    ("cauciones pesos", SectionKey::RepoArs),
    ("cauciones en dolares", SectionKey::RepoUsd),
    ("cauciones dolares", SectionKey::RepoUsd),
    ("posicion inicial", SectionKey::OpeningPosition),
    ("posicion final", SectionKey::ClosingPosition),
    // broker-summary format
    ("boletos", SectionKey::TradeTickets),
    ("resultado ventas ars", SectionKey::SaleResultsArs),
    ("resultado ventas pesos", SectionKey::SaleResultsArs),
    ("resultado ventas usd", SectionKey::SaleResultsUsd),
    ("resultado ventas dolares", SectionKey::SaleResultsUsd),
    ("rentas dividendos ars", SectionKey::IncomeArs),
    ("rentas y dividendos ars", SectionKey::IncomeArs),
    ("rentas dividendos usd", SectionKey::IncomeUsd),
    ("rentas y dividendos usd", SectionKey::IncomeUsd),
    ("resumen", SectionKey::Summary),
    ("posicion titulos", SectionKey::SecuritiesPosition),
];

/// Classifies free-text section and category labels onto canonical keys,
/// remembering every label it could not place for the run's coverage report.
#[derive(Debug, Default)]
pub struct SectionMapper {
    unmapped: Vec<String>,
}

impl SectionMapper {
    pub fn new() -> SectionMapper {
        SectionMapper::default()
    }

    /// Maps a section label (sheet-level) to its canonical key.
    pub fn map_label(&mut self, label: &str) -> SectionKey {
        let (base, _) = split_parenthetical(label);
        match lookup(&normalize_label(&base)) {
            Some(key) => key,
            None => {
                warn!(target: "sections", "Unmapped section label '{}'", label);
                self.unmapped.push(label.to_string());
                SectionKey::Unknown
            }
        }
    }

    /// Maps a totals-row category label, preserving the parenthetical
    /// qualifier ("CATEGORY (Enajenacion)") as a result-class hint.
    pub fn map_category(&mut self, label: &str) -> (SectionKey, Option<ResultClass>) {
        let (base, qualifier) = split_parenthetical(label);
        let hint = qualifier.as_deref().and_then(ResultClass::from_qualifier);
        match lookup(&normalize_label(&base)) {
            Some(key) => (key, hint),
            None => {
                self.unmapped.push(label.to_string());
                (SectionKey::Unknown, hint)
            }
        }
    }

    pub fn unmapped_labels(&self) -> &[String] {
        &self.unmapped
    }
}

fn lookup(normalized: &str) -> Option<SectionKey> {
    for (variant, key) in LABEL_TABLE {
        if *variant == normalized {
            return Some(*key);
        }
    }
    // containment fallback for labels carrying extra qualifiers; short table
    // keys are excluded to avoid accidental substring hits
    for (variant, key) in LABEL_TABLE {
        if variant.len() >= 4 && (normalized.contains(variant) || variant.contains(normalized)) {
            return Some(*key);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_accented_and_case_variants_to_one_key() {
        let mut mapper = SectionMapper::new();
        assert_eq!(
            mapper.map_label("RENTA FIJA EN DÓLARES"),
            SectionKey::FixedIncomeUsd
        );
        assert_eq!(
            mapper.map_label("renta fija en dolares"),
            SectionKey::FixedIncomeUsd
        );
        assert_eq!(
            mapper.map_label("Renta Fija Dolares"),
            SectionKey::FixedIncomeUsd
        );
        assert!(mapper.unmapped_labels().is_empty());
    }

    #[test]
    fn category_qualifier_becomes_result_class_hint() {
        let mut mapper = SectionMapper::new();
        let (key, hint) = mapper.map_category("TIT.PRIVADOS EXENTOS (Enajenacion)");
        assert_eq!(key, SectionKey::ExemptSecurities);
        assert_eq!(hint, Some(ResultClass::Disposal));

        let (key, hint) = mapper.map_category("TIT.PRIVADOS DEL EXTERIOR (Renta)");
        assert_eq!(key, SectionKey::ForeignSecurities);
        assert_eq!(hint, Some(ResultClass::Income));
    }

    #[test]
    fn unknown_labels_never_panic_and_are_recorded() {
        let mut mapper = SectionMapper::new();
        assert_eq!(mapper.map_label("HOJA MISTERIOSA"), SectionKey::Unknown);
        assert_eq!(mapper.map_label("HOJA MISTERIOSA"), SectionKey::Unknown);
        assert_eq!(mapper.unmapped_labels().len(), 2);
    }

    #[test]
    fn mapping_is_idempotent_over_known_variants() {
        let mut mapper = SectionMapper::new();
        for (variant, key) in LABEL_TABLE {
            assert_eq!(mapper.map_label(variant), *key);
            // mapping the canonical form again lands on the same key
            assert_eq!(mapper.map_label(&variant.to_uppercase()), *key);
        }
    }
}
