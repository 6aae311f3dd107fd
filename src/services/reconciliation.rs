use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};

use crate::models::report::ValidationResult;

/// Compares recomputed aggregates against the values the source document
/// reports. Mismatches are findings, never aborts; the one systematic error
/// worth auto-correcting is the extraction dropping a decimal separator,
/// which inflates the reported figure by exactly 100x.
pub struct ReconciliationEngine {
    pub tolerance: Decimal,
    ratio_min: Decimal,
    ratio_max: Decimal,
}

impl Default for ReconciliationEngine {
    fn default() -> ReconciliationEngine {
        ReconciliationEngine::new(dec!(0.01))
    }
}

impl ReconciliationEngine {
    pub fn new(tolerance: Decimal) -> ReconciliationEngine {
        ReconciliationEngine::with_band(tolerance, dec!(95), dec!(105))
    }

    pub fn with_band(
        tolerance: Decimal,
        ratio_min: Decimal,
        ratio_max: Decimal,
    ) -> ReconciliationEngine {
        ReconciliationEngine {
            tolerance,
            ratio_min,
            ratio_max,
        }
    }

    /// Checks one reported figure against its recomputed counterpart. The
    /// returned result carries the expected value after any 100x correction,
    /// so downstream totals can be rederived from corrected components.
    pub fn check(&self, field: &str, calculated: Decimal, reported: Decimal) -> ValidationResult {
        let mut expected = reported;
        let mut decimal_fix_applied = false;

        if (calculated - expected).abs() > self.tolerance && calculated != dec!(0) {
            let ratio = reported / calculated;
            if ratio >= self.ratio_min && ratio <= self.ratio_max {
                expected = reported / dec!(100);
                decimal_fix_applied = true;
                info!(
                    target: "reconciliation",
                    "Missing decimal separator in '{}': reported {} read as {}",
                    field, reported, expected
                );
            }
        }

        let matched = (calculated - expected).abs() <= self.tolerance;
        if !matched {
            warn!(
                target: "reconciliation",
                "'{}' does not reconcile: calculated {}, reported {}",
                field, calculated, expected
            );
        }

        ValidationResult {
            field: field.to_string(),
            calculated,
            expected,
            matched,
            tolerance: self.tolerance,
            decimal_fix_applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_within_tolerance() {
        let engine = ReconciliationEngine::default();
        let result = engine.check("ARS sales", dec!(130.00), dec!(130.005));
        assert!(result.matched);
        assert!(!result.decimal_fix_applied);
    }

    #[test]
    fn detects_and_corrects_a_dropped_decimal_separator() {
        let engine = ReconciliationEngine::default();
        // source reported 13000.00 where the true figure is 130.00
        let result = engine.check("ARS sales", dec!(130.00), dec!(13000.00));
        assert!(result.matched);
        assert!(result.decimal_fix_applied);
        assert_eq!(result.expected, dec!(130.00));
    }

    #[test]
    fn ratio_outside_the_band_stays_a_plain_mismatch() {
        let engine = ReconciliationEngine::default();
        let result = engine.check("ARS sales", dec!(130.00), dec!(17550.00));
        assert!(!result.matched);
        assert!(!result.decimal_fix_applied);
        assert_eq!(result.expected, dec!(17550.00));
    }

    #[test]
    fn near_but_not_exact_hundredfold_still_corrects() {
        let engine = ReconciliationEngine::default();
        // ratio 98.0 sits inside the 95..=105 detection band
        let result = engine.check("total", dec!(100.00), dec!(9800.00));
        assert!(result.decimal_fix_applied);
        assert_eq!(result.expected, dec!(98.00));
        // after the correction the figures still disagree, so it fails
        assert!(!result.matched);
    }

    #[test]
    fn zero_calculated_never_divides() {
        let engine = ReconciliationEngine::default();
        let result = engine.check("futures", dec!(0), dec!(0));
        assert!(result.matched);
        let result = engine.check("futures", dec!(0), dec!(100));
        assert!(!result.matched);
        assert!(!result.decimal_fix_applied);
    }
}
