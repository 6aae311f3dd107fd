use owo_colors::OwoColorize;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{Table, Tabled};

/// One recomputed aggregate compared against the value the source reported.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct ValidationResult {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Calculated")]
    pub calculated: Decimal,
    #[tabled(rename = "Expected")]
    pub expected: Decimal,
    #[tabled(rename = "Match")]
    pub matched: bool,
    #[tabled(rename = "Tolerance")]
    pub tolerance: Decimal,
    #[tabled(rename = "100x Fix")]
    pub decimal_fix_applied: bool,
}

impl ValidationResult {
    pub fn difference(&self) -> Decimal {
        (self.calculated - self.expected).abs()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationReport {
    pub results: Vec<ValidationResult>,
}

impl ReconciliationReport {
    pub fn push(&mut self, result: ValidationResult) {
        self.results.push(result);
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|result| result.matched)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|result| result.matched).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.len() - self.passed_count()
    }

    pub fn print_report(&self) {
        println!("{}", Table::new(&self.results));
        let summary = format!(
            "{}/{} checks passed",
            self.passed_count(),
            self.results.len()
        );
        if self.all_passed() {
            println!("{}", summary.green());
        } else {
            println!("{}", summary.red());
        }
    }
}
