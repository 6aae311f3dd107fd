use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::{raw::SourceKind, schema::SectionKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Currency {
    Ars,
    Usd,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Ars => "ARS",
            Currency::Usd => "USD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    Buy,
    Sell,
    Exchange,
    Rent,
    Dividend,
    Amortization,
    Repo,
}

/// Qualifier carried by totals categories ("CATEGORY (Disposal)" vs
/// "CATEGORY (Income)") and needed for reconciliation tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResultClass {
    Disposal,
    Income,
}

impl OperationKind {
    /// Classifies a free-text operation label. Labels come from source
    /// documents in Spanish, with the usual abbreviations.
    pub fn from_label(label: &str) -> Option<OperationKind> {
        let normalized = deunicode::deunicode(label).to_lowercase();
        // income kinds first: "renta" is a substring of other labels
        if normalized.contains("dividendo") {
            return Some(OperationKind::Dividend);
        }
        if normalized.contains("renta") {
            return Some(OperationKind::Rent);
        }
        if normalized.contains("amortizacion") || normalized.contains("amort") {
            return Some(OperationKind::Amortization);
        }
        if normalized.contains("caucion") {
            return Some(OperationKind::Repo);
        }
        if normalized.contains("canje") {
            return Some(OperationKind::Exchange);
        }
        if normalized.contains("compra") || normalized.contains("cpra") {
            return Some(OperationKind::Buy);
        }
        if normalized.contains("venta") || normalized.contains("vta") {
            return Some(OperationKind::Sell);
        }
        None
    }

    pub fn result_class(&self) -> ResultClass {
        match self {
            OperationKind::Rent | OperationKind::Dividend => ResultClass::Income,
            OperationKind::Buy
            | OperationKind::Sell
            | OperationKind::Exchange
            | OperationKind::Amortization
            | OperationKind::Repo => ResultClass::Disposal,
        }
    }
}

impl ResultClass {
    pub fn from_qualifier(qualifier: &str) -> Option<ResultClass> {
        let normalized = deunicode::deunicode(qualifier).to_lowercase();
        if normalized.contains("enajenacion") || normalized.contains("disposal") {
            return Some(ResultClass::Disposal);
        }
        if normalized.contains("renta") || normalized.contains("income") {
            return Some(ResultClass::Income);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowKind {
    Detail,
    Subtotal,
    Total,
}

impl RowKind {
    pub fn from_label(label: &str) -> RowKind {
        let normalized = label.to_lowercase();
        if normalized.contains("subtotal") {
            return RowKind::Subtotal;
        }
        if normalized.contains("total") {
            return RowKind::Total;
        }
        RowKind::Detail
    }

    pub fn is_detail(&self) -> bool {
        matches!(self, RowKind::Detail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceOrigin {
    pub source: SourceKind,
    pub section: SectionKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub code: String,
    pub name: String,
    pub date: NaiveDate,
    pub operation: OperationKind,
    pub row_kind: RowKind,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub gross_amount: Decimal,
    pub expenses: Decimal,
    pub currency: Currency,
    pub origin: SourceOrigin,
}
