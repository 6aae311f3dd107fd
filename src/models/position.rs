use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use super::transaction::Currency;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnapshotKind {
    Opening,
    Closing,
}

/// One line of a position snapshot. Loaded once per run and immutable
/// afterwards; the cost-basis tracker reads opening rows to seed its state.
#[derive(Debug, Clone, Serialize)]
pub struct PositionRow {
    pub snapshot: SnapshotKind,
    pub code: String,
    pub category: String,
    pub name: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount_ars: Decimal,
    pub amount_usd: Decimal,
}

impl PositionRow {
    pub fn amount(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Ars => self.amount_ars,
            Currency::Usd => self.amount_usd,
        }
    }

    /// Unit price derived from the held amount; falls back to the reported
    /// price when the row carries no quantity.
    pub fn derived_unit_price(&self, currency: Currency) -> Decimal {
        if self.quantity == dec!(0) {
            return self.unit_price;
        }
        self.amount(currency) / self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(quantity: Decimal, amount_ars: Decimal) -> PositionRow {
        PositionRow {
            snapshot: SnapshotKind::Opening,
            code: "123".to_string(),
            category: "CEDEARS".to_string(),
            name: "CEDEAR APPLE INC.".to_string(),
            quantity,
            unit_price: dec!(10),
            amount_ars,
            amount_usd: dec!(0),
        }
    }

    #[test]
    fn unit_price_is_amount_over_quantity() {
        let position = row(dec!(4), dec!(100));
        assert_eq!(position.derived_unit_price(Currency::Ars), dec!(25));
    }

    #[test]
    fn zero_quantity_falls_back_to_reported_price() {
        let position = row(dec!(0), dec!(100));
        assert_eq!(position.derived_unit_price(Currency::Ars), dec!(10));
    }
}
