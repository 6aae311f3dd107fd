use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::warn;

use crate::models::{
    catalog::ReferenceCatalogs,
    position::PositionRow,
    transaction::{Currency, OperationKind, Transaction},
};

use super::resolver::code_variants;

/// Where an instrument's opening cost state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CostSeed {
    OpeningSnapshot,
    InitialPriceCatalog,
    TransactionDerived,
}

#[derive(Debug, Clone)]
pub struct RunningStock {
    pub quantity: Decimal,
    pub avg_cost: Decimal,
    pub seed: CostSeed,
}

/// Realized result for one disposal, with the running state around it.
#[derive(Debug, Clone, Serialize)]
pub struct TradeResult {
    pub code: String,
    pub name: String,
    pub date: NaiveDate,
    pub currency: Currency,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    pub cost: Decimal,
    pub result: Decimal,
    pub opening_quantity: Decimal,
    pub opening_avg_cost: Decimal,
    pub closing_quantity: Decimal,
    pub closing_avg_cost: Decimal,
    pub cost_seed: CostSeed,
}

/// Maintains per-instrument running quantity and weighted-average unit cost
/// across a chronologically ordered transaction stream. One tracker per
/// currency per run; the stream order decides the outcome, so callers must
/// preserve original intra-day order.
pub struct CostBasisTracker<'a> {
    catalogs: &'a ReferenceCatalogs,
    opening: HashMap<String, (Decimal, Decimal)>,
    stocks: HashMap<String, RunningStock>,
}

impl<'a> CostBasisTracker<'a> {
    pub fn new(catalogs: &'a ReferenceCatalogs) -> CostBasisTracker<'a> {
        CostBasisTracker {
            catalogs,
            opening: HashMap::new(),
            stocks: HashMap::new(),
        }
    }

    /// Registers the period-opening snapshot. The first transaction touching
    /// an instrument picks its opening quantity and unit cost from here.
    pub fn seed_from_snapshot(&mut self, rows: &[PositionRow], currency: Currency) {
        for row in rows {
            if row.code.is_empty() || row.quantity == dec!(0) {
                continue;
            }
            self.opening.insert(
                row.code.clone(),
                (row.quantity, row.derived_unit_price(currency)),
            );
        }
    }

    pub fn stock(&self, code: &str) -> Option<&RunningStock> {
        self.stocks.get(code)
    }

    /// Advances the running state by one transaction. Returns a realized
    /// result for disposals, `None` otherwise.
    pub fn process(&mut self, transaction: &Transaction) -> Option<TradeResult> {
        if !transaction.row_kind.is_detail() {
            return None;
        }

        match transaction.operation {
            // income and amortization flows never touch the running state
            OperationKind::Rent | OperationKind::Dividend | OperationKind::Amortization => {
                return None;
            }
            // in-kind exchanges move quantity but keep the cost basis
            OperationKind::Exchange => {
                let stock = self.stock_entry(transaction);
                stock.quantity += transaction.quantity;
                return None;
            }
            OperationKind::Repo => return None,
            OperationKind::Buy | OperationKind::Sell => {}
        }

        let stock = self.stock_entry(transaction);
        let opening_quantity = stock.quantity;
        let opening_avg_cost = stock.avg_cost;
        let cost_seed = stock.seed;

        if transaction.quantity > dec!(0) {
            // acquisition: blend into the weighted average
            let previous_value = stock.quantity * stock.avg_cost;
            let acquired_value = transaction.quantity * transaction.unit_price;
            stock.quantity += transaction.quantity;
            if stock.quantity > dec!(0) {
                stock.avg_cost = (previous_value + acquired_value) / stock.quantity;
            }
            None
        } else if transaction.quantity < dec!(0) {
            // disposal: consume at the unchanged average cost
            let cost = transaction.quantity.abs() * stock.avg_cost;
            let proceeds = transaction.gross_amount - transaction.expenses;
            let result = if cost == dec!(0) {
                dec!(0)
            } else {
                proceeds.abs() - cost
            };

            stock.quantity += transaction.quantity;
            if stock.quantity < dec!(0) {
                warn!(
                    target: "cost_basis",
                    "Negative running stock for {} after {} ({} units), possible missing transactions",
                    transaction.code, transaction.date, stock.quantity
                );
            }

            Some(TradeResult {
                code: transaction.code.clone(),
                name: transaction.name.clone(),
                date: transaction.date,
                currency: transaction.currency,
                quantity: transaction.quantity,
                proceeds,
                cost,
                result,
                opening_quantity,
                opening_avg_cost,
                closing_quantity: stock.quantity,
                closing_avg_cost: stock.avg_cost,
                cost_seed,
            })
        } else {
            None
        }
    }

    fn stock_entry(&mut self, transaction: &Transaction) -> &mut RunningStock {
        let catalogs = self.catalogs;
        let opening = &self.opening;
        self.stocks
            .entry(transaction.code.clone())
            .or_insert_with(|| seed_stock(catalogs, opening, transaction))
    }
}

fn seed_stock(
    catalogs: &ReferenceCatalogs,
    opening: &HashMap<String, (Decimal, Decimal)>,
    transaction: &Transaction,
) -> RunningStock {
    if let Some((quantity, avg_cost)) = opening.get(&transaction.code) {
        return RunningStock {
            quantity: *quantity,
            avg_cost: *avg_cost,
            seed: CostSeed::OpeningSnapshot,
        };
    }
    if let Some(price) = initial_catalog_price(catalogs, transaction) {
        return RunningStock {
            quantity: dec!(0),
            avg_cost: price,
            seed: CostSeed::InitialPriceCatalog,
        };
    }
    RunningStock {
        quantity: dec!(0),
        avg_cost: dec!(0),
        seed: CostSeed::TransactionDerived,
    }
}

fn initial_catalog_price(catalogs: &ReferenceCatalogs, transaction: &Transaction) -> Option<Decimal> {
    for entry in catalogs.initial_prices.values() {
        if entry.code == transaction.code {
            return Some(entry.price);
        }
    }
    // ticker is the leading token of the ledger display name; try the
    // OCR 0<->O variants before giving up
    let ticker = transaction.name.split_whitespace().next()?;
    for variant in code_variants(ticker) {
        if let Some(price) = catalogs.initial_price(&variant) {
            return Some(price);
        }
    }
    None
}
