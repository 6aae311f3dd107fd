use serde::Serialize;

use super::transaction::Currency;

/// Canonical section keys. Every derived output table corresponds to exactly
/// one key; free-text labels from the source documents are folded onto these
/// by the section mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SectionKey {
    // ledger-format sections
    Totals,
    ExemptSecurities,
    ForeignSecurities,
    FixedIncomeArs,
    FixedIncomeUsd,
    Funds,
    Options,
    Futures,
    RepoArs,
    RepoUsd,
    OpeningPosition,
    ClosingPosition,
    // broker-summary-format sections
    TradeTickets,
    SaleResultsArs,
    SaleResultsUsd,
    IncomeArs,
    IncomeUsd,
    Summary,
    SecuritiesPosition,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionFamily {
    Totals,
    Trades,
    Repo,
    Position,
    Tickets,
    SaleResults,
    Income,
    Summary,
    Unknown,
}

impl SectionKey {
    pub fn family(&self) -> SectionFamily {
        match self {
            SectionKey::Totals => SectionFamily::Totals,
            SectionKey::ExemptSecurities
            | SectionKey::ForeignSecurities
            | SectionKey::FixedIncomeArs
            | SectionKey::FixedIncomeUsd
            | SectionKey::Funds
            | SectionKey::Options
            | SectionKey::Futures => SectionFamily::Trades,
            SectionKey::RepoArs | SectionKey::RepoUsd => SectionFamily::Repo,
            SectionKey::OpeningPosition
            | SectionKey::ClosingPosition
            | SectionKey::SecuritiesPosition => SectionFamily::Position,
            SectionKey::TradeTickets => SectionFamily::Tickets,
            SectionKey::SaleResultsArs | SectionKey::SaleResultsUsd => SectionFamily::SaleResults,
            SectionKey::IncomeArs | SectionKey::IncomeUsd => SectionFamily::Income,
            SectionKey::Summary => SectionFamily::Summary,
            SectionKey::Unknown => SectionFamily::Unknown,
        }
    }

    /// Fixed sections exist regardless of category detection: totals always
    /// lead a ledger document, position snapshots always close it. Category
    /// sections, by contrast, only exist when detected.
    pub fn is_fixed(&self) -> bool {
        matches!(
            self,
            SectionKey::Totals
                | SectionKey::Summary
                | SectionKey::OpeningPosition
                | SectionKey::ClosingPosition
                | SectionKey::SecuritiesPosition
        )
    }

    pub fn currency(&self) -> Option<Currency> {
        match self {
            SectionKey::FixedIncomeArs
            | SectionKey::RepoArs
            | SectionKey::SaleResultsArs
            | SectionKey::IncomeArs => Some(Currency::Ars),
            SectionKey::FixedIncomeUsd
            | SectionKey::RepoUsd
            | SectionKey::SaleResultsUsd
            | SectionKey::IncomeUsd => Some(Currency::Usd),
            _ => None,
        }
    }

    /// Fixed-income detail rows quote prices per 100 units of nominal value;
    /// those are rescaled to per-unit before cost-basis processing.
    pub fn price_quoted_per_hundred(&self) -> bool {
        matches!(self, SectionKey::FixedIncomeArs | SectionKey::FixedIncomeUsd)
    }

    pub fn numeric_fields(&self) -> &'static [&'static str] {
        match self.family() {
            SectionFamily::Totals => &["value_ars", "value_usd"],
            SectionFamily::Trades => &[
                "quantity",
                "price",
                "amount",
                "cost",
                "result_ars",
                "result_usd",
                "expenses_ars",
                "expenses_usd",
            ],
            SectionFamily::Repo => &[
                "placed",
                "at_maturity",
                "interest_ars",
                "interest_usd",
                "expenses_ars",
                "expenses_usd",
            ],
            SectionFamily::Position => &[
                "quantity",
                "price",
                "amount_ars",
                "share_ars",
                "amount_usd",
                "share_usd",
            ],
            SectionFamily::Tickets => &[
                "quantity",
                "price",
                "fx_rate",
                "gross",
                "interest",
                "expenses",
                "net",
            ],
            SectionFamily::SaleResults => &[
                "quantity",
                "price",
                "gross",
                "interest",
                "fx_rate",
                "expenses",
                "vat",
                "result",
            ],
            SectionFamily::Income => &["quantity", "fx_rate", "expenses", "amount"],
            SectionFamily::Summary => &[
                "sales",
                "funds",
                "options",
                "rent",
                "dividends",
                "bills",
                "notes",
                "futures",
                "repo_interest",
                "repo_fees",
                "total",
            ],
            SectionFamily::Unknown => &[],
        }
    }

    /// Composite business key used to drop duplicates introduced by
    /// overlapping extraction passes.
    pub fn dedup_keys(&self) -> &'static [&'static str] {
        match self.family() {
            SectionFamily::Trades => &["code", "date", "operation", "number", "quantity"],
            SectionFamily::Repo => &["code", "date", "maturity", "number"],
            SectionFamily::Position => &["name", "detail", "quantity"],
            SectionFamily::Tickets => &["ticket", "code", "quantity"],
            SectionFamily::SaleResults => &["name", "code", "date", "operation", "quantity"],
            SectionFamily::Income => &["name", "code", "date", "number"],
            SectionFamily::Totals | SectionFamily::Summary | SectionFamily::Unknown => &[],
        }
    }

    /// Grouping fields that appear only on the first row of a group in the
    /// ledger format and must be propagated forward.
    pub fn group_fields(&self) -> &'static [&'static str] {
        match self.family() {
            SectionFamily::Trades | SectionFamily::Repo => &["name", "code"],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sections_are_totals_summary_and_positions() {
        assert!(SectionKey::Totals.is_fixed());
        assert!(SectionKey::OpeningPosition.is_fixed());
        assert!(SectionKey::ClosingPosition.is_fixed());
        assert!(!SectionKey::ExemptSecurities.is_fixed());
        assert!(!SectionKey::RepoArs.is_fixed());
    }

    #[test]
    fn per_currency_sections_report_their_currency() {
        assert_eq!(SectionKey::SaleResultsArs.currency(), Some(Currency::Ars));
        assert_eq!(SectionKey::RepoUsd.currency(), Some(Currency::Usd));
        assert_eq!(SectionKey::Funds.currency(), None);
    }

    #[test]
    fn trade_sections_propagate_name_and_code() {
        assert_eq!(SectionKey::ExemptSecurities.group_fields(), ["name", "code"]);
        assert!(SectionKey::Summary.group_fields().is_empty());
    }
}
