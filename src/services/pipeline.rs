use std::collections::HashSet;

use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{
    catalog::{parse_currency, ReferenceCatalogs},
    position::{PositionRow, SnapshotKind},
    raw::{field, RawDocument, RawRecord, SourceKind},
    report::ReconciliationReport,
    schema::{SectionFamily, SectionKey},
    transaction::{Currency, OperationKind, ResultClass, RowKind, SourceOrigin, Transaction},
};

use super::{
    cost_basis::{CostBasisTracker, TradeResult},
    dedup::{deduplicate_records, remove_empty_records},
    numbers::normalize_or_zero,
    parsers::{clean_instrument_name, normalize_label, parse_trade_date},
    reconciliation::ReconciliationEngine,
    resolver::EntityResolver,
    sections::SectionMapper,
    stitch::{stitch_section, StitchState},
};

/// Errors that abort a run. Everything else is a logged finding and the
/// pipeline keeps going.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("Unrecognized source format: {0}")]
    UnrecognizedFormat(String),
    #[error("No sections detected in the source documents")]
    NoSectionsDetected,
    #[error("Reference catalog missing or empty: {0}")]
    MissingCatalog(String),
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tolerance: Decimal,
    pub ratio_min: Decimal,
    pub ratio_max: Decimal,
}

impl Default for PipelineConfig {
    fn default() -> PipelineConfig {
        PipelineConfig {
            tolerance: dec!(0.01),
            ratio_min: dec!(95),
            ratio_max: dec!(105),
        }
    }
}

/// Ledger trade detail row: the transaction plus the per-currency result
/// columns the ledger reports for it (needed to reconcile the totals block).
#[derive(Debug, Clone, Serialize)]
pub struct LedgerTrade {
    pub transaction: Transaction,
    pub result_ars: Decimal,
    pub result_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoRow {
    pub section: SectionKey,
    pub code: String,
    pub name: String,
    pub date: NaiveDate,
    pub maturity: Option<NaiveDate>,
    pub placed: Decimal,
    pub at_maturity: Decimal,
    pub interest_ars: Decimal,
    pub interest_usd: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsRow {
    pub label: String,
    pub key: SectionKey,
    pub class: Option<ResultClass>,
    pub value_ars: Decimal,
    pub value_usd: Decimal,
    pub grand_total: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleResultRow {
    pub code: String,
    pub name: String,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub gross: Decimal,
    pub expenses: Decimal,
    pub vat: Decimal,
    pub result: Decimal,
    pub fx_rate: Decimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomeRow {
    pub code: String,
    pub name: String,
    pub date: NaiveDate,
    pub category: String,
    pub amount: Decimal,
    pub fx_rate: Decimal,
    pub currency: Currency,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub currency: Currency,
    pub sales: Decimal,
    pub funds: Decimal,
    pub options: Decimal,
    pub rent: Decimal,
    pub dividends: Decimal,
    pub bills: Decimal,
    pub notes: Decimal,
    pub futures: Decimal,
    pub repo_interest: Decimal,
    pub repo_fees: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualReviewFlag {
    pub name: String,
    pub candidates: Vec<String>,
}

/// Every derived table of one run, materialized together at the end.
#[derive(Debug, Default, Serialize)]
pub struct DerivedTables {
    pub opening_positions: Vec<PositionRow>,
    pub closing_positions: Vec<PositionRow>,
    pub transactions: Vec<Transaction>,
    pub results_ars: Vec<TradeResult>,
    pub results_usd: Vec<TradeResult>,
    pub repos: Vec<RepoRow>,
    pub sale_results: Vec<SaleResultRow>,
    pub income: Vec<IncomeRow>,
    pub summary: Vec<SummaryRow>,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub tables: DerivedTables,
    pub report: ReconciliationReport,
    pub unmapped_labels: Vec<String>,
    pub manual_review: Vec<ManualReviewFlag>,
}

/// Runs the whole reconciliation pipeline over one document pair. The two
/// documents may arrive in either order; their formats are detected from the
/// section labels, not trusted from the caller.
pub fn run(
    first: RawDocument,
    second: RawDocument,
    catalogs: &ReferenceCatalogs,
    config: &PipelineConfig,
) -> anyhow::Result<RunOutput> {
    if first.sections.is_empty() && second.sections.is_empty() {
        return Err(FatalError::NoSectionsDetected.into());
    }

    let (ledger, summary) = pair_documents(first, second)?;

    let mut mapper = SectionMapper::new();
    let ledger_sections = clean_sections(&ledger, &mut mapper);
    let summary_sections = clean_sections(&summary, &mut mapper);

    let mut tables = DerivedTables::default();
    let mut totals_rows = Vec::new();
    let mut trades = Vec::new();

    for (key, records) in &ledger_sections {
        match key.family() {
            SectionFamily::Totals => {
                totals_rows.extend(build_totals_rows(records, &mut mapper));
            }
            SectionFamily::Trades => {
                trades.extend(build_trades(*key, records));
            }
            SectionFamily::Repo => {
                tables.repos.extend(build_repo_rows(*key, records));
            }
            SectionFamily::Position => {
                let snapshot = match key {
                    SectionKey::OpeningPosition => SnapshotKind::Opening,
                    _ => SnapshotKind::Closing,
                };
                let rows = build_position_rows(snapshot, records);
                match snapshot {
                    SnapshotKind::Opening => tables.opening_positions.extend(rows),
                    SnapshotKind::Closing => tables.closing_positions.extend(rows),
                }
            }
            _ => {}
        }
    }

    let mut ticket_transactions = Vec::new();
    for (key, records) in &summary_sections {
        match key.family() {
            SectionFamily::Tickets => {
                ticket_transactions.extend(build_ticket_transactions(*key, records));
            }
            SectionFamily::SaleResults => {
                tables
                    .sale_results
                    .extend(build_sale_results(*key, records, catalogs));
            }
            SectionFamily::Income => {
                tables
                    .income
                    .extend(build_income_rows(*key, records, catalogs));
            }
            SectionFamily::Summary => {
                tables.summary.extend(build_summary_rows(records));
            }
            SectionFamily::Position => {
                tables
                    .closing_positions
                    .extend(build_position_rows(SnapshotKind::Closing, records));
            }
            _ => {}
        }
    }

    // canonical codes before any per-instrument state is built
    let mut manual_review = Vec::new();
    resolve_entities(
        catalogs,
        &mut trades,
        &mut ticket_transactions,
        &mut tables,
        &mut manual_review,
    )?;

    // cost basis runs off the ledger detail; the broker summary only stands
    // in when the ledger carried no trades at all
    let mut transactions: Vec<Transaction> = trades
        .iter()
        .map(|trade| trade.transaction.clone())
        .chain(ticket_transactions)
        .collect();
    transactions.sort_by_key(|transaction| transaction.date);

    let basis_source = if trades.is_empty() {
        SourceKind::BrokerSummary
    } else {
        SourceKind::Ledger
    };

    let mut tracker_ars = CostBasisTracker::new(catalogs);
    let mut tracker_usd = CostBasisTracker::new(catalogs);
    tracker_ars.seed_from_snapshot(&tables.opening_positions, Currency::Ars);
    tracker_usd.seed_from_snapshot(&tables.opening_positions, Currency::Usd);

    for transaction in &transactions {
        if transaction.origin.source != basis_source {
            continue;
        }
        let tracker = match transaction.currency {
            Currency::Ars => &mut tracker_ars,
            Currency::Usd => &mut tracker_usd,
        };
        if let Some(result) = tracker.process(transaction) {
            match transaction.currency {
                Currency::Ars => tables.results_ars.push(result),
                Currency::Usd => tables.results_usd.push(result),
            }
        }
    }

    let instrument_count = transactions
        .iter()
        .map(|transaction| transaction.code.as_str())
        .filter(|code| !code.is_empty())
        .unique()
        .count();
    info!(
        target: "pipeline",
        "Processed {} transactions across {} instruments",
        transactions.len(),
        instrument_count
    );
    tables.transactions = transactions;

    let engine = ReconciliationEngine::with_band(config.tolerance, config.ratio_min, config.ratio_max);
    let mut report = ReconciliationReport::default();
    check_ledger_totals(&engine, &mut report, &totals_rows, &trades, &tables.repos);
    check_summary(&engine, &mut report, &tables);

    Ok(RunOutput {
        tables,
        report,
        unmapped_labels: mapper.unmapped_labels().to_vec(),
        manual_review,
    })
}

fn pair_documents(
    first: RawDocument,
    second: RawDocument,
) -> Result<(RawDocument, RawDocument), FatalError> {
    match (detect_source_kind(&first)?, detect_source_kind(&second)?) {
        (SourceKind::Ledger, SourceKind::BrokerSummary) => Ok((first, second)),
        (SourceKind::BrokerSummary, SourceKind::Ledger) => Ok((second, first)),
        (kind, _) => Err(FatalError::UnrecognizedFormat(format!(
            "expected one ledger and one broker summary document, got two {:?} documents",
            kind
        ))),
    }
}

/// Detects which known schema a document follows by classifying its section
/// labels; the `source` tag the extraction collaborator sent is not trusted.
pub fn detect_source_kind(document: &RawDocument) -> Result<SourceKind, FatalError> {
    if document.sections.is_empty() {
        return Err(FatalError::NoSectionsDetected);
    }

    let mut probe = SectionMapper::new();
    let mut ledger_hits = 0;
    let mut summary_hits = 0;
    for section in &document.sections {
        match probe.map_label(&section.label).family() {
            SectionFamily::Totals | SectionFamily::Trades | SectionFamily::Repo => ledger_hits += 1,
            SectionFamily::Tickets
            | SectionFamily::SaleResults
            | SectionFamily::Income
            | SectionFamily::Summary => summary_hits += 1,
            SectionFamily::Position | SectionFamily::Unknown => {}
        }
    }

    if ledger_hits == 0 && summary_hits == 0 {
        return Err(FatalError::UnrecognizedFormat(format!(
            "no known section labels in document tagged {:?}",
            document.source
        )));
    }
    if ledger_hits >= summary_hits {
        Ok(SourceKind::Ledger)
    } else {
        Ok(SourceKind::BrokerSummary)
    }
}

/// Per-section cleanup: merge chunks sharing a key (page splits), drop blank
/// rows, dedup on the family's composite key, stitch grouping fields, then
/// rewrite every numeric cell to canonical form.
fn clean_sections(
    document: &RawDocument,
    mapper: &mut SectionMapper,
) -> Vec<(SectionKey, Vec<RawRecord>)> {
    let mut merged: Vec<(SectionKey, Vec<RawRecord>)> = Vec::new();
    for section in &document.sections {
        let key = mapper.map_label(&section.label);
        match merged.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, records)) => records.extend(section.records.clone()),
            None => merged.push((key, section.records.clone())),
        }
    }

    merged
        .into_iter()
        .map(|(key, records)| {
            let mut records = remove_empty_records(records);
            records = deduplicate_records(records, key.dedup_keys());
            let group_fields = key.group_fields();
            if !group_fields.is_empty() {
                let mut state = StitchState::new();
                stitch_section(&mut records, group_fields, &mut state);
            }
            for record in &mut records {
                for field_name in key.numeric_fields() {
                    if let Some(value) = record.get_mut(*field_name) {
                        *value = normalize_or_zero(value).to_string();
                    }
                }
            }
            (key, records)
        })
        .collect()
}

fn build_totals_rows(records: &[RawRecord], mapper: &mut SectionMapper) -> Vec<TotalsRow> {
    let mut rows = Vec::new();
    for record in records {
        let label = field(record, "category").trim().to_string();
        if label.is_empty() {
            continue;
        }
        let grand_total = normalize_label(&label).contains("total general");
        let (key, class) = if grand_total {
            (SectionKey::Unknown, None)
        } else {
            mapper.map_category(&label)
        };
        rows.push(TotalsRow {
            label,
            key,
            class,
            value_ars: normalize_or_zero(field(record, "value_ars")),
            value_usd: normalize_or_zero(field(record, "value_usd")),
            grand_total,
        });
    }
    rows
}

fn build_trades(key: SectionKey, records: &[RawRecord]) -> Vec<LedgerTrade> {
    let mut trades = Vec::new();
    for record in records {
        if !RowKind::from_label(field(record, "row_kind")).is_detail() {
            continue;
        }
        let operation_label = field(record, "operation");
        let Some(operation) = OperationKind::from_label(operation_label) else {
            warn!(target: "pipeline", "Skipping row with unknown operation '{}'", operation_label);
            continue;
        };
        let Ok(date) = parse_trade_date(field(record, "date")) else {
            warn!(target: "pipeline", "Skipping row with unparseable date '{}'", field(record, "date"));
            continue;
        };

        let quantity = signed_quantity(operation, normalize_or_zero(field(record, "quantity")));
        let mut unit_price = normalize_or_zero(field(record, "price"));
        if key.price_quoted_per_hundred() {
            // fixed-income prices quote per 100 units of nominal value
            unit_price /= dec!(100);
        }
        let currency = key.currency().unwrap_or(Currency::Ars);
        let expenses = match currency {
            Currency::Ars => normalize_or_zero(field(record, "expenses_ars")),
            Currency::Usd => normalize_or_zero(field(record, "expenses_usd")),
        };

        trades.push(LedgerTrade {
            transaction: Transaction {
                code: field(record, "code").trim().to_string(),
                name: clean_instrument_name(field(record, "name")),
                date,
                operation,
                row_kind: RowKind::Detail,
                quantity,
                unit_price,
                gross_amount: normalize_or_zero(field(record, "amount")),
                expenses,
                currency,
                origin: SourceOrigin {
                    source: SourceKind::Ledger,
                    section: key,
                },
            },
            result_ars: normalize_or_zero(field(record, "result_ars")),
            result_usd: normalize_or_zero(field(record, "result_usd")),
        });
    }
    trades
}

fn signed_quantity(operation: OperationKind, quantity: Decimal) -> Decimal {
    match operation {
        OperationKind::Sell => -quantity.abs(),
        OperationKind::Buy => quantity.abs(),
        _ => quantity,
    }
}

fn build_repo_rows(key: SectionKey, records: &[RawRecord]) -> Vec<RepoRow> {
    let mut rows = Vec::new();
    for record in records {
        if !RowKind::from_label(field(record, "row_kind")).is_detail() {
            continue;
        }
        let Ok(date) = parse_trade_date(field(record, "date")) else {
            warn!(target: "pipeline", "Skipping repo row with unparseable date '{}'", field(record, "date"));
            continue;
        };
        rows.push(RepoRow {
            section: key,
            code: field(record, "code").trim().to_string(),
            name: clean_instrument_name(field(record, "name")),
            date,
            maturity: parse_trade_date(field(record, "maturity")).ok(),
            placed: normalize_or_zero(field(record, "placed")),
            at_maturity: normalize_or_zero(field(record, "at_maturity")),
            interest_ars: normalize_or_zero(field(record, "interest_ars")),
            interest_usd: normalize_or_zero(field(record, "interest_usd")),
        });
    }
    rows
}

fn build_position_rows(snapshot: SnapshotKind, records: &[RawRecord]) -> Vec<PositionRow> {
    let mut rows = Vec::new();
    for record in records {
        if !RowKind::from_label(field(record, "row_kind")).is_detail() {
            continue;
        }
        let name = clean_instrument_name(field(record, "name"));
        if name.is_empty() {
            continue;
        }
        rows.push(PositionRow {
            snapshot,
            code: field(record, "code").trim().to_string(),
            category: field(record, "category").trim().to_string(),
            name,
            quantity: normalize_or_zero(field(record, "quantity")),
            unit_price: normalize_or_zero(field(record, "price")),
            amount_ars: normalize_or_zero(field(record, "amount_ars")),
            amount_usd: normalize_or_zero(field(record, "amount_usd")),
        });
    }
    rows
}

fn build_ticket_transactions(key: SectionKey, records: &[RawRecord]) -> Vec<Transaction> {
    let mut transactions = Vec::new();
    for record in records {
        if !RowKind::from_label(field(record, "row_kind")).is_detail() {
            continue;
        }
        let Some(operation) = OperationKind::from_label(field(record, "operation")) else {
            continue;
        };
        let Ok(date) = parse_trade_date(field(record, "date")) else {
            continue;
        };
        transactions.push(Transaction {
            code: field(record, "code").trim().to_string(),
            name: clean_instrument_name(field(record, "name")),
            date,
            operation,
            row_kind: RowKind::Detail,
            quantity: signed_quantity(operation, normalize_or_zero(field(record, "quantity"))),
            unit_price: normalize_or_zero(field(record, "price")),
            gross_amount: normalize_or_zero(field(record, "gross")),
            expenses: normalize_or_zero(field(record, "expenses")),
            currency: parse_currency(field(record, "currency")),
            origin: SourceOrigin {
                source: SourceKind::BrokerSummary,
                section: key,
            },
        });
    }
    transactions
}

fn build_sale_results(
    key: SectionKey,
    records: &[RawRecord],
    catalogs: &ReferenceCatalogs,
) -> Vec<SaleResultRow> {
    let currency = key.currency().unwrap_or(Currency::Ars);
    let mut rows = Vec::new();
    for record in records {
        if !RowKind::from_label(field(record, "row_kind")).is_detail() {
            continue;
        }
        let Ok(date) = parse_trade_date(field(record, "date")) else {
            continue;
        };
        rows.push(SaleResultRow {
            code: field(record, "code").trim().to_string(),
            name: clean_instrument_name(field(record, "name")),
            date,
            quantity: normalize_or_zero(field(record, "quantity")),
            gross: normalize_or_zero(field(record, "gross")),
            expenses: normalize_or_zero(field(record, "expenses")),
            vat: normalize_or_zero(field(record, "vat")),
            result: normalize_or_zero(field(record, "result")),
            fx_rate: row_fx_rate(record, date, currency, catalogs),
            currency,
        });
    }
    rows
}

fn build_income_rows(
    key: SectionKey,
    records: &[RawRecord],
    catalogs: &ReferenceCatalogs,
) -> Vec<IncomeRow> {
    let currency = key.currency().unwrap_or(Currency::Ars);
    let mut rows = Vec::new();
    for record in records {
        if !RowKind::from_label(field(record, "row_kind")).is_detail() {
            continue;
        }
        let Ok(date) = parse_trade_date(field(record, "date")) else {
            continue;
        };
        rows.push(IncomeRow {
            code: field(record, "code").trim().to_string(),
            name: clean_instrument_name(field(record, "name")),
            date,
            category: field(record, "category").trim().to_string(),
            amount: normalize_or_zero(field(record, "amount")),
            fx_rate: row_fx_rate(record, date, currency, catalogs),
            currency,
        });
    }
    rows
}

/// The summary format reports a per-row exchange rate; when the cell is blank
/// the dated quote table stands in.
fn row_fx_rate(
    record: &RawRecord,
    date: NaiveDate,
    currency: Currency,
    catalogs: &ReferenceCatalogs,
) -> Decimal {
    let reported = normalize_or_zero(field(record, "fx_rate"));
    if reported != dec!(0) {
        return reported;
    }
    catalogs.quote_for(date, currency)
}

fn build_summary_rows(records: &[RawRecord]) -> Vec<SummaryRow> {
    records
        .iter()
        .map(|record| SummaryRow {
            currency: parse_currency(field(record, "currency")),
            sales: normalize_or_zero(field(record, "sales")),
            funds: normalize_or_zero(field(record, "funds")),
            options: normalize_or_zero(field(record, "options")),
            rent: normalize_or_zero(field(record, "rent")),
            dividends: normalize_or_zero(field(record, "dividends")),
            bills: normalize_or_zero(field(record, "bills")),
            notes: normalize_or_zero(field(record, "notes")),
            futures: normalize_or_zero(field(record, "futures")),
            repo_interest: normalize_or_zero(field(record, "repo_interest")),
            repo_fees: normalize_or_zero(field(record, "repo_fees")),
            total: normalize_or_zero(field(record, "total")),
        })
        .collect()
}

fn resolve_entities(
    catalogs: &ReferenceCatalogs,
    trades: &mut [LedgerTrade],
    ticket_transactions: &mut [Transaction],
    tables: &mut DerivedTables,
    manual_review: &mut Vec<ManualReviewFlag>,
) -> Result<(), FatalError> {
    let needs_resolution = trades
        .iter()
        .any(|trade| trade.transaction.code.trim().is_empty())
        || ticket_transactions
            .iter()
            .any(|transaction| transaction.code.trim().is_empty())
        || tables
            .opening_positions
            .iter()
            .chain(&tables.closing_positions)
            .any(|row| row.code.trim().is_empty());
    if needs_resolution && catalogs.instruments.is_empty() {
        return Err(FatalError::MissingCatalog("instrument catalog".to_string()));
    }

    // every code seen on period detail, from either source document; used by
    // the resolver to break ties among equally-scored fuzzy candidates
    let period_codes: HashSet<String> = trades
        .iter()
        .map(|trade| trade.transaction.code.trim().to_string())
        .chain(
            ticket_transactions
                .iter()
                .map(|transaction| transaction.code.trim().to_string()),
        )
        .filter(|code| !code.is_empty())
        .collect();
    let resolver = EntityResolver::new(catalogs, period_codes);

    let mut resolve_code = |code: &mut String, name: &str, hint: Option<&str>| {
        let resolution = resolver.resolve(code, name, hint);
        match resolution.code {
            Some(resolved) => *code = resolved,
            None => manual_review.push(ManualReviewFlag {
                name: name.to_string(),
                candidates: resolution.candidates,
            }),
        }
    };

    for trade in trades.iter_mut() {
        resolve_code(&mut trade.transaction.code, &trade.transaction.name, None);
    }
    for transaction in ticket_transactions.iter_mut() {
        resolve_code(&mut transaction.code, &transaction.name, None);
    }
    for row in tables
        .opening_positions
        .iter_mut()
        .chain(tables.closing_positions.iter_mut())
    {
        resolve_code(&mut row.code, &row.name, Some(&row.category));
    }
    for row in tables.sale_results.iter_mut() {
        resolve_code(&mut row.code, &row.name, None);
    }
    for row in tables.income.iter_mut() {
        resolve_code(&mut row.code, &row.name, None);
    }
    Ok(())
}

/// Reconciles the ledger's totals block: every category row against the
/// filtered sum of its section's detail, then the grand-total row against the
/// per-category calculated values.
fn check_ledger_totals(
    engine: &ReconciliationEngine,
    report: &mut ReconciliationReport,
    totals_rows: &[TotalsRow],
    trades: &[LedgerTrade],
    repos: &[RepoRow],
) {
    let mut grand_ars = dec!(0);
    let mut grand_usd = dec!(0);
    let mut checked_any = false;

    for row in totals_rows.iter().filter(|row| !row.grand_total) {
        let (calculated_ars, calculated_usd) = match row.key.family() {
            SectionFamily::Trades => trade_result_sums(trades, row.key, row.class),
            SectionFamily::Repo => repo_interest_sums(repos, row.key),
            _ => {
                warn!(target: "pipeline", "No detail section for totals category '{}'", row.label);
                continue;
            }
        };
        grand_ars += calculated_ars;
        grand_usd += calculated_usd;
        checked_any = true;
        report.push(engine.check(&format!("{} ARS", row.label), calculated_ars, row.value_ars));
        report.push(engine.check(&format!("{} USD", row.label), calculated_usd, row.value_usd));
    }

    if checked_any {
        for row in totals_rows.iter().filter(|row| row.grand_total) {
            report.push(engine.check(&format!("{} ARS", row.label), grand_ars, row.value_ars));
            report.push(engine.check(&format!("{} USD", row.label), grand_usd, row.value_usd));
        }
    }
}

fn trade_result_sums(
    trades: &[LedgerTrade],
    section: SectionKey,
    class: Option<ResultClass>,
) -> (Decimal, Decimal) {
    let mut ars = dec!(0);
    let mut usd = dec!(0);
    for trade in trades {
        if trade.transaction.origin.section != section {
            continue;
        }
        if let Some(class) = class {
            if trade.transaction.operation.result_class() != class {
                continue;
            }
        }
        ars += trade.result_ars;
        usd += trade.result_usd;
    }
    (ars, usd)
}

fn repo_interest_sums(repos: &[RepoRow], section: SectionKey) -> (Decimal, Decimal) {
    let mut ars = dec!(0);
    let mut usd = dec!(0);
    for row in repos.iter().filter(|row| row.section == section) {
        ars += row.interest_ars;
        usd += row.interest_usd;
    }
    (ars, usd)
}

/// Reconciles the broker summary sheet: each component column against its
/// detail table, then the total column against the components, rederived from
/// the corrected values so one 100x fix does not cascade into a false
/// total mismatch.
fn check_summary(
    engine: &ReconciliationEngine,
    report: &mut ReconciliationReport,
    tables: &DerivedTables,
) {
    for row in &tables.summary {
        let code = row.currency.code();

        let sales_calculated: Decimal = tables
            .sale_results
            .iter()
            .filter(|result| result.currency == row.currency)
            .map(|result| result.result)
            .sum();
        let rent_calculated = income_sum(&tables.income, row.currency, "renta");
        let dividends_calculated = income_sum(&tables.income, row.currency, "dividendo");
        let repo_calculated: Decimal = match row.currency {
            Currency::Ars => tables.repos.iter().map(|repo| repo.interest_ars).sum(),
            Currency::Usd => tables.repos.iter().map(|repo| repo.interest_usd).sum(),
        };

        let sales = engine.check(&format!("{} sales", code), sales_calculated, row.sales);
        let rent = engine.check(&format!("{} rent", code), rent_calculated, row.rent);
        let dividends = engine.check(
            &format!("{} dividends", code),
            dividends_calculated,
            row.dividends,
        );
        let repo_interest = engine.check(
            &format!("{} repo interest", code),
            repo_calculated,
            row.repo_interest,
        );

        let components_total = sales.expected
            + rent.expected
            + dividends.expected
            + repo_interest.expected
            + row.funds
            + row.options
            + row.bills
            + row.notes
            + row.futures
            + row.repo_fees;

        report.push(sales);
        report.push(rent);
        report.push(dividends);
        report.push(repo_interest);
        report.push(engine.check(&format!("{} total", code), components_total, row.total));
    }
}

fn income_sum(income: &[IncomeRow], currency: Currency, category_keyword: &str) -> Decimal {
    income
        .iter()
        .filter(|row| row.currency == currency)
        .filter(|row| normalize_label(&row.category).contains(category_keyword))
        .map(|row| row.amount)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::catalog::InstrumentCatalogEntry;
    use crate::models::raw::RawSection;

    fn record(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    fn trade_row(result_ars: &str, number: &str) -> RawRecord {
        record(&[
            ("row_kind", ""),
            ("code", "5152"),
            ("name", "CEDEAR APPLE INC."),
            ("date", "14/03/2025"),
            ("operation", "Venta Cdo."),
            ("number", number),
            ("quantity", "10"),
            ("price", "959.12"),
            ("amount", "9591.20"),
            ("result_ars", result_ars),
            ("result_usd", ""),
            ("expenses_ars", "0"),
            ("expenses_usd", ""),
        ])
    }

    fn ledger_document(reported_total: &str) -> RawDocument {
        RawDocument {
            source: SourceKind::Ledger,
            sections: vec![
                RawSection {
                    label: "Resultado Totales".to_string(),
                    records: vec![
                        record(&[
                            ("category", "TIT.PRIVADOS EXENTOS (Enajenacion)"),
                            ("value_ars", reported_total),
                            ("value_usd", ""),
                        ]),
                        record(&[
                            ("category", "TOTAL GENERAL"),
                            ("value_ars", reported_total),
                            ("value_usd", ""),
                        ]),
                    ],
                },
                RawSection {
                    label: "Tit.Privados Exentos".to_string(),
                    records: vec![
                        trade_row("100.00", "1"),
                        trade_row("50.00", "2"),
                        trade_row("20.00-", "3"),
                    ],
                },
            ],
        }
    }

    fn summary_document() -> RawDocument {
        RawDocument {
            source: SourceKind::BrokerSummary,
            sections: vec![RawSection {
                label: "Resumen".to_string(),
                records: vec![record(&[("currency", "Pesos"), ("total", "")])],
            }],
        }
    }

    #[test]
    fn three_row_category_reconciles_against_reported_total() {
        let catalogs = ReferenceCatalogs::default();
        let output = run(
            ledger_document("130.00"),
            summary_document(),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap();

        let category = output
            .report
            .results
            .iter()
            .find(|result| result.field == "TIT.PRIVADOS EXENTOS (Enajenacion) ARS")
            .unwrap();
        assert_eq!(category.calculated, dec!(130.00));
        assert!(category.matched);
        assert!(!category.decimal_fix_applied);
        assert!(output.report.all_passed());
        assert!(output.unmapped_labels.is_empty());
    }

    #[test]
    fn hundredfold_inflated_total_is_corrected_then_passes() {
        let catalogs = ReferenceCatalogs::default();
        let output = run(
            ledger_document("13000.00"),
            summary_document(),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap();

        let category = output
            .report
            .results
            .iter()
            .find(|result| result.field == "TIT.PRIVADOS EXENTOS (Enajenacion) ARS")
            .unwrap();
        assert!(category.decimal_fix_applied);
        assert_eq!(category.expected, dec!(130.00));
        assert!(category.matched);
        assert!(output.report.all_passed());
    }

    #[test]
    fn document_order_does_not_matter() {
        let catalogs = ReferenceCatalogs::default();
        let output = run(
            summary_document(),
            ledger_document("130.00"),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap();
        assert!(output.report.all_passed());
        assert_eq!(output.tables.transactions.len(), 3);
    }

    #[test]
    fn sell_quantities_are_negative_in_the_detail_table() {
        let catalogs = ReferenceCatalogs::default();
        let output = run(
            ledger_document("130.00"),
            summary_document(),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap();
        assert!(output
            .tables
            .transactions
            .iter()
            .all(|transaction| transaction.quantity == dec!(-10)));
    }

    #[test]
    fn two_documents_of_the_same_format_are_rejected() {
        let catalogs = ReferenceCatalogs::default();
        let error = run(
            ledger_document("130.00"),
            ledger_document("130.00"),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FatalError>(),
            Some(FatalError::UnrecognizedFormat(_))
        ));
    }

    #[test]
    fn empty_documents_are_a_fatal_error() {
        let catalogs = ReferenceCatalogs::default();
        let empty = RawDocument {
            source: SourceKind::Ledger,
            sections: Vec::new(),
        };
        let error = run(
            empty.clone(),
            empty,
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FatalError>(),
            Some(FatalError::NoSectionsDetected)
        ));
    }

    #[test]
    fn blank_codes_without_a_catalog_abort_the_run() {
        let catalogs = ReferenceCatalogs::default();
        let mut ledger = ledger_document("130.00");
        for section in &mut ledger.sections {
            for row in &mut section.records {
                row.insert("code".to_string(), String::new());
            }
        }
        let error = run(
            ledger,
            summary_document(),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<FatalError>(),
            Some(FatalError::MissingCatalog(_))
        ));
    }

    #[test]
    fn duplicate_extraction_rows_are_dropped_before_reconciliation() {
        let catalogs = ReferenceCatalogs::default();
        let mut ledger = ledger_document("130.00");
        // re-emit the first detail row, as overlapping passes do
        let duplicate = trade_row("100.00", "1");
        ledger.sections[1].records.insert(1, duplicate);

        let output = run(
            ledger,
            summary_document(),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(output.tables.transactions.len(), 3);
        assert!(output.report.all_passed());
    }

    #[test]
    fn unmapped_sections_are_reported_not_fatal() {
        let catalogs = ReferenceCatalogs::default();
        let mut ledger = ledger_document("130.00");
        ledger.sections.push(RawSection {
            label: "Hoja Misteriosa".to_string(),
            records: vec![record(&[("category", "x")])],
        });
        let output = run(
            ledger,
            summary_document(),
            &catalogs,
            &PipelineConfig::default(),
        )
        .unwrap();
        assert_eq!(output.unmapped_labels, vec!["Hoja Misteriosa".to_string()]);
    }

    #[test]
    fn ticket_codes_break_fuzzy_resolution_ties() {
        let mut catalogs = ReferenceCatalogs::default();
        catalogs.instruments = vec![
            InstrumentCatalogEntry {
                code: "7421".to_string(),
                name: "BONO AL30 LEY LOCAL".to_string(),
                ticker: "AL30L".to_string(),
                issue_currency: Currency::Usd,
                category: "TITULOS PUBLICOS".to_string(),
            },
            InstrumentCatalogEntry {
                code: "6000".to_string(),
                name: "BONO AL30 LEY NY".to_string(),
                ticker: "AL30N".to_string(),
                issue_currency: Currency::Usd,
                category: "TITULOS PUBLICOS".to_string(),
            },
        ];

        let mut trades: Vec<LedgerTrade> = Vec::new();
        let mut tickets = vec![Transaction {
            code: "6000".to_string(),
            name: "BONO AL30 LEY NY".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            operation: OperationKind::Buy,
            row_kind: RowKind::Detail,
            quantity: dec!(100),
            unit_price: dec!(70),
            gross_amount: dec!(7000),
            expenses: dec!(0),
            currency: Currency::Usd,
            origin: SourceOrigin {
                source: SourceKind::BrokerSummary,
                section: SectionKey::TradeTickets,
            },
        }];
        let mut tables = DerivedTables::default();
        tables.sale_results.push(SaleResultRow {
            code: String::new(),
            name: "BONO AL30".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 20).unwrap(),
            quantity: dec!(-50),
            gross: dec!(3600),
            expenses: dec!(0),
            vat: dec!(0),
            result: dec!(100),
            fx_rate: dec!(1),
            currency: Currency::Usd,
        });

        let mut manual_review = Vec::new();
        resolve_entities(
            &catalogs,
            &mut trades,
            &mut tickets,
            &mut tables,
            &mut manual_review,
        )
        .unwrap();

        // both catalog names contain "BONO AL30" with the same token
        // overlap; the code that traded this period decides
        assert_eq!(tables.sale_results[0].code, "6000");
        assert!(manual_review.is_empty());
    }
}
