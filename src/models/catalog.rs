use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::warn;

use crate::services::parsers::parse_trade_date;

use super::transaction::Currency;

#[derive(Debug, Clone)]
pub struct InstrumentCatalogEntry {
    pub code: String,
    pub name: String,
    pub ticker: String,
    pub issue_currency: Currency,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteKind {
    Mep,
    Cable,
}

#[derive(Debug, Clone)]
pub struct CurrencyQuote {
    pub date: NaiveDate,
    pub kind: QuoteKind,
    pub rate: Decimal,
}

/// Keyed by uppercase ticker in `ReferenceCatalogs::initial_prices`.
#[derive(Debug, Clone)]
pub struct InitialPrice {
    pub code: String,
    pub price: Decimal,
}

/// Read-only reference data loaded once per run and shared by every pipeline
/// stage that needs a lookup.
#[derive(Debug, Default)]
pub struct ReferenceCatalogs {
    pub instruments: Vec<InstrumentCatalogEntry>,
    pub fallback_instruments: Vec<InstrumentCatalogEntry>,
    pub initial_prices: HashMap<String, InitialPrice>,
    quotes: HashMap<(NaiveDate, QuoteKind), Decimal>,
}

#[derive(Debug, Deserialize)]
struct InstrumentRecord {
    code: String,
    name: String,
    ticker: String,
    currency: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct QuoteRecord {
    date: String,
    kind: String,
    rate: String,
}

#[derive(Debug, Deserialize)]
struct InitialPriceRecord {
    ticker: String,
    code: String,
    price: String,
}

impl ReferenceCatalogs {
    pub fn load(
        instruments_path: &Path,
        fallback_path: Option<&Path>,
        initial_prices_path: Option<&Path>,
        quotes_path: Option<&Path>,
    ) -> anyhow::Result<ReferenceCatalogs> {
        let mut catalogs = ReferenceCatalogs {
            instruments: load_instruments(instruments_path)?,
            ..Default::default()
        };
        if let Some(path) = fallback_path {
            catalogs.fallback_instruments = load_instruments(path)?;
        }
        if let Some(path) = initial_prices_path {
            catalogs.initial_prices = load_initial_prices(path)?;
        }
        if let Some(path) = quotes_path {
            catalogs.quotes = load_quotes(path)?;
        }
        Ok(catalogs)
    }

    pub fn initial_price(&self, ticker: &str) -> Option<Decimal> {
        self.initial_prices
            .get(&ticker.to_uppercase())
            .map(|entry| entry.price)
    }

    /// Exchange rate for converting ARS amounts on a given date. The MEP
    /// quote is preferred, the cable quote is the fallback; a missing quote
    /// degrades to 1 with a warning rather than aborting the run.
    pub fn quote_for(&self, date: NaiveDate, currency: Currency) -> Decimal {
        if currency == Currency::Ars {
            return dec!(1);
        }
        for kind in [QuoteKind::Mep, QuoteKind::Cable] {
            if let Some(rate) = self.quotes.get(&(date, kind)) {
                return *rate;
            }
        }
        warn!(target: "catalog", "No currency quote for {}, assuming 1", date);
        dec!(1)
    }

    pub fn add_quote(&mut self, quote: CurrencyQuote) {
        self.quotes.insert((quote.date, quote.kind), quote.rate);
    }
}

pub fn parse_currency(text: &str) -> Currency {
    let normalized = deunicode::deunicode(text).to_lowercase();
    if normalized.contains("usd")
        || normalized.contains("dolar")
        || normalized.contains("u$s")
        || normalized.contains("cable")
    {
        return Currency::Usd;
    }
    Currency::Ars
}

fn load_instruments(path: &Path) -> anyhow::Result<Vec<InstrumentCatalogEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Unable to open instrument catalog {}", path.display()))?;

    let mut entries = Vec::new();
    for result in rdr.deserialize() {
        let record: InstrumentRecord = result?;
        entries.push(InstrumentCatalogEntry {
            code: record.code.trim().to_string(),
            name: record.name.trim().to_uppercase(),
            ticker: record.ticker.trim().to_uppercase(),
            issue_currency: parse_currency(&record.currency),
            category: record.category.trim().to_uppercase(),
        });
    }
    Ok(entries)
}

fn load_initial_prices(path: &Path) -> anyhow::Result<HashMap<String, InitialPrice>> {
    let mut rdr = csv::ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Unable to open initial price catalog {}", path.display()))?;

    let mut prices = HashMap::new();
    for result in rdr.deserialize() {
        let record: InitialPriceRecord = result?;
        prices.insert(
            record.ticker.trim().to_uppercase(),
            InitialPrice {
                code: record.code.trim().to_string(),
                price: record.price.trim().parse::<Decimal>().unwrap_or(dec!(0)),
            },
        );
    }
    Ok(prices)
}

fn load_quotes(path: &Path) -> anyhow::Result<HashMap<(NaiveDate, QuoteKind), Decimal>> {
    let mut rdr = csv::ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("Unable to open currency quote table {}", path.display()))?;

    let mut quotes = HashMap::new();
    for result in rdr.deserialize() {
        let record: QuoteRecord = result?;
        let kind = if record.kind.to_lowercase().contains("cable") {
            QuoteKind::Cable
        } else {
            QuoteKind::Mep
        };
        let date = parse_trade_date(&record.date)?;
        quotes.insert((date, kind), record.rate.trim().parse::<Decimal>()?);
    }
    Ok(quotes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn quote_lookup_prefers_mep_over_cable() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let mut catalogs = ReferenceCatalogs::default();
        catalogs.add_quote(CurrencyQuote {
            date,
            kind: QuoteKind::Cable,
            rate: dec!(1148.93),
        });
        catalogs.add_quote(CurrencyQuote {
            date,
            kind: QuoteKind::Mep,
            rate: dec!(1167.806),
        });

        assert_eq!(catalogs.quote_for(date, Currency::Usd), dec!(1167.806));
        assert_eq!(catalogs.quote_for(date, Currency::Ars), dec!(1));
    }

    #[test]
    fn missing_quote_degrades_to_one() {
        let catalogs = ReferenceCatalogs::default();
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(catalogs.quote_for(date, Currency::Usd), dec!(1));
    }

    #[test]
    fn currency_labels_parse() {
        assert_eq!(parse_currency("Pesos"), Currency::Ars);
        assert_eq!(parse_currency("Dólar MEP"), Currency::Usd);
        assert_eq!(parse_currency("DOLAR CABLE"), Currency::Usd);
    }

    #[test]
    fn initial_prices_load_and_lookup_by_uppercase_ticker() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ticker,code,price").unwrap();
        writeln!(file, "aapl,5152,959.12").unwrap();
        writeln!(file, "AL30,7421,not-a-price").unwrap();

        let prices = load_initial_prices(file.path()).unwrap();
        let mut catalogs = ReferenceCatalogs::default();
        catalogs.initial_prices = prices;

        assert_eq!(catalogs.initial_price("AAPL"), Some(dec!(959.12)));
        assert_eq!(catalogs.initial_price("aapl"), Some(dec!(959.12)));
        assert_eq!(catalogs.initial_prices["AAPL"].code, "5152");
        // malformed prices degrade to zero instead of failing the load
        assert_eq!(catalogs.initial_price("AL30"), Some(dec!(0)));
    }

    #[test]
    fn instrument_catalog_loads_from_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "code,name,ticker,currency,category").unwrap();
        writeln!(file, "5152,CEDEAR APPLE INC.,AAPL,Pesos,CEDEARS").unwrap();
        writeln!(file, "7421,BONO AL30,AL30,Dolar MEP,TITULOS PUBLICOS").unwrap();

        let entries = load_instruments(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].code, "5152");
        assert_eq!(entries[1].issue_currency, Currency::Usd);
    }
}
