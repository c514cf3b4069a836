use crate::error::DataQualityIssue;
use crate::schema::RecordId;
use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait CurrencyRateProvider {
    /// Units of `to` per one unit of `from`, in effect on `as_of`.
    fn rate(&self, from: &str, to: &str, as_of: NaiveDate) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedRate {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
    pub rate: f64,
}

/// Historical rates per currency pair. The rate in effect on a date is the
/// latest one recorded on or before it. When only the reverse pair is known
/// its inverse is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<DatedRate>", into = "Vec<DatedRate>")]
pub struct RateTable {
    pairs: BTreeMap<(String, String), BTreeMap<NaiveDate, f64>>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: &str, to: &str, date: NaiveDate, rate: f64) {
        self.pairs
            .entry((from.to_ascii_uppercase(), to.to_ascii_uppercase()))
            .or_default()
            .insert(date, rate);
    }

    pub fn with_rate(mut self, from: &str, to: &str, date: NaiveDate, rate: f64) -> Self {
        self.insert(from, to, date, rate);
        self
    }

    pub fn len(&self) -> usize {
        self.pairs.values().map(|dated| dated.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn latest(&self, from: &str, to: &str, as_of: NaiveDate) -> Option<f64> {
        self.pairs
            .get(&(from.to_string(), to.to_string()))?
            .range(..=as_of)
            .next_back()
            .map(|(_, rate)| *rate)
    }
}

impl CurrencyRateProvider for RateTable {
    fn rate(&self, from: &str, to: &str, as_of: NaiveDate) -> Option<f64> {
        let from = from.to_ascii_uppercase();
        let to = to.to_ascii_uppercase();

        if let Some(rate) = self.latest(&from, &to, as_of) {
            return Some(rate);
        }

        self.latest(&to, &from, as_of)
            .filter(|inverse| *inverse != 0.0)
            .map(|inverse| 1.0 / inverse)
    }
}

impl From<Vec<DatedRate>> for RateTable {
    fn from(rates: Vec<DatedRate>) -> Self {
        let mut table = Self::new();
        for r in rates {
            table.insert(&r.from, &r.to, r.date, r.rate);
        }
        table
    }
}

impl From<RateTable> for Vec<DatedRate> {
    fn from(table: RateTable) -> Self {
        table
            .pairs
            .into_iter()
            .flat_map(|((from, to), dated)| {
                dated.into_iter().map(move |(date, rate)| DatedRate {
                    from: from.clone(),
                    to: to.clone(),
                    date,
                    rate,
                })
            })
            .collect()
    }
}

/// Converts source amounts into the reporting currency at the transaction
/// date. Never falls back to 1:1 between different currencies.
pub struct CurrencyNormalizer<'a> {
    rates: &'a dyn CurrencyRateProvider,
    reporting_currency: String,
}

impl<'a> CurrencyNormalizer<'a> {
    pub fn new(rates: &'a dyn CurrencyRateProvider, reporting_currency: &str) -> Self {
        Self {
            rates,
            reporting_currency: reporting_currency.to_string(),
        }
    }

    pub fn reporting_currency(&self) -> &str {
        &self.reporting_currency
    }

    pub fn convert(&self, amount: f64, from: &str, to: &str, as_of: NaiveDate) -> Option<f64> {
        if from.eq_ignore_ascii_case(to) {
            return Some(amount);
        }
        self.rates.rate(from, to, as_of).map(|rate| amount * rate)
    }

    /// Conversion into the reporting currency for one record. A missing rate
    /// comes back as a data-quality issue; the caller counts zero.
    pub fn to_reporting(
        &self,
        record_id: RecordId,
        amount: f64,
        from: &str,
        as_of: NaiveDate,
    ) -> std::result::Result<f64, DataQualityIssue> {
        self.convert(amount, from, &self.reporting_currency, as_of)
            .ok_or_else(|| {
                let issue = DataQualityIssue::MissingRate {
                    record_id,
                    from: from.to_string(),
                    to: self.reporting_currency.clone(),
                    date: as_of,
                };
                warn!("{}", issue);
                issue
            })
    }
}
